use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{CcfsError, CcfsResult};

/// Opaque identifier of a stored blob: a random UUID v4.
///
/// Never derived from the filename or content. Text form is the canonical
/// lowercase hyphenated UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectKey(Uuid);

impl ObjectKey {
    /// Mint a fresh key from 16 bytes of OS randomness.
    ///
    /// Fails with `Randomness` rather than falling back to a weaker source.
    pub fn generate() -> CcfsResult<Self> {
        let mut bytes = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CcfsError::Randomness(e.to_string()))?;
        Ok(Self(uuid::Builder::from_random_bytes(bytes).into_uuid()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ObjectKey {
    type Err = CcfsError;

    fn from_str(s: &str) -> CcfsResult<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| CcfsError::InvalidObjectKey(format!("{s:?}: {e}")))
    }
}

impl TryFrom<String> for ObjectKey {
    type Error = CcfsError;

    fn try_from(value: String) -> CcfsResult<Self> {
        value.parse()
    }
}

impl From<ObjectKey> for String {
    fn from(key: ObjectKey) -> Self {
        key.to_string()
    }
}

/// Broker answer to an upload negotiation.
///
/// Serialized as `{"Key": "<uuid>", "Url": "<presigned PUT url>"}`; lowercase
/// field names are accepted when reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTicket {
    #[serde(rename = "Key", alias = "key")]
    pub object_key: ObjectKey,
    #[serde(rename = "Url", alias = "url")]
    pub put_url: String,
}

/// Broker answer to a download negotiation: `{"Url": "<presigned GET url>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTicket {
    #[serde(rename = "Url", alias = "url")]
    pub get_url: String,
}
