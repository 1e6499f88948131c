use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{CcfsError, CcfsResult};

/// Top-level configuration (loaded from ccfs.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CcfsConfig {
    pub broker: BrokerConfig,
    pub storage: StorageConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// TCP listen address (default: 0.0.0.0:5000)
    pub listen: String,
    /// Externally visible base URL, used by the memory backend to build blob URLs
    pub public_url: String,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
}

/// Which blob store backs the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// S3 or any S3-compatible endpoint, presigned through OpenDAL
    S3,
    /// In-process store served by the broker itself (development and tests)
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket holding the encrypted objects
    pub bucket: String,
    /// Refuse plaintext HTTP endpoints instead of warning
    pub enforce_tls: bool,
    /// Lifetime of minted capability URLs in seconds (default: 900)
    pub ticket_ttl_secs: u64,
    /// HEAD the object before minting a download URL (best effort)
    pub probe_existence: bool,
    /// Maximum accepted body size for the memory backend, in MB
    pub max_object_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the broker
    pub broker_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:5000".into(),
            public_url: "http://localhost:5000".into(),
            log_level: "info".into(),
            log_format: "text".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::S3,
            endpoint: "https://s3.amazonaws.com".into(),
            region: "us-east-1".into(),
            bucket: "ccfs".into(),
            enforce_tls: false,
            ticket_ttl_secs: crate::DEFAULT_TICKET_TTL_SECS,
            probe_existence: true,
            max_object_mb: 512,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            broker_url: "http://localhost:5000".into(),
            timeout_secs: 60,
        }
    }
}

impl StorageConfig {
    pub fn ticket_ttl(&self) -> Duration {
        Duration::from_secs(self.ticket_ttl_secs)
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl CcfsConfig {
    /// Reject values no component can work with.
    pub fn validate(&self) -> CcfsResult<()> {
        if self.storage.bucket.trim().is_empty() {
            return Err(CcfsError::Config("storage.bucket must not be empty".into()));
        }
        if self.storage.ticket_ttl_secs == 0 {
            return Err(CcfsError::Config(
                "storage.ticket_ttl_secs must be greater than zero".into(),
            ));
        }
        // S3 presigned URLs cannot outlive seven days
        if self.storage.ticket_ttl_secs > 7 * 24 * 3600 {
            return Err(CcfsError::Config(format!(
                "storage.ticket_ttl_secs {} exceeds the 7 day presign limit",
                self.storage.ticket_ttl_secs
            )));
        }
        if self.client.timeout_secs == 0 {
            return Err(CcfsError::Config(
                "client.timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Load a config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> CcfsResult<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| CcfsError::Config(format!("parsing {}: {e}", path.display())))?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }
}
