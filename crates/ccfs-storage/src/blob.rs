//! Presigned-URL blob store abstraction

use async_trait::async_trait;
use ccfs_core::{CcfsResult, ObjectKey};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// User metadata attached to an object (`x-amz-meta-<name>` on the wire).
pub type Metadata = BTreeMap<String, String>;

/// Canned ACL requested for uploaded objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acl {
    Private,
}

impl Acl {
    pub fn as_str(&self) -> &'static str {
        match self {
            Acl::Private => ccfs_core::ACL_PRIVATE,
        }
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a HEAD on an existing object reveals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub content_length: u64,
    pub metadata: Metadata,
}

/// A store addressed by opaque keys that hands out time-limited PUT/GET URLs.
///
/// Implementations hold no per-request state; every mint produces a new
/// capability.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short backend name for logs and health output.
    fn name(&self) -> &'static str;

    /// Mint a URL that lets its holder PUT `key` with the given ACL and
    /// metadata until `ttl` elapses.
    async fn mint_put_url(
        &self,
        key: &ObjectKey,
        acl: Acl,
        metadata: &Metadata,
        ttl: Duration,
    ) -> CcfsResult<String>;

    /// Mint a URL that lets its holder GET `key` until `ttl` elapses.
    async fn mint_get_url(&self, key: &ObjectKey, ttl: Duration) -> CcfsResult<String>;

    /// HEAD the object. `Ok(None)` means it does not exist.
    async fn probe(&self, key: &ObjectKey) -> CcfsResult<Option<ObjectMeta>>;

    /// Verify the store is reachable.
    async fn check_health(&self) -> CcfsResult<()>;
}
