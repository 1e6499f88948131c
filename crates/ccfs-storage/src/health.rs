//! Storage health check

use ccfs_core::{CcfsError, CcfsResult};
use opendal::Operator;

/// Verify the S3 endpoint is reachable and the bucket listable
pub async fn check_health(op: &Operator) -> CcfsResult<()> {
    // Listing the root is the lightest call that also proves the credentials work
    op.list("/")
        .await
        .map(|_| ())
        .map_err(|e| CcfsError::Storage(format!("storage health check failed: {e}")))
}
