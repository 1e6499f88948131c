//! ccfs-broker: zero-knowledge negotiation service
//!
//! Callers ask for a place to put (or get) bytes; the broker answers with a
//! short-lived presigned URL against the blob store. Object content and key
//! material never pass through it.

pub mod http;
pub mod metrics;
pub mod negotiate;

pub use http::router;
pub use metrics::BrokerMetrics;
pub use negotiate::{NegotiationConfig, NegotiationService};

use axum::Router;
use ccfs_storage::MemoryBlobStore;
use std::sync::Arc;

/// Full application: the negotiation API, plus the blob routes when the
/// broker hosts the memory store itself.
pub fn build_app(service: Arc<NegotiationService>, memory: Option<&MemoryBlobStore>) -> Router {
    let app = router(service);
    match memory {
        Some(store) => app.merge(store.router()),
        None => app,
    }
}

/// Serve `app` on an already-bound listener until `shutdown` resolves.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    app: Router,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(addr = %addr, "broker: listening on /api/upload, /api/download");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("broker server: {e}"))
}
