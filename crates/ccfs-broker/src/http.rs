//! Broker HTTP surface
//!
//! Endpoints:
//!   GET /api/upload?filename=<sealed>  → {"Key": "<uuid>", "Url": "<PUT url>"}
//!   GET /api/download?key=<uuid>       → {"Url": "<GET url>"}
//!   GET /healthz                       liveness (always 200)
//!   GET /readyz                        200 if the blob store answers, 503 otherwise
//!   GET /metrics                       Prometheus text format

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use ccfs_core::{CcfsError, DownloadTicket, ObjectKey, UploadTicket};
use serde::Deserialize;
use std::sync::Arc;

use crate::negotiate::NegotiationService;

/// Error answer: status plus `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<CcfsError> for ApiError {
    fn from(err: CcfsError) -> Self {
        let status = match &err {
            CcfsError::Storage(_) => StatusCode::BAD_GATEWAY,
            CcfsError::InvalidObjectKey(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
struct UploadQuery {
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    key: Option<String>,
}

/// Routes for the negotiation API plus health and metrics.
pub fn router(service: Arc<NegotiationService>) -> Router {
    Router::new()
        .route("/api/upload", get(api_upload))
        .route("/api/download", get(api_download))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(service)
}

async fn api_upload(
    State(service): State<Arc<NegotiationService>>,
    Query(query): Query<UploadQuery>,
) -> Result<Json<UploadTicket>, ApiError> {
    let filename = query
        .filename
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("missing query parameter: filename"))?;

    let ticket = service.negotiate_upload(&filename).await?;
    Ok(Json(ticket))
}

async fn api_download(
    State(service): State<Arc<NegotiationService>>,
    Query(query): Query<DownloadQuery>,
) -> Result<Json<DownloadTicket>, ApiError> {
    let raw = query
        .key
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("missing query parameter: key"))?;
    let key: ObjectKey = raw
        .parse()
        .map_err(|_| ApiError::bad_request("key is not a valid object key"))?;

    let ticket = service.negotiate_download(&key).await?;
    Ok(Json(ticket))
}

/// Liveness probe: returns 200 if the process is running.
async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz_handler(State(service): State<Arc<NegotiationService>>) -> impl IntoResponse {
    match service.store().check_health().await {
        Ok(()) => (StatusCode::OK, "ready".to_string()),
        Err(e) => {
            tracing::warn!(store = service.store().name(), "readiness check failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, "blob store unreachable".to_string())
        }
    }
}

async fn metrics_handler(State(service): State<Arc<NegotiationService>>) -> impl IntoResponse {
    match service.metrics().render() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiate::NegotiationConfig;
    use axum::body::Body;
    use axum::http::Request;
    use ccfs_storage::MemoryBlobStore;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> Router {
        let store = MemoryBlobStore::new("http://blob.test", 1024).unwrap();
        let config = NegotiationConfig {
            bucket: "test".into(),
            region: "us-east-1".into(),
            ticket_ttl: Duration::from_secs(900),
            probe_existence: true,
        };
        router(Arc::new(NegotiationService::new(config, Arc::new(store))))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn test_upload_returns_key_and_url() {
        let (status, json) = get_json(app(), "/api/upload?filename=c2VhbGVk%2Bbmo%3D").await;
        assert_eq!(status, StatusCode::OK);

        let key: ObjectKey = json["Key"].as_str().unwrap().parse().unwrap();
        let url = json["Url"].as_str().unwrap();
        assert!(url.starts_with("http://blob.test/blob/"));
        assert!(url.contains(&key.to_string()));
    }

    #[tokio::test]
    async fn test_upload_missing_filename() {
        let (status, json) = get_json(app(), "/api/upload").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("filename"));

        let (status, _) = get_json(app(), "/api/upload?filename=").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_download_returns_url() {
        let key = ObjectKey::generate().unwrap();
        let (status, json) = get_json(app(), &format!("/api/download?key={key}")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["Url"].as_str().unwrap().contains(&key.to_string()));
        assert!(json.get("Key").is_none());
    }

    #[tokio::test]
    async fn test_download_rejects_bad_key() {
        let (status, _) = get_json(app(), "/api/download?key=..%2Fsecrets").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get_json(app(), "/api/download").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_invalid_key_error_is_bad_request() {
        let err: ApiError = CcfsError::InvalidObjectKey("\"abc\"".into()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let err: ApiError = CcfsError::Storage("down".into()).into();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_health_ready_metrics() {
        let app = app();

        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let _ = get_json(app.clone(), "/api/upload?filename=eA%3D%3D").await;
        let resp = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("ccfs_upload_tickets_total 1"), "{text}");
    }
}
