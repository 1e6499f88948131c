//! In-process blob store that serves its own presigned URLs
//!
//! URLs have the shape `{base}/blob/{key}?expires={unix}&sig={hex}`. The
//! signature is a BLAKE3 keyed hash over the method, key, expiry, ACL and
//! metadata, so a PUT only succeeds when the client sends exactly the
//! `x-amz-acl` and `x-amz-meta-*` headers the broker minted it for. PUT URLs
//! are single-use; GET URLs stay valid until they expire.

use async_trait::async_trait;
use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::put,
    Router,
};
use bytes::Bytes;
use ccfs_core::{CcfsError, CcfsResult, ObjectKey, ACL_HEADER};
use rand::{rngs::OsRng, RngCore};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::blob::{Acl, BlobStore, Metadata, ObjectMeta};

const META_PREFIX: &str = "x-amz-meta-";

/// An object held by the memory store. Both fields are opaque to the store.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub metadata: Metadata,
}

struct Inner {
    base_url: String,
    signing_key: [u8; 32],
    max_body_bytes: usize,
    objects: RwLock<HashMap<ObjectKey, StoredObject>>,
    /// Spent PUT signatures and their expiry; pruned once expired
    consumed: Mutex<HashMap<String, u64>>,
}

#[derive(Clone)]
pub struct MemoryBlobStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Deserialize)]
struct SignedQuery {
    expires: u64,
    sig: String,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl MemoryBlobStore {
    /// `base_url` is where [`MemoryBlobStore::router`] is reachable from clients.
    pub fn new(base_url: impl Into<String>, max_body_bytes: usize) -> CcfsResult<Self> {
        let mut signing_key = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut signing_key)
            .map_err(|e| CcfsError::Randomness(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                base_url: base_url.into().trim_end_matches('/').to_string(),
                signing_key,
                max_body_bytes,
                objects: RwLock::new(HashMap::new()),
                consumed: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Routes serving `PUT`/`GET /blob/{key}`.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/blob/{key}", put(put_object).get(get_object))
            .layer(DefaultBodyLimit::max(self.inner.max_body_bytes))
            .with_state(self.clone())
    }

    /// Stored object, if any (inspection for tests and tooling).
    pub async fn object(&self, key: &ObjectKey) -> Option<StoredObject> {
        self.inner.objects.read().await.get(key).cloned()
    }

    /// Store `object` under `key` directly, bypassing capability checks
    /// (seeding and fault injection for tests and tooling).
    pub async fn insert(&self, key: ObjectKey, object: StoredObject) {
        self.inner.objects.write().await.insert(key, object);
    }

    pub async fn len(&self) -> usize {
        self.inner.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn sign(
        &self,
        method: &str,
        key: &ObjectKey,
        expires: u64,
        acl: &str,
        metadata: &Metadata,
    ) -> String {
        let mut canonical = format!("{method}\n{key}\n{expires}\n{acl}\n");
        for (name, value) in metadata {
            canonical.push_str(name);
            canonical.push(':');
            canonical.push_str(value);
            canonical.push('\n');
        }
        blake3::keyed_hash(&self.inner.signing_key, canonical.as_bytes())
            .to_hex()
            .to_string()
    }

    fn url(&self, key: &ObjectKey, expires: u64, sig: &str) -> String {
        format!(
            "{}/blob/{key}?expires={expires}&sig={sig}",
            self.inner.base_url
        )
    }

    fn verify(
        &self,
        method: &str,
        key: &ObjectKey,
        query: &SignedQuery,
        acl: &str,
        metadata: &Metadata,
    ) -> Result<(), (StatusCode, &'static str)> {
        if unix_now() > query.expires {
            return Err((StatusCode::FORBIDDEN, "Request has expired"));
        }
        let presented = blake3::Hash::from_hex(query.sig.as_bytes())
            .map_err(|_| (StatusCode::FORBIDDEN, "Malformed signature"))?;
        let expected = self.sign(method, key, query.expires, acl, metadata);
        let expected = blake3::Hash::from_hex(expected.as_bytes())
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Signing failed"))?;
        // blake3::Hash equality is constant-time
        if presented != expected {
            return Err((StatusCode::FORBIDDEN, "SignatureDoesNotMatch"));
        }
        Ok(())
    }
}

fn expiry(ttl: Duration) -> u64 {
    unix_now().saturating_add(ttl.as_secs())
}

/// Collect `x-amz-meta-*` headers into a metadata map (names lowercased, prefix stripped).
fn metadata_from_headers(headers: &HeaderMap) -> Metadata {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let name = name.as_str();
            let meta_name = name.strip_prefix(META_PREFIX)?;
            let value = value.to_str().ok()?;
            Some((meta_name.to_string(), value.to_string()))
        })
        .collect()
}

async fn put_object(
    State(store): State<MemoryBlobStore>,
    Path(key): Path<String>,
    Query(query): Query<SignedQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(key) = key.parse::<ObjectKey>() else {
        return (StatusCode::BAD_REQUEST, "InvalidObjectKey").into_response();
    };
    let acl = headers
        .get(ACL_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let metadata = metadata_from_headers(&headers);

    if let Err((status, reason)) = store.verify("PUT", &key, &query, acl, &metadata) {
        warn!(key = %key, %reason, "memory store: PUT rejected");
        return (status, reason).into_response();
    }

    // Single use: a signature that already stored an object is spent.
    // Expired entries can go; verify() already rejects their URLs.
    {
        let mut consumed = store.inner.consumed.lock().await;
        let now = unix_now();
        consumed.retain(|_, expires| *expires >= now);
        if consumed.insert(query.sig.clone(), query.expires).is_some() {
            warn!(key = %key, "memory store: PUT URL reused");
            return (StatusCode::FORBIDDEN, "Capability already used").into_response();
        }
    }

    debug!(key = %key, bytes = body.len(), "memory store: object stored");
    store
        .inner
        .objects
        .write()
        .await
        .insert(key, StoredObject { body, metadata });
    StatusCode::OK.into_response()
}

async fn get_object(
    State(store): State<MemoryBlobStore>,
    Path(key): Path<String>,
    Query(query): Query<SignedQuery>,
) -> Response {
    let Ok(key) = key.parse::<ObjectKey>() else {
        return (StatusCode::BAD_REQUEST, "InvalidObjectKey").into_response();
    };
    if let Err((status, reason)) = store.verify("GET", &key, &query, "", &Metadata::new()) {
        warn!(key = %key, %reason, "memory store: GET rejected");
        return (status, reason).into_response();
    }

    let Some(object) = store.object(&key).await else {
        return (StatusCode::NOT_FOUND, "NoSuchKey").into_response();
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        axum::http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    for (name, value) in &object.metadata {
        let header_name = HeaderName::try_from(format!("{META_PREFIX}{name}"));
        let header_value = HeaderValue::from_str(value);
        if let (Ok(n), Ok(v)) = (header_name, header_value) {
            headers.insert(n, v);
        }
    }
    (StatusCode::OK, headers, object.body).into_response()
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn mint_put_url(
        &self,
        key: &ObjectKey,
        acl: Acl,
        metadata: &Metadata,
        ttl: Duration,
    ) -> CcfsResult<String> {
        let expires = expiry(ttl);
        let sig = self.sign("PUT", key, expires, acl.as_str(), metadata);
        Ok(self.url(key, expires, &sig))
    }

    async fn mint_get_url(&self, key: &ObjectKey, ttl: Duration) -> CcfsResult<String> {
        let expires = expiry(ttl);
        let sig = self.sign("GET", key, expires, "", &Metadata::new());
        Ok(self.url(key, expires, &sig))
    }

    async fn probe(&self, key: &ObjectKey) -> CcfsResult<Option<ObjectMeta>> {
        Ok(self.object(key).await.map(|o| ObjectMeta {
            content_length: o.body.len() as u64,
            metadata: o.metadata,
        }))
    }

    async fn check_health(&self) -> CcfsResult<()> {
        Ok(())
    }
}
