//! S3 blob store: OpenDAL operator (GET presign, HEAD, health) plus an AWS SDK
//! presigner for uploads

use async_trait::async_trait;
use ccfs_core::config::StorageConfig;
use ccfs_core::{CcfsError, CcfsResult, ObjectKey};
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region, RequestChecksumCalculation};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::ObjectCannedAcl;
use opendal::{ErrorKind, Operator};
use std::time::Duration;

use crate::blob::{Acl, BlobStore, Metadata, ObjectMeta};

/// Connection settings for an S3-compatible endpoint
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Build an OpenDAL Operator for S3 (or any S3-compatible endpoint)
pub fn build_operator(cfg: &S3Settings) -> CcfsResult<Operator> {
    // opendal 0.55: S3 builder uses consuming pattern (methods take `self`, return `Self`)
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(&cfg.access_key_id)
        .secret_access_key(&cfg.secret_access_key);

    let op = Operator::new(builder)
        .map_err(|e| CcfsError::Storage(format!("creating OpenDAL S3 operator: {e}")))?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(3)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// AWS SDK client used only to presign uploads. Unlike the OpenDAL presigner
/// it signs `x-amz-acl` and `x-amz-meta-*`, so the URL is bound to the ACL and
/// the sealed filename.
fn build_presigner(cfg: &S3Settings) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &cfg.access_key_id,
        &cfg.secret_access_key,
        None,
        None,
        "ccfs-config",
    );
    let conf = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(cfg.region.clone()))
        .endpoint_url(&cfg.endpoint)
        .credentials_provider(credentials)
        .force_path_style(true)
        // no checksum headers the uploading client would have to reproduce
        .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
        .build();
    aws_sdk_s3::Client::from_conf(conf)
}

/// Presigns PUT/GET requests against one bucket.
#[derive(Clone)]
pub struct S3BlobStore {
    op: Operator,
    presigner: aws_sdk_s3::Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(cfg: &S3Settings) -> CcfsResult<Self> {
        Ok(Self {
            op: build_operator(cfg)?,
            presigner: build_presigner(cfg),
            bucket: cfg.bucket.clone(),
        })
    }

    /// Build from the ccfs storage config plus credentials.
    ///
    /// If `enforce_tls` is true and the endpoint uses HTTP, this returns an error.
    /// Otherwise, a warning is logged for non-HTTPS endpoints.
    pub fn from_config(
        storage: &StorageConfig,
        access_key_id: &str,
        secret_access_key: &str,
    ) -> CcfsResult<Self> {
        if storage.endpoint.starts_with("http://") {
            if storage.enforce_tls {
                return Err(CcfsError::Config(format!(
                    "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                     Use an HTTPS endpoint or set storage.enforce_tls = false \
                     for local development.",
                    storage.endpoint
                )));
            }
            tracing::warn!(
                endpoint = %storage.endpoint,
                "S3 endpoint uses plaintext HTTP; presigned URLs will be handed out over HTTP"
            );
        }

        Self::new(&S3Settings {
            endpoint: storage.endpoint.clone(),
            region: storage.region.clone(),
            bucket: storage.bucket.clone(),
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
        })
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn mint_put_url(
        &self,
        key: &ObjectKey,
        acl: Acl,
        metadata: &Metadata,
        ttl: Duration,
    ) -> CcfsResult<String> {
        let canned = match acl {
            Acl::Private => ObjectCannedAcl::Private,
        };
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| CcfsError::Storage(format!("presign PUT {key}: {e}")))?;

        let mut request = self
            .presigner
            .put_object()
            .bucket(&self.bucket)
            .key(key.to_string())
            .acl(canned);
        for (name, value) in metadata {
            request = request.metadata(name, value);
        }

        let presigned = request
            .presigned(presigning)
            .await
            .map_err(|e| CcfsError::Storage(format!("presign PUT {key}: {e}")))?;
        Ok(presigned.uri().to_string())
    }

    async fn mint_get_url(&self, key: &ObjectKey, ttl: Duration) -> CcfsResult<String> {
        let req = self
            .op
            .presign_read(&key.to_string(), ttl)
            .await
            .map_err(|e| CcfsError::Storage(format!("presign GET {key}: {e}")))?;
        Ok(req.uri().to_string())
    }

    async fn probe(&self, key: &ObjectKey) -> CcfsResult<Option<ObjectMeta>> {
        match self.op.stat(&key.to_string()).await {
            Ok(meta) => Ok(Some(ObjectMeta {
                content_length: meta.content_length(),
                metadata: meta
                    .user_metadata()
                    .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default(),
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CcfsError::Storage(format!("HEAD {key}: {e}"))),
        }
    }

    async fn check_health(&self) -> CcfsResult<()> {
        crate::health::check_health(&self.op).await
    }
}
