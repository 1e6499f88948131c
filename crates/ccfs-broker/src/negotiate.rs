//! Negotiation service: turns caller requests into capability URLs
//!
//! Stateless between requests. The service never sees key material or
//! plaintext; the filename it receives is an opaque sealed string that is
//! only attached to the object as metadata.

use ccfs_core::config::StorageConfig;
use ccfs_core::{CcfsResult, DownloadTicket, ObjectKey, UploadTicket, FILENAME_META_KEY};
use ccfs_storage::{Acl, BlobStore, Metadata};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::metrics::BrokerMetrics;

/// Explicit broker settings, fixed at construction.
#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    pub bucket: String,
    pub region: String,
    /// Lifetime of every minted URL
    pub ticket_ttl: Duration,
    /// HEAD the object before minting a download URL
    pub probe_existence: bool,
}

impl NegotiationConfig {
    pub fn from_storage(storage: &StorageConfig) -> Self {
        Self {
            bucket: storage.bucket.clone(),
            region: storage.region.clone(),
            ticket_ttl: storage.ticket_ttl(),
            probe_existence: storage.probe_existence,
        }
    }

    /// `bucket@region`, as it appears in ticket logs.
    pub fn location(&self) -> String {
        format!("{}@{}", self.bucket, self.region)
    }
}

pub struct NegotiationService {
    config: NegotiationConfig,
    store: Arc<dyn BlobStore>,
    metrics: BrokerMetrics,
}

impl NegotiationService {
    pub fn new(config: NegotiationConfig, store: Arc<dyn BlobStore>) -> Self {
        Self {
            config,
            store,
            metrics: BrokerMetrics::new(),
        }
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    pub fn metrics(&self) -> &BrokerMetrics {
        &self.metrics
    }

    /// Mint a fresh object key and a PUT capability carrying the sealed
    /// filename as metadata.
    pub async fn negotiate_upload(&self, sealed_filename: &str) -> CcfsResult<UploadTicket> {
        let result = self.mint_upload(sealed_filename).await;
        match &result {
            Ok(ticket) => {
                self.metrics.upload_tickets.inc();
                info!(
                    key = %ticket.object_key,
                    bucket = %self.config.bucket,
                    region = %self.config.region,
                    filename_len = sealed_filename.len(),
                    "upload ticket issued"
                );
            }
            Err(e) => {
                self.metrics.negotiation_errors.inc();
                warn!(location = %self.config.location(), "upload negotiation failed: {e}");
            }
        }
        result
    }

    async fn mint_upload(&self, sealed_filename: &str) -> CcfsResult<UploadTicket> {
        let object_key = ObjectKey::generate()?;

        let mut metadata = Metadata::new();
        metadata.insert(FILENAME_META_KEY.to_string(), sealed_filename.to_string());

        let put_url = self
            .store
            .mint_put_url(&object_key, Acl::Private, &metadata, self.config.ticket_ttl)
            .await?;

        Ok(UploadTicket {
            object_key,
            put_url,
        })
    }

    /// Mint a GET capability for `key`.
    ///
    /// The existence probe is advisory: a missing object or a failed probe is
    /// logged and the URL is issued anyway. The client finds out on its GET.
    pub async fn negotiate_download(&self, key: &ObjectKey) -> CcfsResult<DownloadTicket> {
        if self.config.probe_existence {
            self.probe(key).await;
        }

        match self.store.mint_get_url(key, self.config.ticket_ttl).await {
            Ok(get_url) => {
                self.metrics.download_tickets.inc();
                info!(
                    key = %key,
                    bucket = %self.config.bucket,
                    region = %self.config.region,
                    "download ticket issued"
                );
                Ok(DownloadTicket { get_url })
            }
            Err(e) => {
                self.metrics.negotiation_errors.inc();
                warn!(
                    key = %key,
                    location = %self.config.location(),
                    "download negotiation failed: {e}"
                );
                Err(e)
            }
        }
    }

    async fn probe(&self, key: &ObjectKey) {
        match self.store.probe(key).await {
            Ok(Some(meta)) => {
                debug!(key = %key, bytes = meta.content_length, "probe: object present");
            }
            Ok(None) => {
                self.metrics.probe_misses.inc();
                warn!(key = %key, "probe: object not found, issuing URL anyway");
            }
            Err(e) => {
                self.metrics.probe_misses.inc();
                warn!(key = %key, "probe failed: {e}");
            }
        }
    }
}
