//! Broker client: asks the broker for upload and download tickets

use ccfs_core::config::ClientConfig;
use ccfs_core::{CcfsError, CcfsResult, DownloadTicket, ObjectKey, UploadTicket};
use reqwest::Url;
use std::time::Duration;
use tracing::debug;

/// HTTP client bound to one broker.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    broker: Url,
}

impl RelayClient {
    pub fn new(broker_url: &str, timeout: Duration) -> CcfsResult<Self> {
        let mut broker = Url::parse(broker_url)
            .map_err(|e| CcfsError::Config(format!("invalid broker URL {broker_url:?}: {e}")))?;
        // Url::join replaces the last segment unless the path ends in '/'
        if !broker.path().ends_with('/') {
            let path = format!("{}/", broker.path());
            broker.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ccfs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow::anyhow!("building HTTP client: {e}"))?;

        Ok(Self { http, broker })
    }

    pub fn from_config(config: &ClientConfig) -> CcfsResult<Self> {
        Self::new(&config.broker_url, config.timeout())
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn broker_url(&self) -> &Url {
        &self.broker
    }

    fn endpoint(&self, path: &str) -> CcfsResult<Url> {
        self.broker
            .join(path)
            .map_err(|e| CcfsError::Config(format!("joining broker URL: {e}")))
    }

    /// `GET /api/upload?filename=<sealed>`
    pub async fn upload_ticket(&self, sealed_filename: &str) -> CcfsResult<UploadTicket> {
        let url = self.endpoint("api/upload")?;
        debug!(url = %url, "requesting upload ticket");

        let resp = self
            .http
            .get(url)
            .query(&[("filename", sealed_filename)])
            .send()
            .await
            .map_err(|e| CcfsError::Negotiation(format!("broker unreachable: {e}")))?;
        let resp = check_broker_response(resp).await?;

        let ticket: UploadTicket = resp
            .json()
            .await
            .map_err(|e| CcfsError::Negotiation(format!("malformed upload ticket: {e}")))?;
        if ticket.put_url.is_empty() {
            return Err(CcfsError::Negotiation(
                "broker returned an empty upload URL".into(),
            ));
        }
        Ok(ticket)
    }

    /// `GET /api/download?key=<uuid>`
    pub async fn download_ticket(&self, key: &ObjectKey) -> CcfsResult<DownloadTicket> {
        let url = self.endpoint("api/download")?;
        debug!(url = %url, key = %key, "requesting download ticket");

        let resp = self
            .http
            .get(url)
            .query(&[("key", key.to_string())])
            .send()
            .await
            .map_err(|e| CcfsError::Negotiation(format!("broker unreachable: {e}")))?;
        let resp = check_broker_response(resp).await?;

        let ticket: DownloadTicket = resp
            .json()
            .await
            .map_err(|e| CcfsError::Negotiation(format!("malformed download ticket: {e}")))?;
        if ticket.get_url.is_empty() {
            return Err(CcfsError::Negotiation(
                "broker returned an empty download URL".into(),
            ));
        }
        Ok(ticket)
    }
}

/// Turn a non-success broker answer into `Negotiation`, keeping the
/// broker's error text when it sent one.
async fn check_broker_response(resp: reqwest::Response) -> CcfsResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let detail: String = body.chars().take(200).collect();
    Err(CcfsError::Negotiation(format!(
        "broker returned {status}: {detail}"
    )))
}
