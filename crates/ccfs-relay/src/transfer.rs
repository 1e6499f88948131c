//! Direct transfers against presigned blob store URLs

use bytes::Bytes;
use ccfs_core::{CcfsError, CcfsResult, ACL_HEADER, ACL_PRIVATE, FILENAME_META_HEADER};
use reqwest::StatusCode;
use tracing::debug;

/// Body and sealed-filename header of a fetched object.
#[derive(Debug)]
pub struct FetchedObject {
    pub body: Bytes,
    /// `x-amz-meta-filename`, if the store returned it
    pub sealed_filename: Option<String>,
}

fn transport_error(method: &str, e: reqwest::Error) -> CcfsError {
    CcfsError::Transfer {
        status: e.status().map(|s| s.as_u16()),
        message: format!("{method} request failed: {e}"),
    }
}

async fn status_error(method: &str, resp: reqwest::Response) -> CcfsError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let detail: String = body.chars().take(200).collect();
    CcfsError::transfer_status(
        status.as_u16(),
        format!("{method} returned {status}: {detail}"),
    )
}

/// PUT a sealed payload with the private ACL and the sealed filename header.
pub async fn put_object(
    http: &reqwest::Client,
    put_url: &str,
    envelope: Vec<u8>,
    sealed_filename: &str,
) -> CcfsResult<()> {
    let len = envelope.len();
    let resp = http
        .put(put_url)
        .header(ACL_HEADER, ACL_PRIVATE)
        .header(FILENAME_META_HEADER, sealed_filename)
        .body(envelope)
        .send()
        .await
        .map_err(|e| transport_error("PUT", e))?;

    if resp.status() != StatusCode::OK {
        return Err(status_error("PUT", resp).await);
    }
    debug!(bytes = len, "PUT complete");
    Ok(())
}

/// GET an object and its sealed filename header.
pub async fn get_object(http: &reqwest::Client, get_url: &str) -> CcfsResult<FetchedObject> {
    let resp = http
        .get(get_url)
        .send()
        .await
        .map_err(|e| transport_error("GET", e))?;

    if resp.status() != StatusCode::OK {
        return Err(status_error("GET", resp).await);
    }

    let sealed_filename = resp
        .headers()
        .get(FILENAME_META_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = resp.bytes().await.map_err(|e| transport_error("GET", e))?;
    debug!(bytes = body.len(), "GET complete");

    Ok(FetchedObject {
        body,
        sealed_filename,
    })
}
