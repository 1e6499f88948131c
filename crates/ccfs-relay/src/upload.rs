//! Upload workflow
//!
//! `Idle → FilenameEncrypted → TicketObtained → PayloadEncrypted → Uploaded → Done`,
//! or `Failed` from any state. Nothing is sent to the blob store unless the
//! broker handed out a ticket.

use ccfs_core::{CcfsError, CcfsResult, ObjectKey};
use ccfs_crypto::{derive_key, encrypt, seal_filename};
use secrecy::SecretString;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::client::RelayClient;
use crate::transfer;
use crate::StateFn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    FilenameEncrypted,
    TicketObtained,
    PayloadEncrypted,
    Uploaded,
    Done,
    Failed,
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadState::Idle => "idle",
            UploadState::FilenameEncrypted => "filename encrypted",
            UploadState::TicketObtained => "ticket obtained",
            UploadState::PayloadEncrypted => "payload encrypted",
            UploadState::Uploaded => "uploaded",
            UploadState::Done => "done",
            UploadState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Result of a successful upload. `object_key` is the only handle to the
/// object; it cannot be recovered from the filename.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub object_key: ObjectKey,
    pub local_path: PathBuf,
    pub file_name: String,
    /// Plaintext size
    pub bytes: u64,
    /// Size of the sealed payload actually stored
    pub stored_bytes: u64,
}

struct Progress<'a> {
    state: UploadState,
    observer: Option<&'a StateFn<UploadState>>,
}

impl Progress<'_> {
    fn advance(&mut self, next: UploadState) {
        debug!(from = %self.state, to = %next, "upload");
        self.state = next;
        if let Some(observe) = self.observer {
            observe(next);
        }
    }
}

/// Seal and upload one local file.
pub async fn upload_file(
    client: &RelayClient,
    local_path: &Path,
    password: &SecretString,
    observer: Option<&StateFn<UploadState>>,
) -> CcfsResult<UploadOutcome> {
    let mut progress = Progress {
        state: UploadState::Idle,
        observer,
    };

    let result = run(client, local_path, password, &mut progress).await;
    match &result {
        Ok(outcome) => {
            progress.advance(UploadState::Done);
            info!(key = %outcome.object_key, bytes = outcome.bytes, "upload complete");
        }
        Err(e) => {
            warn!(path = %local_path.display(), state = %progress.state, "upload failed: {e}");
            progress.advance(UploadState::Failed);
        }
    }
    result
}

async fn run(
    client: &RelayClient,
    local_path: &Path,
    password: &SecretString,
    progress: &mut Progress<'_>,
) -> CcfsResult<UploadOutcome> {
    let data = tokio::fs::read(local_path).await?;
    let file_name = base_name(local_path)?;

    let key = derive_key(password);
    let sealed_name = seal_filename(&file_name, &key)?;
    progress.advance(UploadState::FilenameEncrypted);

    let ticket = client.upload_ticket(&sealed_name).await?;
    progress.advance(UploadState::TicketObtained);

    let envelope = encrypt(&data, &key)?;
    let stored_bytes = envelope.len() as u64;
    progress.advance(UploadState::PayloadEncrypted);

    transfer::put_object(
        client.http(),
        &ticket.put_url,
        envelope.into_bytes(),
        &sealed_name,
    )
    .await?;
    progress.advance(UploadState::Uploaded);

    Ok(UploadOutcome {
        object_key: ticket.object_key,
        local_path: local_path.to_path_buf(),
        file_name,
        bytes: data.len() as u64,
        stored_bytes,
    })
}

fn base_name(path: &Path) -> CcfsResult<String> {
    let name = path.file_name().ok_or_else(|| {
        CcfsError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} has no file name", path.display()),
        ))
    })?;
    name.to_str().map(str::to_string).ok_or_else(|| {
        CcfsError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("file name of {} is not valid UTF-8", path.display()),
        ))
    })
}
