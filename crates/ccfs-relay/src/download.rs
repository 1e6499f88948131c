//! Download workflow
//!
//! `Idle → TicketObtained → Fetched → Decrypted → Saved → Done`, or `Failed`.
//! Both the filename and the payload are authenticated before anything is
//! written; the output appears under its final name only after a complete,
//! synced write.

use ccfs_core::{CcfsError, CcfsResult, ObjectKey};
use ccfs_crypto::{decrypt, derive_key, open_filename};
use secrecy::SecretString;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::client::RelayClient;
use crate::transfer;
use crate::StateFn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Idle,
    TicketObtained,
    Fetched,
    Decrypted,
    Saved,
    Done,
    Failed,
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DownloadState::Idle => "idle",
            DownloadState::TicketObtained => "ticket obtained",
            DownloadState::Fetched => "fetched",
            DownloadState::Decrypted => "decrypted",
            DownloadState::Saved => "saved",
            DownloadState::Done => "done",
            DownloadState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Asked with the recovered filename before anything is written.
/// Returning `false` skips the save.
pub type ConfirmFn = Box<dyn Fn(&str) -> bool + Send + Sync>;

pub struct DownloadOptions {
    pub output_dir: PathBuf,
    pub overwrite: bool,
    pub confirm: Option<ConfirmFn>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            overwrite: false,
            confirm: None,
        }
    }
}

impl fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("output_dir", &self.output_dir)
            .field("overwrite", &self.overwrite)
            .field("confirm", &self.confirm.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    /// Filename recovered from the object metadata
    pub file_name: String,
    /// `None` when the save was declined at the confirmation step
    pub saved_path: Option<PathBuf>,
    /// Plaintext size
    pub bytes: u64,
}

struct Progress<'a> {
    state: DownloadState,
    observer: Option<&'a StateFn<DownloadState>>,
}

impl Progress<'_> {
    fn advance(&mut self, next: DownloadState) {
        debug!(from = %self.state, to = %next, "download");
        self.state = next;
        if let Some(observe) = self.observer {
            observe(next);
        }
    }
}

/// Fetch, authenticate and save one object.
pub async fn download_file(
    client: &RelayClient,
    object_key: &ObjectKey,
    password: &SecretString,
    opts: &DownloadOptions,
    observer: Option<&StateFn<DownloadState>>,
) -> CcfsResult<DownloadOutcome> {
    let mut progress = Progress {
        state: DownloadState::Idle,
        observer,
    };

    let result = run(client, object_key, password, opts, &mut progress).await;
    match &result {
        Ok(outcome) => {
            progress.advance(DownloadState::Done);
            match &outcome.saved_path {
                Some(path) => {
                    info!(key = %object_key, path = %path.display(), "download complete")
                }
                None => info!(key = %object_key, "download declined, nothing written"),
            }
        }
        Err(e) => {
            warn!(key = %object_key, state = %progress.state, "download failed: {e}");
            progress.advance(DownloadState::Failed);
        }
    }
    result
}

async fn run(
    client: &RelayClient,
    object_key: &ObjectKey,
    password: &SecretString,
    opts: &DownloadOptions,
    progress: &mut Progress<'_>,
) -> CcfsResult<DownloadOutcome> {
    let key = derive_key(password);

    let ticket = client.download_ticket(object_key).await?;
    progress.advance(DownloadState::TicketObtained);

    let fetched = transfer::get_object(client.http(), &ticket.get_url).await?;
    progress.advance(DownloadState::Fetched);

    let sealed_name = fetched.sealed_filename.ok_or_else(|| {
        CcfsError::Authentication("object carries no sealed filename".into())
    })?;
    let file_name = open_filename(&sealed_name, &key)?;
    let safe_name = safe_file_name(&file_name)?.to_string();

    let plaintext = decrypt(&fetched.body, &key)?;
    progress.advance(DownloadState::Decrypted);

    if let Some(confirm) = &opts.confirm {
        if !confirm(&file_name) {
            return Ok(DownloadOutcome {
                file_name,
                saved_path: None,
                bytes: plaintext.len() as u64,
            });
        }
    }

    let target = opts.output_dir.join(&safe_name);
    let bytes = plaintext.len() as u64;
    let dir = opts.output_dir.clone();
    let overwrite = opts.overwrite;
    let saved = target.clone();
    tokio::task::spawn_blocking(move || write_atomically(&dir, &saved, &plaintext, overwrite))
        .await
        .map_err(|e| anyhow::anyhow!("writer task failed: {e}"))??;
    progress.advance(DownloadState::Saved);

    Ok(DownloadOutcome {
        file_name,
        saved_path: Some(target),
        bytes,
    })
}

/// Accept only a single, ordinary path component.
pub fn safe_file_name(name: &str) -> CcfsResult<&str> {
    let unsafe_name = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if unsafe_name {
        return Err(CcfsError::UnsafeFilename(name.escape_debug().to_string()));
    }
    Ok(name)
}

fn write_atomically(dir: &Path, target: &Path, data: &[u8], overwrite: bool) -> CcfsResult<()> {
    if !overwrite && target.exists() {
        return Err(already_exists(target));
    }

    let mut tmp = tempfile::Builder::new()
        .prefix(".ccfs-")
        .suffix(".partial")
        .tempfile_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;

    let persisted = if overwrite {
        tmp.persist(target)
    } else {
        tmp.persist_noclobber(target)
    };
    persisted.map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::AlreadyExists {
            already_exists(target)
        } else {
            CcfsError::Io(e.error)
        }
    })?;
    Ok(())
}

fn already_exists(target: &Path) -> CcfsError {
    CcfsError::Io(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("{} already exists (use --overwrite to replace it)", target.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_file_name_accepts_plain_names() {
        let accepted = [
            "hello.txt",
            "résumé 2026 final.pdf",
            ".bashrc",
            "a..b",
            "no-extension",
        ];
        for name in accepted {
            assert_eq!(safe_file_name(name).unwrap(), name);
        }
    }

    #[test]
    fn test_safe_file_name_rejects_traversal() {
        let rejected = [
            "",
            ".",
            "..",
            "../etc/passwd",
            "/etc/passwd",
            "dir/file",
            "dir\\file",
            "nul\0byte",
            "line\nbreak",
        ];
        for name in rejected {
            assert!(
                matches!(safe_file_name(name), Err(CcfsError::UnsafeFilename(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_write_atomically_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");
        std::fs::write(&target, b"original").unwrap();

        let err = write_atomically(dir.path(), &target, b"replacement", false).unwrap_err();
        match err {
            CcfsError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::AlreadyExists),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(std::fs::read(&target).unwrap(), b"original");

        write_atomically(dir.path(), &target, b"replacement", true).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"replacement");
    }

    #[test]
    fn test_write_atomically_leaves_no_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        write_atomically(dir.path(), &target, &[7u8; 4096], false).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["out.bin".to_string()]);
    }

    #[test]
    fn test_write_atomically_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let target = missing.join("out.txt");
        assert!(matches!(
            write_atomically(&missing, &target, b"x", false),
            Err(CcfsError::Io(_))
        ));
    }
}
