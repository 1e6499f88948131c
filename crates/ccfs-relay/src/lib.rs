//! ccfs-relay: client side of the envelope protocol
//!
//! Upload:   read → seal name → negotiate PUT → seal payload → PUT
//! Download: negotiate GET → GET → open name → open payload → save
//!
//! Both workflows run strictly in sequence and never retry. A presigned URL
//! that failed once is not replayed.

pub mod client;
pub mod download;
pub mod transfer;
pub mod upload;

pub use client::RelayClient;
pub use download::{download_file, ConfirmFn, DownloadOptions, DownloadOutcome, DownloadState};
pub use upload::{upload_file, UploadOutcome, UploadState};

/// Observer called with each workflow state as it is reached.
pub type StateFn<S> = Box<dyn Fn(S) + Send + Sync>;
