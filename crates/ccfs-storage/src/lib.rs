//! ccfs-storage: the blob store capability used by the broker
//!
//! The broker never moves object bytes. It only asks a [`BlobStore`] to mint
//! short-lived capability URLs that clients then use directly.

pub mod blob;
pub mod health;
pub mod memory;
pub mod s3;

pub use blob::{Acl, BlobStore, Metadata, ObjectMeta};
pub use health::check_health;
pub use memory::{MemoryBlobStore, StoredObject};
pub use s3::{build_operator, S3BlobStore, S3Settings};
