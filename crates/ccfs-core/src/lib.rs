pub mod config;
pub mod error;
pub mod types;

pub use error::{CcfsError, CcfsResult};
pub use types::{DownloadTicket, ObjectKey, UploadTicket};

/// Request header carrying the canned ACL on direct PUTs.
pub const ACL_HEADER: &str = "x-amz-acl";

/// Canned ACL every upload is made with.
pub const ACL_PRIVATE: &str = "private";

/// Object metadata key holding the base64 sealed filename.
pub const FILENAME_META_KEY: &str = "filename";

/// Header under which the sealed filename travels on PUT and GET.
pub const FILENAME_META_HEADER: &str = "x-amz-meta-filename";

/// Default lifetime of a minted capability URL (15 minutes).
pub const DEFAULT_TICKET_TTL_SECS: u64 = 15 * 60;
