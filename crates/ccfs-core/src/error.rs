use thiserror::Error;

pub type CcfsResult<T> = Result<T, CcfsError>;

#[derive(Debug, Error)]
pub enum CcfsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("broker negotiation failed: {0}")]
    Negotiation(String),

    #[error("transfer failed: {message}")]
    Transfer {
        /// HTTP status of the blob store response, if one arrived
        status: Option<u16>,
        message: String,
    },

    #[error("authentication failed: {0} (wrong password or corrupted data)")]
    Authentication(String),

    #[error("secure random source unavailable: {0}")]
    Randomness(String),

    #[error("unsafe filename: {0}")]
    UnsafeFilename(String),

    #[error("invalid object key: {0}")]
    InvalidObjectKey(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CcfsError {
    /// Build a `Transfer` error from a non-success HTTP status.
    pub fn transfer_status(status: u16, message: impl Into<String>) -> Self {
        CcfsError::Transfer {
            status: Some(status),
            message: message.into(),
        }
    }

    /// True when the failure is caused by the caller's input (a wrong password,
    /// a mistyped key, a name that cannot be written) rather than by the
    /// network or disk.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            CcfsError::Authentication(_)
                | CcfsError::UnsafeFilename(_)
                | CcfsError::InvalidObjectKey(_)
        )
    }
}
