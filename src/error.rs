//! Error taxonomy shared by the transformer, reconciler, remote client and
//! orchestrators.
use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// API key or endpoint missing. Raised before any network call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Remote answered 401/403, or an inbound key did not match.
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("{0}")]
    NotFound(String),

    /// Non-2xx, non-auth remote answer.
    #[error("remote error{}: {message}", http_suffix(.status))]
    Remote { status: Option<u16>, message: String },

    /// Malformed entity data that cannot be turned into a document or post.
    #[error("transform error: {0}")]
    Transform(String),

    /// Caller supplied an invalid value (unknown status, empty title, ...).
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Connection refused, timeout, unreadable body.
    #[error("connection failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

fn http_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl SyncError {
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Authentication(_))
    }

    /// Configuration and authentication failures abort a whole batch; every
    /// other error is recorded against the single item being processed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Configuration(_) | SyncError::Authentication(_)
        )
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Storage(err.into())
    }
}
