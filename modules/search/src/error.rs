use std::time::Duration;

use event_bus::consumer_retry::Retryable;

/// Why an envelope could not be applied to the projection
///
/// `Malformed` and `InvalidPayload` are deterministic: the same bytes fail
/// the same way every time, so they go straight to the dead-letter table.
/// The rest are transient and retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApplyError {
    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("apply timed out after {0:?}")]
    Timeout(Duration),

    #[error("projection store unavailable: {0}")]
    Unavailable(String),
}

impl Retryable for ApplyError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApplyError::Storage(_) | ApplyError::Timeout(_) | ApplyError::Unavailable(_)
        )
    }
}

impl From<sqlx::Error> for ApplyError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                ApplyError::Unavailable(err.to_string())
            }
            other => ApplyError::Storage(other.to_string()),
        }
    }
}
