//! Error types for scheduler communication.

use thiserror::Error;

/// Result type alias for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors raised while talking to the scheduler.
///
/// All of these are transient from the reconciler's point of view: they are
/// logged and the owning task carries on.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid scheduler url: {0}")]
    InvalidUrl(String),

    #[error("scheduler connection failed: {0}")]
    Connect(String),

    #[error("scheduler returned HTTP {status} for {path}")]
    Status { status: u16, path: String },

    #[error("scheduler request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("scheduler transport error: {0}")]
    Transport(String),

    #[error("malformed scheduler payload: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for SchedulerError {
    fn from(e: serde_json::Error) -> Self {
        SchedulerError::Decode(e.to_string())
    }
}

impl From<hyper::Error> for SchedulerError {
    fn from(e: hyper::Error) -> Self {
        SchedulerError::Transport(e.to_string())
    }
}
