//! Error types for snapshot publishing.

use thiserror::Error;

/// The distribution sink refused or could not take a snapshot.
///
/// The publisher surfaces this from `tick()` and tries again on the next
/// tick with the same versions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("distribution sink unavailable: {0}")]
    Unavailable(String),

    #[error("snapshot rejected by distribution sink: {0}")]
    Rejected(String),
}
