//! Error types for the meshsync state directories.

use thiserror::Error;

/// Result type alias for state validation.
pub type StateResult<T> = Result<T, StateError>;

/// Errors raised when a desired-state record is malformed.
///
/// The directories themselves never fail; these are produced by the
/// `validate()` methods on the domain types so that bad requests are
/// rejected before they reach a directory.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("invalid route: {0}")]
    InvalidRoute(String),

    #[error("invalid route mapping: {0}")]
    InvalidMapping(String),

    #[error("invalid process association: {0}")]
    InvalidAssociation(String),
}
