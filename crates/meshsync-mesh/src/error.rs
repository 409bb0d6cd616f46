//! Error types for translation and certificate discovery.

use std::path::PathBuf;

use thiserror::Error;

use crate::resources::ResourceKind;

/// Result type alias for translation.
pub type TranslateResult<T> = Result<T, TranslateError>;

/// A resource body could not be turned into its published form.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("failed to serialize {kind} resource {name:?}: {source}")]
    Serialize {
        kind: ResourceKind,
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while discovering certificate bindings.
#[derive(Debug, Error)]
pub enum CertError {
    #[error("failed to read certificate directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("certificate directory {0} has no usable host name")]
    BadHostDir(PathBuf),
}
