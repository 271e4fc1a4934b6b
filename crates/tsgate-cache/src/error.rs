//! Store errors
//!
//! Callers on the request path log these and carry on as if the entry were
//! absent.

use std::path::PathBuf;

/// Errors reading or writing the key/value store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem operation failed
    #[error("store i/o on {path}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Value could not be serialized
    #[error("cannot encode value for key {key}: {source}")]
    Encode {
        /// Store key
        key: String,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// Stored bytes are not a valid value
    #[error("cannot decode value for key {key}: {source}")]
    Decode {
        /// Store key
        key: String,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Create i/o error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
