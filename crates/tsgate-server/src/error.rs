//! Gateway errors

use std::path::PathBuf;
use tsgate_compiler::HostError;
use tsgate_upstream::FetchError;

use crate::tsconfig::ConfigError;

/// Errors serving or configuring the gateway
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Settings file could not be read
    #[error("cannot read settings {path}: {source}")]
    SettingsIo {
        /// Settings file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Settings are malformed or inconsistent
    #[error("invalid settings: {0}")]
    Settings(String),

    /// Request target does not form a URL on the upstream
    #[error("invalid request target {target}: {message}")]
    InvalidTarget {
        /// Path and query as received
        target: String,
        /// Reason
        message: String,
    },

    /// Logging could not be installed
    #[error("cannot initialize logging: {0}")]
    Logging(String),

    /// Listen address could not be bound
    #[error("cannot bind {addr}: {message}")]
    Bind {
        /// Requested address
        addr: std::net::SocketAddr,
        /// Reason
        message: String,
    },

    /// Primary upstream fetch failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// `tsconfig.json` could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Compilation pass failed
    #[error(transparent)]
    Host(#[from] HostError),
}

impl ServerError {
    /// Create settings error
    pub fn settings(message: impl std::fmt::Display) -> Self {
        Self::Settings(message.to_string())
    }
}
