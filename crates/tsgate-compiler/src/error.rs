//! Compilation host errors
//!
//! Errors abort a compilation pass. Type errors and syntax errors in user
//! code are diagnostics, not errors.

use tsgate_module::{ModuleError, ModulePath};
use tsgate_upstream::FetchError;

/// Errors building the module graph or producing output
///
/// `Clone` so every waiter on a shared ingestion task observes the failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// Source, library or dependency could not be fetched
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Module could not be parsed or rewritten
    #[error(transparent)]
    Module(#[from] ModuleError),

    /// Output requested for a path that was never registered
    #[error("Missing file model for “{0}”")]
    MissingModule(ModulePath),

    /// Host dropped while one of its ingest tasks was still running
    #[error("compilation host was dropped")]
    Released,

    /// No URL can be formed for a module path
    #[error("cannot locate {path}: {message}")]
    Locate {
        /// Module path
        path: ModulePath,
        /// Reason
        message: String,
    },
}

impl HostError {
    /// Create locate error
    pub fn locate(path: &ModulePath, message: impl std::fmt::Display) -> Self {
        Self::Locate {
            path: path.clone(),
            message: message.to_string(),
        }
    }
}
