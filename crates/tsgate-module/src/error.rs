//! Module layer errors

use crate::path::ModulePath;

/// Errors building or registering module records
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModuleError {
    /// Path is not a valid canonical source path
    #[error("invalid module path: {0}")]
    InvalidPath(String),

    /// Grammar could not be loaded into the parser
    #[error("parser initialization failed: {0}")]
    ParserInit(String),

    /// Parser produced no tree
    #[error("failed to parse {0}")]
    ParseFailed(ModulePath),

    /// Text edit out of bounds or overlapping another
    #[error("invalid text edit: {0}")]
    InvalidEdit(String),

    /// Replacement targets a path that was never registered
    #[error("module {0} is not registered")]
    NotRegistered(ModulePath),
}
