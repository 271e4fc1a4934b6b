//! tsgate Module
//!
//! Modules as the compilation host sees them.
//!
//! # Overview
//!
//! - [`ModulePath`]: canonical `/`-rooted path, the registry key
//! - [`ScriptKind`]: TS/TSX/JS/JSX classification by suffix
//! - [`ModuleRecord`]: raw and rewritten text, parse tree, source map
//! - [`ModuleRegistry`]: idempotent path → record store
//!
//! # Syntax
//!
//! Parsing uses `tree-sitter-typescript`. Rewrites are applied as
//! [`TextEdit`]s; the tree follows them incrementally and the resulting
//! [`SourceMap`] maps rewritten offsets back to the served source.

pub mod error;
pub mod path;
pub mod registry;
pub mod source_map;
pub mod syntax;

pub use error::ModuleError;
pub use path::{
    has_script_extension, lib_file_name, normalize, ModulePath, ScriptKind,
    DEFAULT_LIB_FILE_NAME,
};
pub use registry::{ModuleRecord, ModuleRegistry};
pub use source_map::{apply_edits, SourceMap, TextEdit};
pub use syntax::{node_text, LineIndex, Position};
