//! tsgate Compiler
//!
//! Incremental TypeScript compilation host.
//!
//! # Overview
//!
//! - [`CompilationHost`]: fetches a root module and its transitive closure,
//!   with single-flight ingestion per path, and serves the graph to the
//!   language service
//! - [`ImportRewriter`]: rewrites import specifiers to canonical paths and
//!   reports dependencies
//! - [`LanguageService`]: option, syntactic, semantic and suggestion
//!   diagnostics plus JavaScript emission
//! - [`CombinedEmitOutput`]: compiled text, diagnostics and upstream
//!   metadata of every module in a pass
//!
//! # Example
//!
//! ```ignore
//! let host = CompilationHost::new(upstream, HostConfig::new(origin, lib_base));
//! host.add_lib_files(None).await?;
//! host.add_root_file(path, url, Some(response)).await?;
//! let output = host.emit_outputs()?;
//! ```

pub mod diagnostics;
pub mod emit;
pub mod error;
pub mod host;
pub mod options;
pub mod rewriter;
pub mod service;

pub use diagnostics::{
    Diagnostic, DiagnosticCategory, DiagnosticKind, DiagnosticReport, DiagnosticsResult,
    MessageChain, RelatedInformation,
};
pub use emit::{CombinedEmitOutput, CompiledOutput};
pub use error::HostError;
pub use host::{CompilationHost, ExtraLib, HostConfig, IngestTask};
pub use options::{CompilerOptions, ModuleKind, ModuleResolutionKind, ScriptTarget, TsConfig};
pub use rewriter::{Dependency, DependencyKind, DependencySink, ImportRewriter, RewriteResult};
pub use service::{output_name, EmitOutput, LanguageService, LanguageServiceHost, OutputFile};
