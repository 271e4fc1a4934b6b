//! Built-in language service
//!
//! A tree-sitter based checker and emitter driven entirely through the
//! [`LanguageServiceHost`] callbacks. It never fetches anything: every file
//! it looks at must already be known to the host.
//!
//! Per-module analysis is memoized by `(path, version)`, so replacing a
//! module's content invalidates exactly that module.

pub mod analysis;
pub mod emitter;
pub mod option_checks;
pub mod semantic;
pub mod suggestion;
pub mod syntactic;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tsgate_module::{ModulePath, ModuleRecord, ScriptKind, DEFAULT_LIB_FILE_NAME};

use crate::diagnostics::Diagnostic;
use crate::error::HostError;
use crate::options::CompilerOptions;
use analysis::ModuleAnalysis;

/// Callbacks the language service uses to see the program
pub trait LanguageServiceHost: Send + Sync {
    /// Compiler options of the pass
    fn compilation_settings(&self) -> &CompilerOptions;

    /// Every known file: registered modules, libraries and extra libraries
    fn script_file_names(&self) -> Vec<ModulePath>;

    /// Content version of a known file
    fn script_version(&self, path: &ModulePath) -> Option<u32>;

    /// Script kind by suffix
    fn script_kind(&self, path: &ModulePath) -> ScriptKind {
        ScriptKind::from_path(path.as_str(), self.compilation_settings().allow_js)
    }

    /// Whether a file is known
    fn file_exists(&self, path: &ModulePath) -> bool;

    /// Rewritten text of a known file
    fn read_file(&self, path: &ModulePath) -> Option<String>;

    /// Snapshot of a known file, with its parse tree
    fn source_file(&self, path: &ModulePath) -> Option<Arc<ModuleRecord>>;

    /// Name of the default library
    fn default_lib_file_name(&self) -> &str {
        DEFAULT_LIB_FILE_NAME
    }
}

/// One emitted file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    /// Output file name
    pub name: String,
    /// Output text
    pub text: String,
}

/// Emission result for one module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitOutput {
    /// Nothing was emitted
    pub emit_skipped: bool,
    /// Emitted files
    pub output_files: Vec<OutputFile>,
}

/// Checker and emitter over a [`LanguageServiceHost`]
#[derive(Debug, Default)]
pub struct LanguageService {
    analyses: DashMap<(ModulePath, u32), Arc<ModuleAnalysis>>,
}

impl LanguageService {
    /// Create service
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Memoized analysis of a known file
    pub fn analysis(
        &self,
        host: &dyn LanguageServiceHost,
        path: &ModulePath,
    ) -> Option<Arc<ModuleAnalysis>> {
        let record = host.source_file(path)?;
        let key = (path.clone(), record.version);
        if let Some(hit) = self.analyses.get(&key) {
            return Some(Arc::clone(hit.value()));
        }

        self.analyses
            .retain(|(p, version), _| p != path || *version == record.version);
        let analysis = Arc::new(ModuleAnalysis::analyze(&record));
        self.analyses.insert(key, Arc::clone(&analysis));
        Some(analysis)
    }

    /// Diagnostics for the option set itself
    #[must_use]
    pub fn compiler_options_diagnostics(&self, host: &dyn LanguageServiceHost) -> Vec<Diagnostic> {
        option_checks::check(host.compilation_settings())
    }

    /// Syntax errors of a file
    ///
    /// # Errors
    ///
    /// Returns [`HostError::MissingModule`] for an unknown path.
    pub fn syntactic_diagnostics(
        &self,
        host: &dyn LanguageServiceHost,
        path: &ModulePath,
    ) -> Result<Vec<Diagnostic>, HostError> {
        let record = Self::record(host, path)?;
        Ok(syntactic::check(&record))
    }

    /// Binding and type errors of a file
    ///
    /// # Errors
    ///
    /// Returns [`HostError::MissingModule`] for an unknown path.
    pub fn semantic_diagnostics(
        &self,
        host: &dyn LanguageServiceHost,
        path: &ModulePath,
    ) -> Result<Vec<Diagnostic>, HostError> {
        let record = Self::record(host, path)?;
        let analysis = self.analysis_of(host, &record);
        Ok(semantic::check(self, host, &record, &analysis))
    }

    /// Suggestions for a file
    ///
    /// # Errors
    ///
    /// Returns [`HostError::MissingModule`] for an unknown path.
    pub fn suggestion_diagnostics(
        &self,
        host: &dyn LanguageServiceHost,
        path: &ModulePath,
    ) -> Result<Vec<Diagnostic>, HostError> {
        let record = Self::record(host, path)?;
        let analysis = self.analysis_of(host, &record);
        Ok(suggestion::check(
            host.compilation_settings(),
            &record,
            &analysis,
        ))
    }

    /// JavaScript output of a file
    ///
    /// Declaration files, libraries and files with syntax errors are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::MissingModule`] for an unknown path, or a module
    /// error if the emitter cannot apply its edits.
    pub fn emit_output(
        &self,
        host: &dyn LanguageServiceHost,
        path: &ModulePath,
    ) -> Result<EmitOutput, HostError> {
        let record = Self::record(host, path)?;
        if record.is_library() || path.is_declaration_file() {
            return Ok(EmitOutput {
                emit_skipped: true,
                output_files: Vec::new(),
            });
        }
        if record.tree.root_node().has_error() {
            tracing::debug!(
                path = %path,
                near = ?syntactic::first_error_text(&record),
                "Skipped emit of module with syntax errors"
            );
            return Ok(EmitOutput {
                emit_skipped: true,
                output_files: Vec::new(),
            });
        }

        let analysis = self.analysis_of(host, &record);
        let text = emitter::emit(&record, &analysis, host.compilation_settings())?;
        Ok(EmitOutput {
            emit_skipped: false,
            output_files: vec![OutputFile {
                name: output_name(path),
                text,
            }],
        })
    }

    fn record(
        host: &dyn LanguageServiceHost,
        path: &ModulePath,
    ) -> Result<Arc<ModuleRecord>, HostError> {
        host.source_file(path)
            .ok_or_else(|| HostError::MissingModule(path.clone()))
    }

    fn analysis_of(
        &self,
        host: &dyn LanguageServiceHost,
        record: &ModuleRecord,
    ) -> Arc<ModuleAnalysis> {
        self.analysis(host, &record.path)
            .unwrap_or_else(|| Arc::new(ModuleAnalysis::analyze(record)))
    }
}

/// Output file name: `.ts` → `.js`, `.tsx` → `.jsx` (JSX is preserved)
#[must_use]
pub fn output_name(path: &ModulePath) -> String {
    let name = path.as_str();
    if let Some(stem) = name.strip_suffix(".tsx") {
        format!("{stem}.jsx")
    } else if let Some(stem) = name.strip_suffix(".ts") {
        format!("{stem}.js")
    } else {
        name.to_string()
    }
}
