//! Compiled output records

use indexmap::IndexMap;
use tsgate_module::ModulePath;
use tsgate_upstream::ResponseHead;
use url::Url;

use crate::diagnostics::{DiagnosticReport, DiagnosticsResult};

/// Output of one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledOutput {
    /// Module path
    pub path: ModulePath,
    /// Source URL
    pub url: Url,
    /// Compiled JavaScript, absent when emission was skipped
    pub compiled: Option<String>,
    /// Syntactic, semantic and suggestion diagnostics, in that order
    pub diagnostics: Vec<DiagnosticsResult>,
    /// Upstream response metadata of the source
    pub response: ResponseHead,
}

impl CompiledOutput {
    /// Whether any diagnostic of this module is an error
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .flat_map(|r| r.diagnostics.iter())
            .any(|d| d.is_error())
    }
}

/// Outputs of every module of one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedEmitOutput {
    /// Outputs in registration order
    pub files: IndexMap<ModulePath, CompiledOutput>,
    /// Compiler-option diagnostics, reported once per pass
    pub diagnostics: DiagnosticsResult,
}

impl CombinedEmitOutput {
    /// Output of a module
    #[must_use]
    pub fn get(&self, path: &ModulePath) -> Option<&CompiledOutput> {
        self.files.get(path)
    }

    /// Output of the module fetched from `url`
    #[must_use]
    pub fn find_by_url(&self, url: &Url) -> Option<&CompiledOutput> {
        let source = tsgate_upstream::source_url(url);
        self.files.values().find(|output| output.url == source)
    }

    /// Every diagnostic of the pass in report order: compiler options, then
    /// each module's groups in registration order
    #[must_use]
    pub fn report(&self) -> DiagnosticReport {
        let mut report = DiagnosticReport::new();
        report.push(self.diagnostics.clone());
        for output in self.files.values() {
            report.extend(output.diagnostics.iter().cloned());
        }
        report
    }

    /// Number of modules with compiled text
    #[must_use]
    pub fn compiled_count(&self) -> usize {
        self.files.values().filter(|o| o.compiled.is_some()).count()
    }
}
