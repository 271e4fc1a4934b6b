//! Compiler-option diagnostics

use crate::diagnostics::{Diagnostic, DiagnosticCategory, DiagnosticKind};
use crate::options::{CompilerOptions, ModuleKind};

/// Diagnostics for an inconsistent option set
#[must_use]
pub fn check(options: &CompilerOptions) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    let mut error = |code, message: &str| {
        out.push(Diagnostic::global(
            DiagnosticKind::CompilerOption,
            DiagnosticCategory::Error,
            code,
            message,
        ));
    };

    if options.check_js && !options.allow_js {
        error(
            5052,
            "Option 'checkJs' cannot be specified without specifying option 'allowJs'.",
        );
    }
    if options.out_file.is_some() && !matches!(options.module, ModuleKind::Amd | ModuleKind::System)
    {
        error(
            6131,
            "Cannot compile modules using option 'outFile' unless the '--module' flag is 'amd' or 'system'.",
        );
    }
    out
}
