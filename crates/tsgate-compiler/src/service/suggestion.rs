//! Suggestion diagnostics

use tree_sitter::Node;
use tsgate_module::{node_text, ModuleRecord};

use crate::diagnostics::{Diagnostic, DiagnosticCategory, DiagnosticKind};
use crate::options::CompilerOptions;
use crate::service::analysis::{unquote, ModuleAnalysis};

/// Suggestions for a module, sorted by position
#[must_use]
pub fn check(
    options: &CompilerOptions,
    record: &ModuleRecord,
    analysis: &ModuleAnalysis,
) -> Vec<Diagnostic> {
    if record.is_library() {
        return Vec::new();
    }
    let mut out: Vec<(usize, Diagnostic)> = Vec::new();
    let mut suggest = |code, offset, message: String| {
        let diagnostic = Diagnostic::at(
            DiagnosticKind::Suggestion,
            DiagnosticCategory::Suggestion,
            code,
            record,
            offset,
            message,
        );
        out.push((offset, diagnostic));
    };

    // unused imports are semantic errors under noUnusedLocals
    if !options.no_unused_locals {
        for import in &analysis.imports {
            let unused: Vec<_> = import
                .bindings
                .iter()
                .filter(|b| !analysis.is_referenced(&b.local))
                .collect();
            if unused.len() > 1 && unused.len() == import.bindings.len() {
                suggest(
                    6192,
                    import.range.start,
                    "All imports in import declaration are unused.".to_string(),
                );
                continue;
            }
            for binding in unused {
                suggest(
                    6133,
                    binding.range.start,
                    format!("'{}' is declared but its value is never read.", binding.local),
                );
            }
        }
    }

    if !record.kind.is_typescript() {
        let root = record.tree.root_node();
        for i in 0..root.named_child_count() {
            let Some(statement) = root.named_child(i) else { continue };
            if let Some(offset) = require_call(statement, &record.text) {
                suggest(
                    80005,
                    offset,
                    "'require' call may be converted to an import.".to_string(),
                );
            }
        }
    }

    out.sort_by_key(|(offset, _)| *offset);
    out.into_iter().map(|(_, d)| d).collect()
}

/// Offset of `require` in a top-level `const x = require('...')`
fn require_call(statement: Node<'_>, src: &str) -> Option<usize> {
    if !matches!(statement.kind(), "lexical_declaration" | "variable_declaration") {
        return None;
    }
    let declarator = statement.named_child(0)?;
    let value = declarator.child_by_field_name("value")?;
    if value.kind() != "call_expression" {
        return None;
    }
    let callee = value.child_by_field_name("function")?;
    if node_text(callee, src) != "require" {
        return None;
    }
    let argument = value.child_by_field_name("arguments")?.named_child(0)?;
    let is_literal = argument.kind() == "string" && !unquote(node_text(argument, src)).is_empty();
    is_literal.then(|| callee.start_byte())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsgate_module::{ModulePath, ScriptKind};
    use tsgate_upstream::ResponseHead;
    use url::Url;

    fn suggestions(path: &str, kind: ScriptKind, text: &str, options: &CompilerOptions) -> Vec<Diagnostic> {
        let path = ModulePath::parse(path).unwrap();
        let url = Url::parse("http://app.test/").unwrap().join(path.as_str()).unwrap();
        let head = ResponseHead {
            url: url.clone(),
            status: 200,
            last_modified: None,
            content_type: None,
        };
        let record = ModuleRecord::parse(path, url, kind, text.to_string(), head).unwrap();
        let analysis = ModuleAnalysis::analyze(&record);
        check(options, &record, &analysis)
    }

    #[test]
    fn unused_import_binding() {
        let diags = suggestions(
            "/a.ts",
            ScriptKind::Ts,
            "import { a, b } from '/b.ts';\nconsole.log(a);\n",
            &CompilerOptions::default(),
        );
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, 6133);
        assert_eq!(diags[0].category, DiagnosticCategory::Suggestion);
        assert_eq!(
            diags[0].printed(),
            "suggestion /a.ts (1,13): 'b' is declared but its value is never read."
        );
    }

    #[test]
    fn whole_declaration_unused() {
        let diags = suggestions(
            "/a.ts",
            ScriptKind::Ts,
            "import { a, b } from '/b.ts';\n",
            &CompilerOptions::default(),
        );
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, 6192);
    }

    #[test]
    fn no_unused_locals_moves_to_semantic() {
        let options = CompilerOptions {
            no_unused_locals: true,
            ..CompilerOptions::default()
        };
        let diags = suggestions("/a.ts", ScriptKind::Ts, "import { a } from '/b.ts';\n", &options);
        assert!(diags.is_empty());
    }

    #[test]
    fn require_in_scripts() {
        let diags = suggestions(
            "/a.js",
            ScriptKind::Js,
            "const fs = require('fs');\nfs.readFileSync('x');\n",
            &CompilerOptions::default(),
        );
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, 80005);
        assert_eq!(diags[0].start.map(|p| p.column), Some(12));
    }
}
