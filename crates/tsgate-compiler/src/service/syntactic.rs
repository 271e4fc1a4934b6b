//! Syntactic diagnostics
//!
//! Parse errors come from tree-sitter `ERROR` and `MISSING` nodes. Plain
//! script files additionally reject TypeScript-only syntax.

use tree_sitter::Node;
use tsgate_module::{node_text, ModuleRecord};

use crate::diagnostics::{Diagnostic, DiagnosticCategory, DiagnosticKind};
use crate::service::analysis::has_token;

/// Syntactic diagnostics of a module in source order
#[must_use]
pub fn check(record: &ModuleRecord) -> Vec<Diagnostic> {
    let mut checker = Checker {
        record,
        typescript: record.kind.is_typescript(),
        out: Vec::new(),
    };
    checker.visit(record.tree.root_node());
    checker.out.dedup_by(|a, b| a.start == b.start && a.code == b.code);
    checker.out
}

struct Checker<'r> {
    record: &'r ModuleRecord,
    typescript: bool,
    out: Vec<Diagnostic>,
}

impl Checker<'_> {
    fn report(&mut self, code: u32, offset: usize, message: String) {
        self.out.push(Diagnostic::at(
            DiagnosticKind::Syntactic,
            DiagnosticCategory::Error,
            code,
            self.record,
            offset,
            message,
        ));
    }

    fn visit(&mut self, node: Node<'_>) {
        if node.is_missing() {
            let kind = node.kind();
            if kind.chars().any(char::is_alphanumeric) && node.is_named() {
                self.report(1003, node.start_byte(), "Identifier expected.".to_string());
            } else {
                self.report(1005, node.start_byte(), format!("'{kind}' expected."));
            }
            return;
        }
        if node.is_error() {
            let at_statement_level = node
                .parent()
                .is_none_or(|p| matches!(p.kind(), "program" | "statement_block" | "class_body"));
            if at_statement_level {
                self.report(
                    1128,
                    node.start_byte(),
                    "Declaration or statement expected.".to_string(),
                );
            } else {
                self.report(1109, node.start_byte(), "Expression expected.".to_string());
            }
            return;
        }
        if !self.typescript && self.script_only_violation(node) {
            return;
        }

        if node.has_error() || !self.typescript {
            for i in 0..node.child_count() {
                if let Some(child) = node.child(i) {
                    self.visit(child);
                }
            }
        }
    }

    /// Reports TypeScript-only syntax in a plain script; true if reported
    fn script_only_violation(&mut self, node: Node<'_>) -> bool {
        let start = node.start_byte();
        match node.kind() {
            "type_annotation" => {
                self.report(
                    8010,
                    start,
                    "Type annotations can only be used in TypeScript files.".to_string(),
                );
            }
            "type_alias_declaration" => {
                self.report(
                    8008,
                    start,
                    "Type aliases can only be used in TypeScript files.".to_string(),
                );
            }
            "interface_declaration" => self.declaration_only(start, "interface"),
            "enum_declaration" => self.declaration_only(start, "enum"),
            "internal_module" | "module" => self.declaration_only(start, "namespace"),
            "import_statement" if has_token(node, "type") => {
                self.declaration_only(start, "import type");
            }
            "import_alias" => self.declaration_only(start, "import ... ="),
            _ => return false,
        }
        true
    }

    fn declaration_only(&mut self, offset: usize, what: &str) {
        self.report(
            8006,
            offset,
            format!("'{what}' declarations can only be used in TypeScript files."),
        );
    }
}

/// Text of the first parse error, for logging
#[must_use]
pub fn first_error_text(record: &ModuleRecord) -> Option<String> {
    fn find<'t>(node: Node<'t>) -> Option<Node<'t>> {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if !node.has_error() {
            return None;
        }
        (0..node.child_count())
            .filter_map(|i| node.child(i))
            .find_map(find)
    }
    find(record.tree.root_node()).map(|n| node_text(n, &record.text).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsgate_module::{ModulePath, Position, ScriptKind};
    use tsgate_upstream::ResponseHead;
    use url::Url;

    fn record(path: &str, kind: ScriptKind, text: &str) -> ModuleRecord {
        let path = ModulePath::parse(path).unwrap();
        let url = Url::parse("http://app.test/").unwrap().join(path.as_str()).unwrap();
        let head = ResponseHead {
            url: url.clone(),
            status: 200,
            last_modified: None,
            content_type: None,
        };
        ModuleRecord::parse(path, url, kind, text.to_string(), head).unwrap()
    }

    #[test]
    fn clean_module_has_no_diagnostics() {
        let rec = record("/a.ts", ScriptKind::Ts, "export const a: number = 1;\n");
        assert!(check(&rec).is_empty());
    }

    #[test]
    fn parse_errors_are_reported() {
        let rec = record("/a.ts", ScriptKind::Ts, "const a = (1 + ;\n");
        let diags = check(&rec);
        assert!(!diags.is_empty());
        assert!(diags.iter().all(|d| d.kind == DiagnosticKind::Syntactic));
        assert!(diags.iter().all(Diagnostic::is_error));
        assert!(diags
            .iter()
            .all(|d| matches!(d.code, 1003 | 1005 | 1109 | 1128)));
        assert_eq!(diags[0].start.map(|p| p.line), Some(1));
        assert!(first_error_text(&rec).is_some());
    }

    #[test]
    fn typescript_syntax_in_scripts() {
        let rec = record(
            "/a.js",
            ScriptKind::Js,
            "const a: number = 1;\ninterface I {}\ntype T = string;\nenum E { A }\n",
        );
        let codes: Vec<_> = check(&rec).iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![8010, 8006, 8008, 8006]);

        let first = &check(&rec)[0];
        assert_eq!(first.start, Some(Position { line: 1, column: 8 }));
        assert_eq!(
            first.message.text,
            "Type annotations can only be used in TypeScript files."
        );
    }

    #[test]
    fn typescript_syntax_allowed_in_ts() {
        let rec = record(
            "/a.ts",
            ScriptKind::Ts,
            "interface I {}\ntype T = string;\nenum E { A }\n",
        );
        assert!(check(&rec).is_empty());
    }
}
