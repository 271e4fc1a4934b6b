//! Import Rewriter
//!
//! Walks a module's syntax tree and rewrites every relative or root-absolute
//! module specifier of an import or re-export declaration to the canonical
//! path of its target. Each target is reported to a [`DependencySink`] so the
//! host can fetch it. Leading `/// <reference lib="..." />` and
//! `/// <reference path="..." />` directives are reported the same way but
//! left untouched in the text.
//!
//! Specifiers without a recognized script suffix get `.ts` appended.
//! Everything else (bare package names, URLs, dynamic `import()`) passes
//! through unchanged.

use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::Node;
use tsgate_module::{node_text, ModulePath, ModuleRecord, TextEdit};

/// How a dependency was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// Import or re-export declaration
    Module,
    /// `/// <reference lib="..." />`
    Library,
    /// `/// <reference path="..." />`
    Reference,
}

/// A dependency discovered while rewriting
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    /// Canonical path of the target
    pub path: ModulePath,
    /// Discovery kind
    pub kind: DependencyKind,
}

/// Receives dependencies as they are discovered
///
/// Implementations decide whether a fetch must be started; the rewriter
/// reports every occurrence.
pub trait DependencySink {
    /// A dependency of `containing` was found
    fn discover(&self, containing: &ModulePath, dependency: &Dependency);
}

/// Edits and dependencies produced for one module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteResult {
    /// Specifier replacements against the module's raw text
    pub edits: Vec<TextEdit>,
    /// Distinct dependencies in discovery order
    pub dependencies: Vec<Dependency>,
}

impl RewriteResult {
    /// Dependency paths in discovery order
    #[must_use]
    pub fn dependency_paths(&self) -> Vec<ModulePath> {
        self.dependencies.iter().map(|d| d.path.clone()).collect()
    }

    fn add(&mut self, dependency: Dependency) -> bool {
        if self.dependencies.iter().any(|d| d.path == dependency.path) {
            return false;
        }
        self.dependencies.push(dependency);
        true
    }
}

static REFERENCE_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^///\s*<reference\s+(lib|path)\s*=\s*["']([^"']+)["']\s*/>"#)
        .unwrap_or_else(|_| unreachable!("reference directive pattern is valid"))
});

/// Import specifier rewriter
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportRewriter;

impl ImportRewriter {
    /// Create rewriter
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Rewrite a freshly parsed (unrewritten) record
    pub fn rewrite(&self, record: &ModuleRecord, sink: &dyn DependencySink) -> RewriteResult {
        let mut result = RewriteResult::default();
        let root = record.tree.root_node();

        self.reference_directives(record, root, sink, &mut result);
        self.visit(record, root, sink, &mut result);

        tracing::debug!(
            path = %record.path,
            edits = result.edits.len(),
            deps = result.dependencies.len(),
            "Rewrote module specifiers"
        );
        result
    }

    fn reference_directives(
        &self,
        record: &ModuleRecord,
        root: Node<'_>,
        sink: &dyn DependencySink,
        result: &mut RewriteResult,
    ) {
        for i in 0..root.child_count() {
            let Some(child) = root.child(i) else { continue };
            match child.kind() {
                "comment" => {}
                "hash_bang_line" => continue,
                _ => break,
            }

            let text = node_text(child, &record.text);
            let Some(caps) = REFERENCE_DIRECTIVE.captures(text) else {
                continue;
            };
            let target = &caps[2];
            let dependency = if &caps[1] == "lib" {
                Dependency {
                    path: ModulePath::library(target),
                    kind: DependencyKind::Library,
                }
            } else {
                // reference paths are file-relative even without `./`
                let spec = if target.starts_with('/') || target.starts_with('.') {
                    target.to_string()
                } else {
                    format!("./{target}")
                };
                let Some(path) = record.path.resolve(&spec) else {
                    continue;
                };
                Dependency {
                    path,
                    kind: DependencyKind::Reference,
                }
            };

            if record.path.is_library() && dependency.kind == DependencyKind::Reference {
                continue;
            }
            sink.discover(&record.path, &dependency);
            result.add(dependency);
        }
    }

    fn visit(
        &self,
        record: &ModuleRecord,
        node: Node<'_>,
        sink: &dyn DependencySink,
        result: &mut RewriteResult,
    ) {
        if matches!(node.kind(), "import_statement" | "export_statement") {
            if let Some(source) = node.child_by_field_name("source") {
                self.rewrite_specifier(record, source, sink, result);
            }
            // export statements may wrap declarations that hold nested modules
            if node.kind() == "import_statement" {
                return;
            }
        }

        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                self.visit(record, child, sink, result);
            }
        }
    }

    fn rewrite_specifier(
        &self,
        record: &ModuleRecord,
        source: Node<'_>,
        sink: &dyn DependencySink,
        result: &mut RewriteResult,
    ) {
        let literal = node_text(source, &record.text);
        if literal.len() < 2 {
            return;
        }
        let quote = &literal[..1];
        let specifier = &literal[1..literal.len() - 1];

        let Some(resolved) = record.path.resolve(specifier) else {
            return;
        };
        let path = resolved.with_default_extension();

        let dependency = Dependency {
            path: path.clone(),
            kind: DependencyKind::Module,
        };
        sink.discover(&record.path, &dependency);
        result.add(dependency);

        let replacement = format!("{quote}{path}{quote}");
        if replacement != literal {
            result
                .edits
                .push(TextEdit::replace(source.byte_range(), replacement));
        }
    }
}
