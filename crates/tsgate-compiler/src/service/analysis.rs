//! Per-module syntactic facts shared by the checker and the emitter
//!
//! Everything here is derived from one module's rewritten parse tree: its
//! imports, what it exports, its top-level declarations and which names it
//! references in value and type positions.

use indexmap::IndexSet;
use std::collections::HashSet;
use std::ops::Range;
use tree_sitter::Node;
use tsgate_module::{node_text, ModuleRecord};

/// Name imported by a binding
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportedName {
    /// `import x from`
    Default,
    /// `import * as x from`
    Namespace,
    /// `import { x } from`, `import { y as x } from`
    Named(String),
}

/// One local binding introduced by an import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    /// Imported name
    pub imported: ImportedName,
    /// Local name
    pub local: String,
    /// `type` modifier on the specifier or the whole declaration
    pub type_only: bool,
    /// Range of the binding node
    pub range: Range<usize>,
}

/// An import declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDecl {
    /// Specifier without quotes (canonical after rewriting)
    pub specifier: String,
    /// Range of the quoted specifier
    pub specifier_range: Range<usize>,
    /// Bindings in source order; empty for side-effect imports
    pub bindings: Vec<ImportBinding>,
    /// `import type ...`
    pub type_only: bool,
    /// Range of the whole statement
    pub range: Range<usize>,
}

/// A re-export declaration (`export ... from '...'`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReExport {
    /// Specifier without quotes
    pub specifier: String,
    /// Range of the quoted specifier
    pub specifier_range: Range<usize>,
    /// `(imported, exported)` pairs of an export clause
    pub names: Vec<(String, String)>,
    /// `export * from`
    pub star: bool,
    /// `export * as ns from`
    pub namespace: Option<String>,
    /// `export type ... from`
    pub type_only: bool,
}

/// Top-level declaration kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationKind {
    /// `var`
    Var,
    /// `let`
    Let,
    /// `const`
    Const,
    /// Function with a body
    Function,
    /// Overload signature
    FunctionSignature,
    /// Class
    Class,
    /// Enum
    Enum,
    /// Interface
    Interface,
    /// Type alias
    TypeAlias,
    /// Namespace or module block
    Namespace,
}

impl DeclarationKind {
    /// `let` or `const`
    #[inline]
    #[must_use]
    pub fn is_block_scoped(self) -> bool {
        matches!(self, Self::Let | Self::Const)
    }

    /// Declares a value (as opposed to only a type)
    #[inline]
    #[must_use]
    pub fn is_value(self) -> bool {
        !matches!(self, Self::Interface | Self::TypeAlias)
    }
}

/// A top-level declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Declared name
    pub name: String,
    /// Kind
    pub kind: DeclarationKind,
    /// Range of the name
    pub name_range: Range<usize>,
    /// Exported with `export`
    pub exported: bool,
    /// Under `declare`
    pub ambient: bool,
}

/// Syntactic facts of one module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleAnalysis {
    /// Import declarations
    pub imports: Vec<ImportDecl>,
    /// Re-export declarations
    pub re_exports: Vec<ReExport>,
    /// Names exported by local declarations and source-less export clauses
    pub local_exports: IndexSet<String>,
    /// Has a default export
    pub has_default_export: bool,
    /// Has `export =`
    pub has_export_assignment: bool,
    /// Contains any import or export declaration
    pub is_module: bool,
    /// Top-level declarations
    pub declarations: Vec<Declaration>,
    /// Identifiers referenced in value positions
    pub value_refs: HashSet<String>,
    /// Identifiers referenced in type positions
    pub type_refs: HashSet<String>,
    /// Names of `declare module "name"` blocks
    pub ambient_modules: Vec<String>,
}

impl ModuleAnalysis {
    /// Analyze a registered module
    #[must_use]
    pub fn analyze(record: &ModuleRecord) -> Self {
        let mut analysis = Self::default();
        let src = record.text.as_str();
        let root = record.tree.root_node();

        for i in 0..root.child_count() {
            if let Some(child) = root.child(i) {
                analysis.statement(child, src, false, false);
            }
        }
        analysis.references(root, src, false);
        analysis
    }

    /// Whether `name` is referenced anywhere outside import declarations
    #[must_use]
    pub fn is_referenced(&self, name: &str) -> bool {
        self.value_refs.contains(name) || self.type_refs.contains(name)
    }

    /// Names declared only in type space
    #[must_use]
    pub fn type_only_names(&self) -> HashSet<&str> {
        let values: HashSet<&str> = self
            .declarations
            .iter()
            .filter(|d| d.kind.is_value())
            .map(|d| d.name.as_str())
            .collect();
        self.declarations
            .iter()
            .filter(|d| !d.kind.is_value() && !values.contains(d.name.as_str()))
            .map(|d| d.name.as_str())
            .collect()
    }

    fn statement(&mut self, node: Node<'_>, src: &str, exported: bool, ambient: bool) {
        match node.kind() {
            "import_statement" => {
                self.is_module = true;
                if let Some(import) = import_decl(node, src) {
                    self.imports.push(import);
                }
            }
            "import_alias" => self.is_module = true,
            "export_statement" => {
                self.is_module = true;
                self.export_statement(node, src, ambient);
            }
            "ambient_declaration" => {
                for i in 0..node.named_child_count() {
                    if let Some(child) = node.named_child(i) {
                        self.statement(child, src, exported, true);
                    }
                }
            }
            "expression_statement" => {
                if let Some(inner) = node.named_child(0) {
                    if inner.kind() == "internal_module" {
                        self.statement(inner, src, exported, ambient);
                    }
                }
            }
            "module" | "internal_module" => {
                let Some(name) = node.child_by_field_name("name") else {
                    return;
                };
                if name.kind() == "string" {
                    self.ambient_modules
                        .push(unquote(node_text(name, src)).to_string());
                    return;
                }
                let first = node_text(name, src)
                    .split('.')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                self.declare(first, DeclarationKind::Namespace, name, exported, ambient);
            }
            "lexical_declaration" | "variable_declaration" => {
                let kind = match node.child(0).map(|k| node_text(k, src)) {
                    Some("let") => DeclarationKind::Let,
                    Some("const") => DeclarationKind::Const,
                    _ => DeclarationKind::Var,
                };
                for i in 0..node.named_child_count() {
                    let Some(declarator) = node.named_child(i) else { continue };
                    if declarator.kind() != "variable_declarator" {
                        continue;
                    }
                    if let Some(name) = declarator.child_by_field_name("name") {
                        if name.kind() == "identifier" {
                            let text = node_text(name, src).to_string();
                            self.declare(text, kind, name, exported, ambient);
                        }
                    }
                }
            }
            kind => {
                let declaration_kind = match kind {
                    "function_declaration" | "generator_function_declaration" => {
                        DeclarationKind::Function
                    }
                    "function_signature" => DeclarationKind::FunctionSignature,
                    "class_declaration" | "abstract_class_declaration" | "class" => {
                        DeclarationKind::Class
                    }
                    "enum_declaration" => DeclarationKind::Enum,
                    "interface_declaration" => DeclarationKind::Interface,
                    "type_alias_declaration" => DeclarationKind::TypeAlias,
                    _ => return,
                };
                if let Some(name) = node.child_by_field_name("name") {
                    let text = node_text(name, src).to_string();
                    self.declare(text, declaration_kind, name, exported, ambient);
                }
            }
        }
    }

    fn declare(
        &mut self,
        name: String,
        kind: DeclarationKind,
        name_node: Node<'_>,
        exported: bool,
        ambient: bool,
    ) {
        if exported {
            self.local_exports.insert(name.clone());
        }
        self.declarations.push(Declaration {
            name,
            kind,
            name_range: name_node.byte_range(),
            exported,
            ambient,
        });
    }

    fn export_statement(&mut self, node: Node<'_>, src: &str, ambient: bool) {
        let is_default = has_token(node, "default");
        let type_only = has_token(node, "type");

        if has_token(node, "=") {
            self.has_export_assignment = true;
            return;
        }

        if let Some(declaration) = node.child_by_field_name("declaration") {
            if is_default {
                self.has_default_export = true;
                self.statement(declaration, src, false, ambient);
            } else {
                self.statement(declaration, src, true, ambient);
            }
            return;
        }
        if is_default {
            // export default <expression>
            self.has_default_export = true;
            return;
        }

        let source = node.child_by_field_name("source");
        let clause = named_child_of_kind(node, "export_clause");
        let names = clause.map(|c| export_names(c, src)).unwrap_or_default();

        match source {
            Some(source) => {
                let namespace = named_child_of_kind(node, "namespace_export").and_then(|ns| {
                    ns.named_child(0).map(|n| unquote(node_text(n, src)).to_string())
                });
                let star = clause.is_none() && namespace.is_none();
                for (_, exported) in &names {
                    if exported == "default" {
                        self.has_default_export = true;
                    }
                }
                self.re_exports.push(ReExport {
                    specifier: unquote(node_text(source, src)).to_string(),
                    specifier_range: source.byte_range(),
                    names,
                    star,
                    namespace,
                    type_only,
                });
            }
            None => {
                for (_, exported) in names {
                    if exported == "default" {
                        self.has_default_export = true;
                    } else {
                        self.local_exports.insert(exported);
                    }
                }
            }
        }
    }

    fn references(&mut self, node: Node<'_>, src: &str, in_type: bool) {
        match node.kind() {
            "import_statement" | "import_alias" => return,
            "export_statement" if node.child_by_field_name("source").is_some() => return,
            "identifier" | "shorthand_property_identifier" => {
                let name = node_text(node, src).to_string();
                if in_type {
                    self.type_refs.insert(name);
                } else {
                    self.value_refs.insert(name);
                }
                return;
            }
            "type_identifier" => {
                self.type_refs.insert(node_text(node, src).to_string());
                return;
            }
            "as_expression" | "satisfies_expression" => {
                let mut after_keyword = false;
                for i in 0..node.child_count() {
                    let Some(child) = node.child(i) else { continue };
                    if matches!(child.kind(), "as" | "satisfies") {
                        after_keyword = true;
                        continue;
                    }
                    self.references(child, src, in_type || after_keyword);
                }
                return;
            }
            _ => {}
        }

        let in_type = in_type || is_type_context(node.kind());
        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                self.references(child, src, in_type);
            }
        }
    }
}

/// Node kinds whose whole subtree is in type space
#[must_use]
pub fn is_type_context(kind: &str) -> bool {
    matches!(
        kind,
        "type_annotation"
            | "type_arguments"
            | "type_parameters"
            | "implements_clause"
            | "extends_type_clause"
            | "interface_declaration"
            | "type_alias_declaration"
            | "asserts_annotation"
            | "type_predicate_annotation"
            | "function_signature"
            | "method_signature"
            | "abstract_method_signature"
            | "index_signature"
            | "ambient_declaration"
    )
}

fn import_decl(node: Node<'_>, src: &str) -> Option<ImportDecl> {
    let source = node.child_by_field_name("source")?;
    let type_only = has_token(node, "type");
    let mut bindings = Vec::new();

    if let Some(clause) = named_child_of_kind(node, "import_clause") {
        for i in 0..clause.named_child_count() {
            let Some(part) = clause.named_child(i) else { continue };
            match part.kind() {
                "identifier" => bindings.push(ImportBinding {
                    imported: ImportedName::Default,
                    local: node_text(part, src).to_string(),
                    type_only,
                    range: part.byte_range(),
                }),
                "namespace_import" => {
                    if let Some(local) = named_child_of_kind(part, "identifier") {
                        bindings.push(ImportBinding {
                            imported: ImportedName::Namespace,
                            local: node_text(local, src).to_string(),
                            type_only,
                            range: part.byte_range(),
                        });
                    }
                }
                "named_imports" => {
                    for j in 0..part.named_child_count() {
                        let Some(spec) = part.named_child(j) else { continue };
                        if spec.kind() != "import_specifier" {
                            continue;
                        }
                        let Some(name) = spec.child_by_field_name("name") else {
                            continue;
                        };
                        let imported = unquote(node_text(name, src)).to_string();
                        let local = spec
                            .child_by_field_name("alias")
                            .map_or_else(|| imported.clone(), |a| node_text(a, src).to_string());
                        let imported = if imported == "default" {
                            ImportedName::Default
                        } else {
                            ImportedName::Named(imported)
                        };
                        bindings.push(ImportBinding {
                            imported,
                            local,
                            type_only: type_only || has_token(spec, "type"),
                            range: spec.byte_range(),
                        });
                    }
                }
                _ => {}
            }
        }
    }

    Some(ImportDecl {
        specifier: unquote(node_text(source, src)).to_string(),
        specifier_range: source.byte_range(),
        bindings,
        type_only,
        range: node.byte_range(),
    })
}

fn export_names(clause: Node<'_>, src: &str) -> Vec<(String, String)> {
    let mut names = Vec::new();
    for i in 0..clause.named_child_count() {
        let Some(spec) = clause.named_child(i) else { continue };
        if spec.kind() != "export_specifier" {
            continue;
        }
        let Some(name) = spec.child_by_field_name("name") else {
            continue;
        };
        let local = unquote(node_text(name, src)).to_string();
        let exported = spec
            .child_by_field_name("alias")
            .map_or_else(|| local.clone(), |a| unquote(node_text(a, src)).to_string());
        names.push((local, exported));
    }
    names
}

/// Strip matching quotes from a string literal
#[must_use]
pub fn unquote(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2
        && matches!(bytes[0], b'"' | b'\'' | b'`')
        && bytes[bytes.len() - 1] == bytes[0]
    {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

/// Whether `node` has a direct anonymous child token `token`
#[must_use]
pub fn has_token(node: Node<'_>, token: &str) -> bool {
    (0..node.child_count())
        .filter_map(|i| node.child(i))
        .any(|child| !child.is_named() && child.kind() == token)
}

/// First direct named child of a kind
#[must_use]
pub fn named_child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    (0..node.named_child_count())
        .filter_map(|i| node.named_child(i))
        .find(|child| child.kind() == kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsgate_module::{ModulePath, ScriptKind};
    use tsgate_upstream::ResponseHead;
    use url::Url;

    fn analyze(text: &str) -> ModuleAnalysis {
        let path = ModulePath::parse("/src/a.ts").unwrap();
        let url = Url::parse("http://app.test/src/a.ts").unwrap();
        let head = ResponseHead {
            url: url.clone(),
            status: 200,
            last_modified: None,
            content_type: None,
        };
        let record = ModuleRecord::parse(path, url, ScriptKind::Ts, text.to_string(), head).unwrap();
        ModuleAnalysis::analyze(&record)
    }

    #[test]
    fn collects_import_bindings() {
        let a = analyze(
            "import D, { b, c as d, type T } from '/src/x.ts';\nimport * as ns from '/src/y.ts';\nimport '/src/z.ts';\n",
        );
        assert_eq!(a.imports.len(), 3);

        let first = &a.imports[0];
        assert_eq!(first.specifier, "/src/x.ts");
        let locals: Vec<_> = first.bindings.iter().map(|b| b.local.as_str()).collect();
        assert_eq!(locals, vec!["D", "b", "d", "T"]);
        assert_eq!(first.bindings[0].imported, ImportedName::Default);
        assert_eq!(first.bindings[2].imported, ImportedName::Named("c".to_string()));
        assert!(first.bindings[3].type_only);

        assert_eq!(a.imports[1].bindings[0].imported, ImportedName::Namespace);
        assert!(a.imports[2].bindings.is_empty());
        assert!(a.is_module);
    }

    #[test]
    fn collects_exports() {
        let a = analyze(
            "export const x = 1;\nexport function f() {}\nexport interface I {}\nconst y = 2;\nexport { y as z };\nexport default class {}\nexport * from '/src/b.ts';\nexport { q } from '/src/c.ts';\n",
        );
        let exports: Vec<_> = a.local_exports.iter().map(String::as_str).collect();
        assert_eq!(exports, vec!["x", "f", "I", "z"]);
        assert!(a.has_default_export);
        assert_eq!(a.re_exports.len(), 2);
        assert!(a.re_exports[0].star);
        assert_eq!(a.re_exports[1].names, vec![("q".to_string(), "q".to_string())]);
    }

    #[test]
    fn script_without_module_syntax() {
        let a = analyze("const a = 1;\nfunction f() {}\n");
        assert!(!a.is_module);
        assert_eq!(a.declarations.len(), 2);
        assert_eq!(a.declarations[0].kind, DeclarationKind::Const);
        assert_eq!(a.declarations[1].kind, DeclarationKind::Function);
    }

    #[test]
    fn separates_value_and_type_references() {
        let a = analyze(
            "import { A, B, C } from '/src/x.ts';\nconst v: A = B;\nconst w = v as C;\n",
        );
        assert!(a.value_refs.contains("B"));
        assert!(!a.value_refs.contains("A"));
        assert!(a.type_refs.contains("A"));
        assert!(a.type_refs.contains("C"));
        assert!(!a.value_refs.contains("C"));
    }

    #[test]
    fn ambient_module_names() {
        let a = analyze("declare module 'react' {\n  export const x: number;\n}\n");
        assert_eq!(a.ambient_modules, vec!["react".to_string()]);
    }

    #[test]
    fn unquote_literals() {
        assert_eq!(unquote("'a'"), "a");
        assert_eq!(unquote("\"b\""), "b");
        assert_eq!(unquote("c"), "c");
    }
}
