//! Semantic diagnostics
//!
//! Module-graph checks (unresolvable specifiers, missing exports) follow
//! `export *` chains across registered modules. Declaration checks look at
//! one module's top level. Type checks are limited to primitive literal
//! initializers against primitive annotations.

use std::collections::{HashMap, HashSet};
use tree_sitter::Node;
use tsgate_module::{node_text, ModulePath, ModuleRecord};

use crate::diagnostics::{Diagnostic, DiagnosticCategory, DiagnosticKind};
use crate::options::CompilerOptions;
use crate::service::analysis::{
    has_token, DeclarationKind, ImportedName, ModuleAnalysis,
};
use crate::service::{LanguageService, LanguageServiceHost};

/// Where a specifier points
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    /// A registered module or extra library
    File(ModulePath),
    /// A `declare module "..."` block somewhere in the program
    Ambient,
    /// Nothing
    Unresolved,
}

/// Names a module exports, following `export *`
#[derive(Debug, Clone, Default)]
pub(crate) struct ExportSet {
    names: HashSet<String>,
    has_default: bool,
    /// Some exports cannot be enumerated (`export =`, unresolvable `export *`)
    open: bool,
}

pub(crate) struct Resolver<'a> {
    service: &'a LanguageService,
    host: &'a dyn LanguageServiceHost,
    ambient: Option<HashSet<String>>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(service: &'a LanguageService, host: &'a dyn LanguageServiceHost) -> Self {
        Self {
            service,
            host,
            ambient: None,
        }
    }

    pub(crate) fn resolve(&mut self, specifier: &str) -> Target {
        if specifier.starts_with('/') && !specifier.starts_with("//") {
            return match ModulePath::parse(specifier) {
                Ok(path) if self.host.file_exists(&path) => Target::File(path),
                _ => Target::Unresolved,
            };
        }
        if self.ambient_modules().contains(specifier) {
            Target::Ambient
        } else {
            Target::Unresolved
        }
    }

    fn ambient_modules(&mut self) -> &HashSet<String> {
        let (service, host) = (self.service, self.host);
        self.ambient.get_or_insert_with(|| {
            host.script_file_names()
                .iter()
                .filter_map(|path| service.analysis(host, path))
                .flat_map(|a| a.ambient_modules.clone())
                .collect()
        })
    }

    pub(crate) fn exports(&mut self, path: &ModulePath) -> ExportSet {
        let mut visited = HashSet::new();
        self.exports_inner(path, &mut visited)
    }

    fn exports_inner(&mut self, path: &ModulePath, visited: &mut HashSet<ModulePath>) -> ExportSet {
        let mut set = ExportSet::default();
        if !visited.insert(path.clone()) {
            return set;
        }
        let Some(analysis) = self.service.analysis(self.host, path) else {
            set.open = true;
            return set;
        };

        set.names.extend(analysis.local_exports.iter().cloned());
        set.has_default = analysis.has_default_export;
        set.open = analysis.has_export_assignment;

        for re_export in &analysis.re_exports {
            set.names
                .extend(re_export.names.iter().map(|(_, exported)| exported.clone()));
            set.names.extend(re_export.namespace.iter().cloned());
            if !re_export.star {
                continue;
            }
            match self.resolve(&re_export.specifier) {
                Target::File(target) => {
                    let inner = self.exports_inner(&target, visited);
                    set.names.extend(inner.names);
                    set.open |= inner.open;
                }
                Target::Ambient | Target::Unresolved => set.open = true,
            }
        }
        set
    }
}

/// Semantic diagnostics of a module, sorted by position
#[must_use]
pub fn check(
    service: &LanguageService,
    host: &dyn LanguageServiceHost,
    record: &ModuleRecord,
    analysis: &ModuleAnalysis,
) -> Vec<Diagnostic> {
    let options = host.compilation_settings();
    if record.is_library() || (!record.kind.is_typescript() && !options.check_js) {
        return Vec::new();
    }

    let mut checker = Checker {
        record,
        options,
        out: Vec::new(),
    };
    checker.imports(&mut Resolver::new(service, host), analysis);
    checker.duplicates(analysis);
    checker.unused_imports(analysis);
    checker.visit(record.tree.root_node());

    checker.out.sort_by_key(|(offset, _)| *offset);
    checker.out.into_iter().map(|(_, d)| d).collect()
}

struct Checker<'r> {
    record: &'r ModuleRecord,
    options: &'r CompilerOptions,
    out: Vec<(usize, Diagnostic)>,
}

impl Checker<'_> {
    fn error(&mut self, code: u32, offset: usize, message: String) {
        let diagnostic = Diagnostic::at(
            DiagnosticKind::Semantic,
            DiagnosticCategory::Error,
            code,
            self.record,
            offset,
            message,
        );
        self.out.push((offset, diagnostic));
    }

    fn imports(&mut self, resolver: &mut Resolver<'_>, analysis: &ModuleAnalysis) {
        for import in &analysis.imports {
            if import.bindings.is_empty() {
                continue;
            }
            let offset = import.specifier_range.start;
            let target = match resolver.resolve(&import.specifier) {
                Target::File(target) => target,
                Target::Ambient => continue,
                Target::Unresolved => {
                    self.cannot_find(offset, &import.specifier);
                    continue;
                }
            };
            if !self.is_module(resolver, &target) {
                self.error(2306, offset, format!("File '{target}' is not a module."));
                continue;
            }

            let exports = resolver.exports(&target);
            if exports.open {
                continue;
            }
            for binding in &import.bindings {
                match &binding.imported {
                    ImportedName::Named(name) if !exports.names.contains(name) => {
                        self.no_exported_member(binding.range.start, &import.specifier, name);
                    }
                    ImportedName::Default if !exports.has_default => self.error(
                        1192,
                        binding.range.start,
                        format!("Module '\"{}\"' has no default export.", import.specifier),
                    ),
                    _ => {}
                }
            }
        }

        for re_export in &analysis.re_exports {
            let offset = re_export.specifier_range.start;
            let target = match resolver.resolve(&re_export.specifier) {
                Target::File(target) => target,
                Target::Ambient => continue,
                Target::Unresolved => {
                    self.cannot_find(offset, &re_export.specifier);
                    continue;
                }
            };
            if !self.is_module(resolver, &target) {
                self.error(2306, offset, format!("File '{target}' is not a module."));
                continue;
            }
            let exports = resolver.exports(&target);
            if exports.open {
                continue;
            }
            for (imported, _) in &re_export.names {
                if imported == "default" {
                    if !exports.has_default {
                        self.error(
                            1192,
                            offset,
                            format!("Module '\"{}\"' has no default export.", re_export.specifier),
                        );
                    }
                } else if !exports.names.contains(imported) {
                    self.no_exported_member(offset, &re_export.specifier, imported);
                }
            }
        }
    }

    fn is_module(&self, resolver: &Resolver<'_>, target: &ModulePath) -> bool {
        resolver
            .service
            .analysis(resolver.host, target)
            .is_none_or(|a| a.is_module)
    }

    fn cannot_find(&mut self, offset: usize, specifier: &str) {
        self.error(
            2307,
            offset,
            format!("Cannot find module '{specifier}' or its corresponding type declarations."),
        );
    }

    fn no_exported_member(&mut self, offset: usize, specifier: &str, name: &str) {
        self.error(
            2305,
            offset,
            format!("Module '\"{specifier}\"' has no exported member '{name}'."),
        );
    }

    fn duplicates(&mut self, analysis: &ModuleAnalysis) {
        let mut values: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut types: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, decl) in analysis.declarations.iter().enumerate() {
            match decl.kind {
                // merge with everything of their own kind
                DeclarationKind::Namespace | DeclarationKind::Enum | DeclarationKind::Interface => {}
                DeclarationKind::TypeAlias => types.entry(&decl.name).or_default().push(idx),
                _ => values.entry(&decl.name).or_default().push(idx),
            }
            if decl.kind == DeclarationKind::Interface || decl.kind == DeclarationKind::Class {
                types.entry(&decl.name).or_default().push(idx);
            }
        }

        let mut reported = HashSet::new();
        for (name, group) in &values {
            let decls: Vec<_> = group.iter().map(|&i| &analysis.declarations[i]).collect();
            let block_scoped = decls.iter().any(|d| d.kind.is_block_scoped());
            if block_scoped && decls.len() > 1 {
                for (&idx, decl) in group.iter().zip(&decls) {
                    if decl.kind.is_block_scoped() && reported.insert(idx) {
                        self.error(
                            2451,
                            decl.name_range.start,
                            format!("Cannot redeclare block-scoped variable '{name}'."),
                        );
                    }
                }
                continue;
            }
            if decls.iter().any(|d| d.kind == DeclarationKind::Class) && decls.len() > 1 {
                for (&idx, decl) in group.iter().zip(&decls) {
                    if reported.insert(idx) {
                        self.error(
                            2300,
                            decl.name_range.start,
                            format!("Duplicate identifier '{name}'."),
                        );
                    }
                }
                continue;
            }
            let implementations: Vec<_> = group
                .iter()
                .zip(&decls)
                .filter(|(_, d)| d.kind == DeclarationKind::Function && !d.ambient)
                .collect();
            if implementations.len() > 1 {
                for (&idx, decl) in implementations {
                    if reported.insert(idx) {
                        self.error(
                            2393,
                            decl.name_range.start,
                            "Duplicate function implementation.".to_string(),
                        );
                    }
                }
            }
        }

        for (name, group) in &types {
            let has_alias = group
                .iter()
                .any(|&i| analysis.declarations[i].kind == DeclarationKind::TypeAlias);
            if !has_alias || group.len() < 2 {
                continue;
            }
            for &idx in group {
                if reported.insert(idx) {
                    let start = analysis.declarations[idx].name_range.start;
                    self.error(2300, start, format!("Duplicate identifier '{name}'."));
                }
            }
        }
    }

    fn unused_imports(&mut self, analysis: &ModuleAnalysis) {
        if !self.options.no_unused_locals {
            return;
        }
        for binding in unused_bindings(analysis) {
            self.error(
                6133,
                binding.0,
                format!("'{}' is declared but its value is never read.", binding.1),
            );
        }
    }

    fn visit(&mut self, node: Node<'_>) {
        match node.kind() {
            "variable_declarator" => self.literal_initializer(node),
            "enum_declaration" => {
                self.enum_members(node);
                self.erasable(node, "name");
            }
            "internal_module" | "module" => self.erasable_namespace(node),
            "required_parameter" | "optional_parameter" => {
                if is_parameter_property(node) {
                    self.erasable(node, "");
                }
            }
            "import_alias" | "type_assertion" => self.erasable(node, ""),
            "import_statement" => {
                if named_child(node, "import_require_clause").is_some() {
                    self.erasable(node, "");
                }
                return;
            }
            "export_statement" if has_token(node, "=") => self.erasable(node, ""),
            "ambient_declaration" => return,
            _ => {}
        }
        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                self.visit(child);
            }
        }
    }

    fn literal_initializer(&mut self, declarator: Node<'_>) {
        let src = self.record.text.as_str();
        let (Some(name), Some(annotation), Some(value)) = (
            declarator.child_by_field_name("name"),
            declarator.child_by_field_name("type"),
            declarator.child_by_field_name("value"),
        ) else {
            return;
        };
        let Some(target) = annotation.named_child(0) else {
            return;
        };
        if target.kind() != "predefined_type" {
            return;
        }
        let target = node_text(target, src);
        if !matches!(target, "number" | "string" | "boolean" | "bigint") {
            return;
        }
        let Some(source) = literal_type(value, src) else {
            return;
        };
        if source != target {
            self.error(
                2322,
                name.start_byte(),
                format!("Type '{source}' is not assignable to type '{target}'."),
            );
        }
    }

    fn enum_members(&mut self, node: Node<'_>) {
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let mut previous_needs_initializer = false;
        for i in 0..body.named_child_count() {
            let Some(member) = body.named_child(i) else { continue };
            if member.kind() == "enum_assignment" {
                previous_needs_initializer = member
                    .child_by_field_name("value")
                    .is_some_and(|v| {
                        matches!(v.kind(), "string" | "template_string" | "call_expression")
                    });
            } else if member.kind() != "comment" {
                if previous_needs_initializer {
                    self.error(
                        1061,
                        member.start_byte(),
                        "Enum member must have initializer.".to_string(),
                    );
                }
                previous_needs_initializer = false;
            }
        }
    }

    fn erasable_namespace(&mut self, node: Node<'_>) {
        let ambient = node
            .parent()
            .is_some_and(|p| p.kind() == "ambient_declaration");
        if !ambient && is_instantiated(node) {
            self.erasable(node, "name");
        }
    }

    fn erasable(&mut self, node: Node<'_>, field: &str) {
        if !self.options.erasable_syntax_only {
            return;
        }
        let anchor = if field.is_empty() {
            node
        } else {
            node.child_by_field_name(field).unwrap_or(node)
        };
        self.error(
            1294,
            anchor.start_byte(),
            "This syntax is not allowed when 'erasableSyntaxOnly' is enabled.".to_string(),
        );
    }
}

/// `(offset, local)` of import bindings never referenced
pub(crate) fn unused_bindings(analysis: &ModuleAnalysis) -> Vec<(usize, &str)> {
    analysis
        .imports
        .iter()
        .flat_map(|import| import.bindings.iter())
        .filter(|binding| !analysis.is_referenced(&binding.local))
        .map(|binding| (binding.range.start, binding.local.as_str()))
        .collect()
}

fn literal_type(value: Node<'_>, src: &str) -> Option<&'static str> {
    match value.kind() {
        "number" => Some(if node_text(value, src).ends_with('n') {
            "bigint"
        } else {
            "number"
        }),
        "string" => Some("string"),
        "template_string" if named_child(value, "template_substitution").is_none() => {
            Some("string")
        }
        "true" | "false" => Some("boolean"),
        _ => None,
    }
}

/// Constructor parameter with an accessibility or `readonly` modifier
pub(crate) fn is_parameter_property(param: Node<'_>) -> bool {
    named_child(param, "accessibility_modifier").is_some()
        || named_child(param, "override_modifier").is_some()
        || has_token(param, "readonly")
}

/// Whether a namespace holds anything that exists at runtime
pub(crate) fn is_instantiated(namespace: Node<'_>) -> bool {
    let Some(body) = namespace.child_by_field_name("body") else {
        return false;
    };
    (0..body.named_child_count())
        .filter_map(|i| body.named_child(i))
        .any(statement_is_instantiated)
}

fn statement_is_instantiated(statement: Node<'_>) -> bool {
    match statement.kind() {
        "comment" | "interface_declaration" | "type_alias_declaration" | "ambient_declaration"
        | "function_signature" | "empty_statement" => false,
        "internal_module" | "module" => is_instantiated(statement),
        "expression_statement" => statement
            .named_child(0)
            .is_none_or(|inner| inner.kind() != "internal_module" || is_instantiated(inner)),
        "export_statement" => statement
            .child_by_field_name("declaration")
            .is_none_or(statement_is_instantiated),
        "enum_declaration" => !has_token(statement, "const"),
        _ => true,
    }
}

fn named_child<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    crate::service::analysis::named_child_of_kind(node, kind)
}
