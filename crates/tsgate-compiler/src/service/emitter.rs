//! JavaScript emitter
//!
//! Output is the module's rewritten text with TypeScript-only syntax erased.
//! Enums and instantiated namespaces are lowered to the usual IIFE form,
//! constructor parameter properties become `this.x = x;` assignments and
//! imports used only as types are elided. Nothing else is downleveled: the
//! output keeps ES module syntax and JSX as written.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use tree_sitter::Node;
use tsgate_module::{apply_edits, node_text, ModuleError, ModuleRecord, TextEdit};

use crate::options::CompilerOptions;
use crate::service::analysis::{
    has_token, named_child_of_kind, unquote, DeclarationKind, ImportBinding, ModuleAnalysis,
};
use crate::service::semantic::{is_instantiated, is_parameter_property};

const INDENT: &str = "    ";

/// Emit JavaScript for a module
///
/// Plain scripts are returned unchanged.
///
/// # Errors
///
/// Returns an error if the computed edits overlap, which indicates a tree
/// shape the emitter does not understand.
pub fn emit(
    record: &ModuleRecord,
    analysis: &ModuleAnalysis,
    options: &CompilerOptions,
) -> Result<String, ModuleError> {
    if !record.kind.is_typescript() {
        return Ok(record.text.clone());
    }

    let src = record.text.as_str();
    let mut emitter = Emitter::new(src, analysis, options.verbatim_module_syntax);
    let root = record.tree.root_node();

    let mut edits = Vec::new();
    let (mut module_statements, mut removed) = (0, 0);
    for i in 0..root.child_count() {
        let Some(child) = root.child(i) else { continue };
        let gone = emitter.visit(child, &mut edits)?;
        if matches!(child.kind(), "import_statement" | "export_statement") {
            module_statements += 1;
            removed += usize::from(gone);
        }
    }

    let (mut text, _) = apply_edits(src, &edits)?;
    if module_statements > 0 && module_statements == removed {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str("export {};\n");
    }
    Ok(text)
}

/// Value of an enum member known at compile time
#[derive(Debug, Clone, PartialEq)]
enum EnumValue {
    Number(f64),
    /// Raw string literal, quotes included
    Str(String),
}

struct Emitter<'a> {
    src: &'a str,
    analysis: &'a ModuleAnalysis,
    verbatim: bool,
    /// Locals that exist only in type space after elision
    type_only: HashSet<String>,
    /// Parameter names of enclosing namespace IIFEs
    namespaces: Vec<String>,
    /// Names declared per scope, to avoid redeclaring merged enums and namespaces
    scopes: Vec<HashSet<String>>,
    /// Edits never reach outside this range
    bounds: Range<usize>,
}

impl<'a> Emitter<'a> {
    fn new(src: &'a str, analysis: &'a ModuleAnalysis, verbatim: bool) -> Self {
        let mut type_only: HashSet<String> = analysis
            .type_only_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        for import in &analysis.imports {
            for binding in &import.bindings {
                if is_elided(binding, analysis, verbatim) {
                    type_only.insert(binding.local.clone());
                }
            }
        }

        let top_level = analysis
            .declarations
            .iter()
            .filter(|d| d.kind.is_value() && !d.ambient)
            .filter(|d| !matches!(d.kind, DeclarationKind::Enum | DeclarationKind::Namespace))
            .map(|d| d.name.clone())
            .collect();

        Self {
            src,
            analysis,
            verbatim,
            type_only,
            namespaces: Vec::new(),
            scopes: vec![top_level],
            bounds: 0..src.len(),
        }
    }

    /// Collect edits for `node`; true if the node is removed entirely
    fn visit(&mut self, node: Node<'_>, edits: &mut Vec<TextEdit>) -> Result<bool, ModuleError> {
        match node.kind() {
            "interface_declaration"
            | "type_alias_declaration"
            | "ambient_declaration"
            | "function_signature"
            | "method_signature"
            | "abstract_method_signature"
            | "index_signature" => return Ok(self.remove(node, edits)),
            "public_field_definition" if has_token(node, "declare") || has_token(node, "abstract") => {
                return Ok(self.remove(node, edits));
            }
            "import_statement" => return Ok(self.import_statement(node, edits)),
            "export_statement" => return self.export_statement(node, edits),
            "expression_statement" => {
                if let Some(inner) = node.named_child(0) {
                    if inner.kind() == "internal_module" {
                        return self.namespace(inner, node, false, edits);
                    }
                }
            }
            "internal_module" | "module" => return self.namespace(node, node, false, edits),
            "enum_declaration" => return self.enum_declaration(node, node, false, edits),
            "import_alias" => {
                // `import A = N.B` binds a plain variable
                if let Some(keyword) = node.child(0).filter(|k| k.kind() == "import") {
                    edits.push(TextEdit::replace(keyword.byte_range(), "var"));
                }
                return Ok(false);
            }
            "type_annotation"
            | "type_parameters"
            | "type_arguments"
            | "asserts_annotation"
            | "type_predicate_annotation"
            | "opting_type_annotation"
            | "omitting_type_annotation"
            | "adding_type_annotation" => {
                edits.push(TextEdit::delete(node.byte_range()));
                return Ok(false);
            }
            "implements_clause" => {
                let start = node.prev_sibling().map_or(node.start_byte(), |p| p.end_byte());
                edits.push(TextEdit::delete(start..node.end_byte()));
                return Ok(false);
            }
            "class_heritage" if node.named_child_count() == 1 => {
                if node.named_child(0).is_some_and(|c| c.kind() == "implements_clause") {
                    let start = node.prev_sibling().map_or(node.start_byte(), |p| p.end_byte());
                    edits.push(TextEdit::delete(start..node.end_byte()));
                    return Ok(false);
                }
            }
            "accessibility_modifier" | "override_modifier" => {
                edits.push(self.delete_with_trailing_space(node.byte_range()));
                return Ok(false);
            }
            "as_expression" | "satisfies_expression" => {
                if let Some(expression) = node.named_child(0) {
                    edits.push(TextEdit::delete(expression.end_byte()..node.end_byte()));
                    self.visit(expression, edits)?;
                }
                return Ok(false);
            }
            "non_null_expression" => {
                if let Some(expression) = node.named_child(0) {
                    edits.push(TextEdit::delete(expression.end_byte()..node.end_byte()));
                    self.visit(expression, edits)?;
                }
                return Ok(false);
            }
            "required_parameter"
                if node
                    .child_by_field_name("pattern")
                    .is_some_and(|p| p.kind() == "this") =>
            {
                let end = match node.next_sibling().filter(|n| n.kind() == ",") {
                    Some(comma) => self.skip_space(comma.end_byte()),
                    None => node.end_byte(),
                };
                edits.push(TextEdit::delete(node.start_byte()..end));
                return Ok(false);
            }
            "method_definition" => self.parameter_properties(node, edits),
            _ => {}
        }

        for i in 0..node.child_count() {
            let Some(child) = node.child(i) else { continue };
            if child.is_named() {
                self.visit(child, edits)?;
                continue;
            }
            match (node.kind(), child.kind()) {
                (
                    "public_field_definition" | "required_parameter" | "optional_parameter",
                    "readonly",
                )
                | ("abstract_class_declaration", "abstract") => {
                    edits.push(self.delete_with_trailing_space(child.byte_range()));
                }
                (
                    "optional_parameter" | "public_field_definition" | "method_definition",
                    "?",
                )
                | ("public_field_definition" | "variable_declarator", "!") => {
                    edits.push(TextEdit::delete(child.byte_range()));
                }
                _ => {}
            }
        }
        Ok(false)
    }

    fn import_statement(&mut self, node: Node<'_>, edits: &mut Vec<TextEdit>) -> bool {
        let Some(import) = self
            .analysis
            .imports
            .iter()
            .find(|i| i.range.start == node.start_byte())
        else {
            return false;
        };
        if import.type_only {
            return self.remove(node, edits);
        }
        if import.bindings.is_empty() {
            return false;
        }

        let kept: Vec<&ImportBinding> = import
            .bindings
            .iter()
            .filter(|b| !is_elided(b, self.analysis, self.verbatim))
            .collect();
        if kept.len() == import.bindings.len() {
            return false;
        }

        let source = &self.src[import.specifier_range.clone()];
        let semicolon = if node_text(node, self.src).trim_end().ends_with(';') {
            ";"
        } else {
            ""
        };
        if kept.is_empty() {
            if self.verbatim {
                edits.push(TextEdit::replace(
                    node.byte_range(),
                    format!("import {{}} from {source}{semicolon}"),
                ));
                return false;
            }
            return self.remove(node, edits);
        }

        let braces = named_child_of_kind(node, "import_clause")
            .and_then(|clause| named_child_of_kind(clause, "named_imports"))
            .map(|n| n.byte_range());
        let in_braces = |b: &ImportBinding| braces.as_ref().is_some_and(|r| r.contains(&b.range.start));

        let mut parts = Vec::new();
        for binding in kept.iter().filter(|b| !in_braces(b)) {
            parts.push(self.src[binding.range.clone()].to_string());
        }
        let named: Vec<&str> = kept
            .iter()
            .filter(|b| in_braces(b))
            .map(|b| &self.src[b.range.clone()])
            .collect();
        if !named.is_empty() {
            parts.push(format!("{{ {} }}", named.join(", ")));
        }

        edits.push(TextEdit::replace(
            node.byte_range(),
            format!("import {} from {source}{semicolon}", parts.join(", ")),
        ));
        false
    }

    fn export_statement(
        &mut self,
        node: Node<'_>,
        edits: &mut Vec<TextEdit>,
    ) -> Result<bool, ModuleError> {
        if has_token(node, "type") {
            return Ok(self.remove(node, edits));
        }

        if let Some(declaration) = node.child_by_field_name("declaration") {
            match declaration.kind() {
                "interface_declaration"
                | "type_alias_declaration"
                | "ambient_declaration"
                | "function_signature" => return Ok(self.remove(node, edits)),
                "enum_declaration" => return self.enum_declaration(declaration, node, true, edits),
                "internal_module" | "module" => {
                    return self.namespace(declaration, node, true, edits);
                }
                _ => {}
            }
            if let Some(namespace) = self.namespaces.last().cloned() {
                return self.namespace_export(node, declaration, &namespace, edits);
            }
            self.visit(declaration, edits)?;
            return Ok(false);
        }

        if let Some(value) = node.child_by_field_name("value") {
            if value.kind() == "identifier" && self.type_only.contains(node_text(value, self.src)) {
                return Ok(self.remove(node, edits));
            }
            self.visit(value, edits)?;
            return Ok(false);
        }

        let Some(clause) = named_child_of_kind(node, "export_clause") else {
            return Ok(false);
        };
        let specifiers: Vec<Node<'_>> = (0..clause.named_child_count())
            .filter_map(|i| clause.named_child(i))
            .filter(|s| s.kind() == "export_specifier")
            .collect();
        let has_source = node.child_by_field_name("source").is_some();
        let kept: Vec<&str> = specifiers
            .iter()
            .filter(|spec| {
                if has_token(**spec, "type") {
                    return false;
                }
                has_source
                    || spec
                        .child_by_field_name("name")
                        .is_none_or(|name| !self.type_only.contains(node_text(name, self.src)))
            })
            .map(|spec| node_text(*spec, self.src))
            .collect();

        if kept.len() == specifiers.len() {
            return Ok(false);
        }
        if kept.is_empty() {
            return Ok(self.remove(node, edits));
        }
        edits.push(TextEdit::replace(
            clause.byte_range(),
            format!("{{ {} }}", kept.join(", ")),
        ));
        Ok(false)
    }

    /// `export` of a declaration inside a namespace body
    fn namespace_export(
        &mut self,
        node: Node<'_>,
        declaration: Node<'_>,
        namespace: &str,
        edits: &mut Vec<TextEdit>,
    ) -> Result<bool, ModuleError> {
        let names: Vec<String> = match declaration.kind() {
            "lexical_declaration" | "variable_declaration" => (0..declaration.named_child_count())
                .filter_map(|i| declaration.named_child(i))
                .filter(|d| d.kind() == "variable_declarator")
                .filter_map(|d| d.child_by_field_name("name"))
                .filter(|n| n.kind() == "identifier")
                .map(|n| node_text(n, self.src).to_string())
                .collect(),
            _ => declaration
                .child_by_field_name("name")
                .map(|n| node_text(n, self.src).to_string())
                .into_iter()
                .collect(),
        };

        edits.push(TextEdit::delete(node.start_byte()..declaration.start_byte()));
        self.visit(declaration, edits)?;

        let indent = self.indent_at(node.start_byte());
        let assignments: String = names
            .iter()
            .map(|name| format!("\n{indent}{namespace}.{name} = {name};"))
            .collect();
        if !assignments.is_empty() {
            edits.push(TextEdit::insert(node.end_byte(), assignments));
        }
        Ok(false)
    }

    fn enum_declaration(
        &mut self,
        node: Node<'_>,
        statement: Node<'_>,
        exported: bool,
        edits: &mut Vec<TextEdit>,
    ) -> Result<bool, ModuleError> {
        let Some(name) = node.child_by_field_name("name") else {
            return Ok(false);
        };
        let name = node_text(name, self.src).to_string();
        let indent = self.indent_at(statement.start_byte());

        let mut lines = Vec::new();
        let mut known: HashMap<String, EnumValue> = HashMap::new();
        // next auto value: a number, or "previous member + 1"
        let mut next: Result<f64, Option<String>> = Ok(0.0);

        if let Some(body) = node.child_by_field_name("body") {
            for i in 0..body.named_child_count() {
                let Some(member) = body.named_child(i) else { continue };
                let (key_node, value) = match member.kind() {
                    "enum_assignment" => (
                        member.child_by_field_name("name"),
                        member.child_by_field_name("value"),
                    ),
                    "comment" => continue,
                    _ => (Some(member), None),
                };
                let Some(key_node) = key_node else { continue };
                let key = unquote(node_text(key_node, self.src)).to_string();
                let quoted_key = quoted(&key);

                let computed = match value {
                    Some(value) => match evaluate(value, self.src, &name, &known) {
                        Some(v) => Ok(v),
                        None => Err(self.render(value)?),
                    },
                    None => match &next {
                        Ok(n) => Ok(EnumValue::Number(*n)),
                        Err(Some(previous)) => Err(format!("{name}[{}] + 1", quoted(previous))),
                        Err(None) => Err("void 0".to_string()),
                    },
                };

                let line = match &computed {
                    Ok(EnumValue::Number(n)) => {
                        next = Ok(n + 1.0);
                        format!("{name}[{name}[{quoted_key}] = {}] = {quoted_key};", number(*n))
                    }
                    Ok(EnumValue::Str(s)) => {
                        next = Err(None);
                        format!("{name}[{quoted_key}] = {s};")
                    }
                    Err(expression) => {
                        next = Err(Some(key.clone()));
                        format!("{name}[{name}[{quoted_key}] = {expression}] = {quoted_key};")
                    }
                };
                if let Ok(value) = computed {
                    known.insert(key, value);
                }
                lines.push(format!("{indent}{INDENT}{line}"));
            }
        }

        let body = if lines.is_empty() {
            String::new()
        } else {
            format!("\n{}\n{indent}", lines.join("\n"))
        };
        let text = self.wrap(&name, exported, &body, &indent);
        edits.push(TextEdit::replace(statement.byte_range(), text));
        Ok(false)
    }

    fn namespace(
        &mut self,
        node: Node<'_>,
        statement: Node<'_>,
        exported: bool,
        edits: &mut Vec<TextEdit>,
    ) -> Result<bool, ModuleError> {
        let Some(name) = node.child_by_field_name("name") else {
            return Ok(false);
        };
        if name.kind() == "string" || !is_instantiated(node) {
            return Ok(self.remove(statement, edits));
        }
        let Some(body) = node.child_by_field_name("body") else {
            return Ok(self.remove(statement, edits));
        };

        let parts: Vec<String> = node_text(name, self.src)
            .split('.')
            .map(|p| p.trim().to_string())
            .collect();
        let Some(innermost) = parts.last().cloned() else {
            return Ok(false);
        };
        let indent = self.indent_at(statement.start_byte());

        // a multi-line body keeps its own formatting; a one-line body is laid
        // out one statement per line
        let inner_span = (body.start_byte() + 1)..body.end_byte().saturating_sub(1).max(body.start_byte() + 1);
        let one_line = !self.src[body.byte_range()].contains('\n');
        self.namespaces.push(innermost);
        self.scopes.push(HashSet::new());
        let rendered = if one_line {
            self.render_statements(body, &indent)
        } else {
            self.render_span(body, inner_span)
        };
        self.scopes.pop();
        self.namespaces.pop();
        let mut text = rendered?;

        // dotted names nest one IIFE per segment, innermost first
        for depth in (1..parts.len()).rev() {
            let inner_indent = format!("{indent}{}", INDENT.repeat(depth));
            let parent = &parts[depth - 1];
            let part = &parts[depth];
            let wrapped = format!(
                "let {part};\n{inner_indent}(function ({part}) {{{text}}})({part} = {parent}.{part} || ({parent}.{part} = {{}}));"
            );
            let outer_indent = format!("{indent}{}", INDENT.repeat(depth - 1));
            text = format!("\n{inner_indent}{wrapped}\n{outer_indent}");
        }

        let wrapped = self.wrap(&parts[0], exported, &text, &indent);
        edits.push(TextEdit::replace(statement.byte_range(), wrapped));
        Ok(false)
    }

    /// Declaration plus IIFE shared by enums and namespaces
    fn wrap(&mut self, name: &str, exported: bool, body: &str, indent: &str) -> String {
        let enclosing = self.namespaces.last().cloned();
        let declared = self
            .scopes
            .last_mut()
            .is_some_and(|scope| !scope.insert(name.to_string()));

        let (keyword, binding) = match (&enclosing, exported) {
            (Some(parent), true) => (
                "let",
                format!("{name} = {parent}.{name} || ({parent}.{name} = {{}})"),
            ),
            (Some(_), false) => ("let", format!("{name} || ({name} = {{}})")),
            (None, true) => ("export var", format!("{name} || ({name} = {{}})")),
            (None, false) => ("var", format!("{name} || ({name} = {{}})")),
        };
        let head = if declared {
            String::new()
        } else {
            format!("{keyword} {name};\n{indent}")
        };
        format!("{head}(function ({name}) {{{body}}})({binding});")
    }

    fn parameter_properties(&self, method: Node<'_>, edits: &mut Vec<TextEdit>) {
        let is_constructor = method
            .child_by_field_name("name")
            .is_some_and(|n| node_text(n, self.src) == "constructor");
        if !is_constructor {
            return;
        }
        let (Some(params), Some(body)) = (
            method.child_by_field_name("parameters"),
            method.child_by_field_name("body"),
        ) else {
            return;
        };

        let properties: Vec<&str> = (0..params.named_child_count())
            .filter_map(|i| params.named_child(i))
            .filter(|p| is_parameter_property(*p))
            .filter_map(|p| p.child_by_field_name("pattern"))
            .filter(|p| p.kind() == "identifier")
            .map(|p| node_text(p, self.src))
            .collect();
        if properties.is_empty() {
            return;
        }

        let statements: Vec<Node<'_>> = (0..body.named_child_count())
            .filter_map(|i| body.named_child(i))
            .collect();
        let method_indent = self.indent_at(method.start_byte());
        let class_indent = method
            .parent()
            .and_then(|class_body| class_body.parent())
            .map(|class| self.indent_at(class.start_byte()))
            .unwrap_or_default();
        // one level is whatever separates the class from its members
        let level = method_indent
            .strip_prefix(class_indent.as_str())
            .filter(|level| !level.is_empty())
            .unwrap_or(INDENT);
        let indent = statements.first().map_or_else(
            || format!("{method_indent}{level}"),
            |s| self.indent_at(s.start_byte()),
        );
        let super_call = statements.iter().find(|s| {
            s.kind() == "expression_statement"
                && s.named_child(0)
                    .filter(|c| c.kind() == "call_expression")
                    .and_then(|c| c.child_by_field_name("function"))
                    .is_some_and(|f| f.kind() == "super")
        });

        let mut text: String = properties
            .iter()
            .map(|p| format!("\n{indent}this.{p} = {p};"))
            .collect();
        if statements.is_empty() {
            text.push('\n');
            text.push_str(&method_indent);
        }
        let at = super_call.map_or(body.start_byte() + 1, |s| s.end_byte());
        edits.push(TextEdit::insert(at, text));
    }

    /// Transformed text of one node
    fn render(&mut self, node: Node<'_>) -> Result<String, ModuleError> {
        let span = node.byte_range();
        let saved = std::mem::replace(&mut self.bounds, span.clone());
        let mut edits = Vec::new();
        let result = self.visit(node, &mut edits);
        self.bounds = saved;
        result?;
        shifted(self.src, span, edits)
    }

    /// Transformed statements of a block, one per line, one level deeper
    /// than `indent`
    fn render_statements(&mut self, block: Node<'_>, indent: &str) -> Result<String, ModuleError> {
        let mut lines = Vec::new();
        for i in 0..block.named_child_count() {
            let Some(statement) = block.named_child(i) else { continue };
            let text = self.render(statement)?;
            for line in text.lines().filter(|l| !l.trim().is_empty()) {
                let line = line.strip_prefix(indent).unwrap_or(line);
                lines.push(format!("{indent}{INDENT}{line}"));
            }
        }
        if lines.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("\n{}\n{indent}", lines.join("\n")))
    }

    /// Transformed text of `span`, a range of `parent`'s children
    fn render_span(&mut self, parent: Node<'_>, span: Range<usize>) -> Result<String, ModuleError> {
        let saved = std::mem::replace(&mut self.bounds, span.clone());
        let mut edits = Vec::new();
        let mut result = Ok(false);
        for i in 0..parent.child_count() {
            let Some(child) = parent.child(i) else { continue };
            if child.start_byte() >= span.start && child.end_byte() <= span.end {
                result = self.visit(child, &mut edits);
                if result.is_err() {
                    break;
                }
            }
        }
        self.bounds = saved;
        result?;
        shifted(self.src, span, edits)
    }

    /// Delete a statement or member, taking its whole line when it is alone
    /// on it
    fn remove(&self, node: Node<'_>, edits: &mut Vec<TextEdit>) -> bool {
        let mut end = node.end_byte();
        if let Some(next) = node.next_sibling() {
            if next.kind() == ";" && !next.is_named() && node.parent().is_some_and(|p| p.kind() == "class_body") {
                end = next.end_byte();
            }
        }
        edits.push(TextEdit::delete(self.removal_range(node.start_byte()..end)));
        true
    }

    fn removal_range(&self, range: Range<usize>) -> Range<usize> {
        let src = self.src;
        let line_start = src[..range.start]
            .rfind('\n')
            .map_or(0, |i| i + 1)
            .max(self.bounds.start);
        let line_end = src[range.end..]
            .find('\n')
            .map_or(src.len(), |i| range.end + i + 1)
            .min(self.bounds.end);

        let before_blank = src[line_start..range.start].trim().is_empty();
        let after_blank = src[range.end..line_end].trim().is_empty();
        if before_blank && after_blank {
            line_start..line_end
        } else {
            range.start..self.skip_space(range.end)
        }
    }

    fn delete_with_trailing_space(&self, range: Range<usize>) -> TextEdit {
        TextEdit::delete(range.start..self.skip_space(range.end))
    }

    fn skip_space(&self, from: usize) -> usize {
        let limit = self.bounds.end.max(from);
        let rest = &self.src[from..limit];
        from + (rest.len() - rest.trim_start_matches([' ', '\t']).len())
    }

    fn indent_at(&self, offset: usize) -> String {
        let line_start = self.src[..offset].rfind('\n').map_or(0, |i| i + 1);
        self.src[line_start..offset]
            .chars()
            .take_while(|c| *c == ' ' || *c == '\t')
            .collect()
    }
}

/// Whether an import binding disappears from the output
fn is_elided(binding: &ImportBinding, analysis: &ModuleAnalysis, verbatim: bool) -> bool {
    if binding.type_only {
        return true;
    }
    if verbatim {
        return false;
    }
    !analysis.value_refs.contains(&binding.local)
}

fn shifted(src: &str, span: Range<usize>, edits: Vec<TextEdit>) -> Result<String, ModuleError> {
    let base = span.start;
    let local: Vec<TextEdit> = edits
        .into_iter()
        .map(|e| TextEdit::replace((e.range.start - base)..(e.range.end - base), e.replacement))
        .collect();
    Ok(apply_edits(&src[span], &local)?.0)
}

fn quoted(text: &str) -> String {
    serde_json::Value::from(text).to_string()
}

fn number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        #[allow(clippy::cast_possible_truncation)]
        let whole = n as i64;
        whole.to_string()
    } else {
        n.to_string()
    }
}

/// Constant-fold an enum initializer
fn evaluate(
    node: Node<'_>,
    src: &str,
    enum_name: &str,
    known: &HashMap<String, EnumValue>,
) -> Option<EnumValue> {
    let text = node_text(node, src);
    match node.kind() {
        "number" => parse_number(text).map(EnumValue::Number),
        "string" => Some(EnumValue::Str(text.to_string())),
        "template_string" if node.named_child_count() == 0 => {
            Some(EnumValue::Str(quoted(unquote(text))))
        }
        "parenthesized_expression" => evaluate(node.named_child(0)?, src, enum_name, known),
        "identifier" => known.get(text).cloned(),
        "member_expression" => {
            let object = node.child_by_field_name("object")?;
            let property = node.child_by_field_name("property")?;
            if node_text(object, src) != enum_name {
                return None;
            }
            known.get(node_text(property, src)).cloned()
        }
        "unary_expression" => {
            let operator = node.child_by_field_name("operator")?;
            let EnumValue::Number(n) = evaluate(node.child_by_field_name("argument")?, src, enum_name, known)? else {
                return None;
            };
            match node_text(operator, src) {
                "-" => Some(EnumValue::Number(-n)),
                "+" => Some(EnumValue::Number(n)),
                "~" => Some(EnumValue::Number(f64::from(!to_i32(n)))),
                _ => None,
            }
        }
        "binary_expression" => {
            let operator = node.child_by_field_name("operator")?;
            let left = evaluate(node.child_by_field_name("left")?, src, enum_name, known)?;
            let right = evaluate(node.child_by_field_name("right")?, src, enum_name, known)?;
            let (EnumValue::Number(l), EnumValue::Number(r)) = (left, right) else {
                return None;
            };
            let value = match node_text(operator, src) {
                "+" => l + r,
                "-" => l - r,
                "*" => l * r,
                "/" => l / r,
                "%" => l % r,
                "|" => f64::from(to_i32(l) | to_i32(r)),
                "&" => f64::from(to_i32(l) & to_i32(r)),
                "^" => f64::from(to_i32(l) ^ to_i32(r)),
                "<<" => f64::from(to_i32(l).wrapping_shl(to_u32(r))),
                ">>" => f64::from(to_i32(l).wrapping_shr(to_u32(r))),
                _ => return None,
            };
            value.is_finite().then_some(EnumValue::Number(value))
        }
        _ => None,
    }
}

fn parse_number(text: &str) -> Option<f64> {
    let clean = text.replace('_', "");
    let lower = clean.to_ascii_lowercase();
    let radix = |prefix: &str, radix| {
        lower
            .strip_prefix(prefix)
            .and_then(|digits| i64::from_str_radix(digits, radix).ok())
    };
    #[allow(clippy::cast_precision_loss)]
    let integer = radix("0x", 16)
        .or_else(|| radix("0o", 8))
        .or_else(|| radix("0b", 2))
        .map(|n| n as f64);
    integer.or_else(|| lower.parse::<f64>().ok())
}

#[allow(clippy::cast_possible_truncation)]
fn to_i32(n: f64) -> i32 {
    n as i64 as i32
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_u32(n: f64) -> u32 {
    (n as i64 as u32) & 31
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tsgate_module::{ModulePath, ScriptKind};
    use tsgate_upstream::ResponseHead;
    use url::Url;

    fn emit_with(path: &str, text: &str, options: &CompilerOptions) -> String {
        let kind = ScriptKind::from_path(path, true);
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
        emit(&record, &analysis, options).unwrap()
    }

    fn emit_ts(text: &str) -> String {
        emit_with("/src/a.ts", text, &CompilerOptions::default())
    }

    #[test]
    fn erases_annotations() {
        assert_eq!(
            emit_ts("const a: number = 1;\nfunction f<T>(x: T, y?: string): T { return x; }\n"),
            "const a = 1;\nfunction f(x, y) { return x; }\n"
        );
    }

    #[test]
    fn removes_type_declarations() {
        assert_eq!(
            emit_ts("interface I {\n  a: number;\n}\ntype T = string;\ndeclare const g: number;\nconst x = 1;\n"),
            "const x = 1;\n"
        );
    }

    #[test]
    fn erases_assertions() {
        assert_eq!(
            emit_ts("const a = b as string;\nconst c = d!;\nconst e = { x: 1 } satisfies object;\n"),
            "const a = b;\nconst c = d;\nconst e = { x: 1 };\n"
        );
    }

    #[test]
    fn elides_type_only_imports() {
        assert_eq!(
            emit_ts(
                "import type { T } from '/src/t.ts';\nimport { A, b } from '/src/b.ts';\nconst x: A = b;\nexport { x };\n"
            ),
            "import { b } from '/src/b.ts';\nconst x = b;\nexport { x };\n"
        );
    }

    #[test]
    fn adds_empty_export_when_module_syntax_is_gone() {
        assert_eq!(
            emit_ts("import { T } from '/src/t.ts';\nconst x: T = 1;\n"),
            "const x = 1;\nexport {};\n"
        );
    }

    #[test]
    fn verbatim_keeps_unused_imports() {
        let options = CompilerOptions {
            verbatim_module_syntax: true,
            ..CompilerOptions::default()
        };
        assert_eq!(
            emit_with("/src/a.ts", "import { a, type T } from '/src/b.ts';\n", &options),
            "import { a } from '/src/b.ts';\n"
        );
    }

    #[test]
    fn lowers_enums() {
        assert_eq!(
            emit_ts("enum Color { Red, Green = 5, Blue }\n"),
            "var Color;\n(function (Color) {\n    Color[Color[\"Red\"] = 0] = \"Red\";\n    Color[Color[\"Green\"] = 5] = \"Green\";\n    Color[Color[\"Blue\"] = 6] = \"Blue\";\n})(Color || (Color = {}));\n"
        );
    }

    #[test]
    fn lowers_string_and_exported_enums() {
        assert_eq!(
            emit_ts("export enum Dir { Up = 'UP', Down = 'DOWN' }\n"),
            "export var Dir;\n(function (Dir) {\n    Dir[\"Up\"] = 'UP';\n    Dir[\"Down\"] = 'DOWN';\n})(Dir || (Dir = {}));\n"
        );
    }

    #[test]
    fn folds_enum_initializers() {
        let out = emit_ts("enum F { A = 1 << 1, B = A | 1, C = -1 }\n");
        assert!(out.contains("F[F[\"A\"] = 2] = \"A\";"));
        assert!(out.contains("F[F[\"B\"] = 3] = \"B\";"));
        assert!(out.contains("F[F[\"C\"] = -1] = \"C\";"));
    }

    #[test]
    fn lowers_namespaces() {
        assert_eq!(
            emit_ts("namespace NS {\n    export const a = 1;\n    export function f() { return a; }\n    interface Hidden {}\n}\n"),
            "var NS;\n(function (NS) {\n    const a = 1;\n    NS.a = a;\n    function f() { return a; }\n    NS.f = f;\n})(NS || (NS = {}));\n"
        );
    }

    #[test]
    fn lays_out_one_line_namespaces() {
        assert_eq!(
            emit_ts("export namespace N { export const x = 1; interface I {} export function f() { return x; } }\n"),
            "export var N;\n(function (N) {\n    const x = 1;\n    N.x = x;\n    function f() { return x; }\n    N.f = f;\n})(N || (N = {}));\n"
        );
    }

    #[test]
    fn removes_type_only_namespaces() {
        assert_eq!(
            emit_ts("namespace Types {\n    export interface A {}\n}\nconst x = 1;\n"),
            "const x = 1;\n"
        );
    }

    #[test]
    fn parameter_properties_become_assignments() {
        assert_eq!(
            emit_ts("class P {\n    constructor(private x: number, public readonly y: string) {\n        log();\n    }\n}\n"),
            "class P {\n    constructor(x, y) {\n        this.x = x;\n        this.y = y;\n        log();\n    }\n}\n"
        );
    }

    #[test]
    fn parameter_properties_follow_class_indentation() {
        assert_eq!(
            emit_ts("class P {\n  constructor(private x: number) {}\n}\n"),
            "class P {\n  constructor(x) {\n    this.x = x;\n  }\n}\n"
        );
    }

    #[test]
    fn strips_class_only_syntax() {
        assert_eq!(
            emit_ts("abstract class A<T> extends B<T> implements I {\n    private readonly a: number = 1;\n    declare b: string;\n    abstract run(): void;\n    get(): T { return this.a as T; }\n}\n"),
            "class A extends B {\n    a = 1;\n    get() { return this.a; }\n}\n"
        );
    }

    #[test]
    fn removes_overload_signatures() {
        assert_eq!(
            emit_ts("export function f(a: string): string;\nexport function f(a: any) { return a; }\n"),
            "export function f(a) { return a; }\n"
        );
    }

    #[test]
    fn scripts_pass_through() {
        let text = "const x = require('y');\n";
        assert_eq!(emit_with("/src/a.js", text, &CompilerOptions::default()), text);
    }

    #[test]
    fn tsx_keeps_jsx() {
        assert_eq!(
            emit_with(
                "/src/a.tsx",
                "const App = (p: Props) => <div>{p.name}</div>;\n",
                &CompilerOptions::default()
            ),
            "const App = (p) => <div>{p.name}</div>;\n"
        );
    }
}
