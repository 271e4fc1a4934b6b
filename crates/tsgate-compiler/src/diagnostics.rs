//! Diagnostics and the Diagnostic Aggregator
//!
//! Diagnostics are plain, serializable data: a file is referenced by path
//! and positions are already mapped back to the served source, so nothing
//! has to be stripped before they cross a serialization boundary.
//!
//! # Ordering
//!
//! A report lists compiler-option diagnostics once, then for each module in
//! registration order its syntactic, semantic and suggestion diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use tsgate_module::{ModulePath, ModuleRecord, Position};

/// Diagnostic group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    /// Compiler-option diagnostics, global to a pass
    #[serde(rename = "compiler")]
    CompilerOption,
    /// Syntax errors
    Syntactic,
    /// Type and binding errors
    Semantic,
    /// Non-blocking hints
    Suggestion,
}

impl DiagnosticKind {
    /// Per-module groups in report order
    pub const PER_MODULE: [Self; 3] = [Self::Syntactic, Self::Semantic, Self::Suggestion];

    /// Name used in printed diagnostics
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CompilerOption => "compiler",
            Self::Syntactic => "syntactic",
            Self::Semantic => "semantic",
            Self::Suggestion => "suggestion",
        }
    }
}

impl Display for DiagnosticKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticCategory {
    /// Warning
    Warning,
    /// Error; blocks emission under `noEmitOnError`
    Error,
    /// Suggestion
    Suggestion,
    /// Informational message
    Message,
}

/// Message with nested detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageChain {
    /// Message text
    pub text: String,
    /// Nested details
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next: Vec<MessageChain>,
}

impl MessageChain {
    /// Single-line message
    #[inline]
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            next: Vec::new(),
        }
    }

    /// Add nested detail
    #[inline]
    #[must_use]
    pub fn with_next(mut self, next: MessageChain) -> Self {
        self.next.push(next);
        self
    }

    /// Flatten into one string: each nesting level on a new line, indented
    /// two spaces per level
    #[must_use]
    pub fn flatten(&self) -> String {
        let mut out = String::new();
        self.flatten_into(&mut out, 0);
        out
    }

    fn flatten_into(&self, out: &mut String, depth: usize) {
        if depth > 0 {
            out.push('\n');
            out.push_str(&"  ".repeat(depth));
        }
        out.push_str(&self.text);
        for child in &self.next {
            child.flatten_into(out, depth + 1);
        }
    }
}

impl From<&str> for MessageChain {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for MessageChain {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// Secondary location attached to a diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedInformation {
    /// File, if anchored
    pub file: Option<ModulePath>,
    /// Position in the served source
    pub start: Option<Position>,
    /// Message
    pub message: MessageChain,
}

/// A compiler diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Group
    pub kind: DiagnosticKind,
    /// Severity
    pub category: DiagnosticCategory,
    /// Numeric code (`2307` for `TS2307`)
    pub code: u32,
    /// Originating file, if anchored
    pub file: Option<ModulePath>,
    /// 1-based position in the served source
    pub start: Option<Position>,
    /// Message
    pub message: MessageChain,
    /// Related locations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<RelatedInformation>,
}

impl Diagnostic {
    /// Unanchored diagnostic
    #[must_use]
    pub fn global(
        kind: DiagnosticKind,
        category: DiagnosticCategory,
        code: u32,
        message: impl Into<MessageChain>,
    ) -> Self {
        Self {
            kind,
            category,
            code,
            file: None,
            start: None,
            message: message.into(),
            related: Vec::new(),
        }
    }

    /// Diagnostic at an offset of a module's rewritten text
    #[must_use]
    pub fn at(
        kind: DiagnosticKind,
        category: DiagnosticCategory,
        code: u32,
        record: &ModuleRecord,
        offset: usize,
        message: impl Into<MessageChain>,
    ) -> Self {
        Self {
            file: Some(record.path.clone()),
            start: Some(record.original_position(offset)),
            ..Self::global(kind, category, code, message)
        }
    }

    /// Attach related information
    #[inline]
    #[must_use]
    pub fn with_related(mut self, related: RelatedInformation) -> Self {
        self.related.push(related);
        self
    }

    /// Whether this is an error
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.category == DiagnosticCategory::Error
    }

    /// Printed form:
    /// `<kind> <file> (<line>,<column>): <message>` or `<kind>: <message>`
    #[must_use]
    pub fn printed(&self) -> String {
        self.to_string()
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let message = self.message.flatten();
        match (&self.file, self.start) {
            (Some(file), Some(start)) => write!(
                f,
                "{} {} ({},{}): {}",
                self.kind, file, start.line, start.column, message
            ),
            (Some(file), None) => write!(f, "{} {}: {}", self.kind, file, message),
            _ => write!(f, "{}: {}", self.kind, message),
        }
    }
}

/// Diagnostics of one kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsResult {
    /// Group
    pub kind: DiagnosticKind,
    /// Diagnostics in source order
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticsResult {
    /// Create result
    #[inline]
    #[must_use]
    pub fn new(kind: DiagnosticKind, diagnostics: Vec<Diagnostic>) -> Self {
        Self { kind, diagnostics }
    }
}

/// Ordered collection of diagnostic groups for one pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    results: Vec<DiagnosticsResult>,
}

impl DiagnosticReport {
    /// Empty report
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a group
    pub fn push(&mut self, result: DiagnosticsResult) {
        self.results.push(result);
    }

    /// Append groups in order
    pub fn extend(&mut self, results: impl IntoIterator<Item = DiagnosticsResult>) {
        self.results.extend(results);
    }

    /// Groups in report order
    #[must_use]
    pub fn results(&self) -> &[DiagnosticsResult] {
        &self.results
    }

    /// All diagnostics in report order
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.results.iter().flat_map(|r| r.diagnostics.iter())
    }

    /// Whether no diagnostic was collected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagnostics().next().is_none()
    }

    /// Number of error diagnostics
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.diagnostics().filter(|d| d.is_error()).count()
    }

    /// Printed diagnostics joined by newlines; empty when there are none
    #[must_use]
    pub fn render(&self) -> String {
        self.diagnostics()
            .map(Diagnostic::printed)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
