//! Syntax layer
//!
//! Parses modules with tree-sitter and keeps trees in step with text edits
//! through [`tree_sitter::Tree::edit`] plus an incremental reparse.

use serde::{Deserialize, Serialize};
use tree_sitter::{InputEdit, Node, Parser, Point, Tree};

use crate::error::ModuleError;
use crate::path::{ModulePath, ScriptKind};
use crate::source_map::{sorted_edits, TextEdit};

/// tree-sitter grammar for a script kind
#[must_use]
pub fn language(kind: ScriptKind) -> tree_sitter::Language {
    if kind.uses_jsx_grammar() {
        tree_sitter_typescript::LANGUAGE_TSX.into()
    } else {
        tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
    }
}

fn parser(kind: ScriptKind) -> Result<Parser, ModuleError> {
    let mut parser = Parser::new();
    parser
        .set_language(&language(kind))
        .map_err(|e| ModuleError::ParserInit(e.to_string()))?;
    Ok(parser)
}

/// Parse `text` from scratch
///
/// # Errors
///
/// Returns an error if the grammar cannot be loaded or parsing is aborted.
pub fn parse(path: &ModulePath, kind: ScriptKind, text: &str) -> Result<Tree, ModuleError> {
    parser(kind)?
        .parse(text, None)
        .ok_or_else(|| ModuleError::ParseFailed(path.clone()))
}

/// Reparse after `edits` turned `old_text` into `new_text`
///
/// Edits are applied to the old tree in descending order so each edit's
/// start position is still valid in the partially edited tree.
///
/// # Errors
///
/// Returns an error if the edits are invalid for `old_text` or parsing fails.
pub fn reparse(
    path: &ModulePath,
    kind: ScriptKind,
    old_tree: &Tree,
    old_text: &str,
    edits: &[TextEdit],
    new_text: &str,
) -> Result<Tree, ModuleError> {
    let sorted = sorted_edits(old_text, edits)?;
    let lines = LineIndex::new(old_text);

    let mut tree = old_tree.clone();
    for edit in sorted.iter().rev() {
        let start_position = lines.point(old_text, edit.range.start);
        tree.edit(&InputEdit {
            start_byte: edit.range.start,
            old_end_byte: edit.range.end,
            new_end_byte: edit.range.start + edit.replacement.len(),
            start_position,
            old_end_position: lines.point(old_text, edit.range.end),
            new_end_position: advance(start_position, &edit.replacement),
        });
    }

    parser(kind)?
        .parse(new_text, Some(&tree))
        .ok_or_else(|| ModuleError::ParseFailed(path.clone()))
}

fn advance(start: Point, inserted: &str) -> Point {
    match inserted.rfind('\n') {
        Some(idx) => Point {
            row: start.row + inserted.matches('\n').count(),
            column: inserted.len() - idx - 1,
        },
        None => Point {
            row: start.row,
            column: start.column + inserted.len(),
        },
    }
}

/// Text of a node, empty if the range is not valid UTF-8
#[inline]
#[must_use]
pub fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// 1-based line/column position
///
/// Columns count UTF-16 code units, matching editor conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Line, 1-based
    pub line: u32,
    /// Column, 1-based
    pub column: u32,
}

/// Byte offsets of line starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    /// Index `text`
    #[must_use]
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { line_starts }
    }

    /// Number of lines
    #[inline]
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    fn line_of(&self, offset: usize) -> usize {
        self.line_starts.partition_point(|&start| start <= offset) - 1
    }

    /// tree-sitter point (0-based row, byte column)
    #[must_use]
    pub fn point(&self, text: &str, offset: usize) -> Point {
        let offset = offset.min(text.len());
        let row = self.line_of(offset);
        Point {
            row,
            column: offset - self.line_starts[row],
        }
    }

    /// 1-based position of a byte offset in `text`
    #[must_use]
    pub fn position(&self, text: &str, offset: usize) -> Position {
        let mut offset = offset.min(text.len());
        while !text.is_char_boundary(offset) {
            offset -= 1;
        }
        let row = self.line_of(offset);
        let column = text[self.line_starts[row]..offset]
            .chars()
            .map(char::len_utf16)
            .sum::<usize>();
        Position {
            line: u32::try_from(row + 1).unwrap_or(u32::MAX),
            column: u32::try_from(column + 1).unwrap_or(u32::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> ModulePath {
        ModulePath::parse("/src/a.ts").unwrap()
    }

    #[test]
    fn parses_typescript() {
        let tree = parse(&path(), ScriptKind::Ts, "const a: number = 1;").unwrap();
        let root = tree.root_node();
        assert_eq!(root.kind(), "program");
        assert!(!root.has_error());
    }

    #[test]
    fn parses_tsx() {
        let tree = parse(&path(), ScriptKind::Tsx, "const el = <div>hi</div>;").unwrap();
        assert!(!tree.root_node().has_error());
    }

    #[test]
    fn reparse_matches_fresh_parse() {
        let old = "import { a } from './a';\nconsole.log(a);\n";
        let tree = parse(&path(), ScriptKind::Ts, old).unwrap();
        let edits = [TextEdit::replace(18..23, "'/src/a.ts'")];
        let (new_text, _) = crate::source_map::apply_edits(old, &edits).unwrap();

        let incremental = reparse(&path(), ScriptKind::Ts, &tree, old, &edits, &new_text).unwrap();
        let fresh = parse(&path(), ScriptKind::Ts, &new_text).unwrap();
        assert_eq!(
            incremental.root_node().to_sexp(),
            fresh.root_node().to_sexp()
        );

        let string = incremental
            .root_node()
            .child(0)
            .and_then(|import| import.child_by_field_name("source"))
            .unwrap();
        assert_eq!(node_text(string, &new_text), "'/src/a.ts'");
    }

    #[test]
    fn positions_are_one_based() {
        let text = "a\nbc\n\u{1F600}x";
        let lines = LineIndex::new(text);
        assert_eq!(lines.line_count(), 3);
        assert_eq!(lines.position(text, 0), Position { line: 1, column: 1 });
        assert_eq!(lines.position(text, 3), Position { line: 2, column: 2 });
        // the emoji is two UTF-16 units wide
        let x = text.find('x').unwrap();
        assert_eq!(lines.position(text, x), Position { line: 3, column: 3 });
    }

    #[test]
    fn advance_over_newlines() {
        let p = advance(Point { row: 2, column: 4 }, "ab\ncde");
        assert_eq!(p, Point { row: 3, column: 3 });
        let q = advance(Point { row: 2, column: 4 }, "ab");
        assert_eq!(q, Point { row: 2, column: 6 });
    }
}
