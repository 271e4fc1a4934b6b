//! Text edits and the offset map they leave behind
//!
//! Rewriting a module replaces byte ranges of its text. [`apply_edits`]
//! performs the replacements and returns a [`SourceMap`] so positions in the
//! rewritten text can be reported against the text the user wrote.

use std::ops::Range;

use crate::error::ModuleError;

/// Replacement of a byte range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    /// Byte range in the text being edited
    pub range: Range<usize>,
    /// New text
    pub replacement: String,
}

impl TextEdit {
    /// Replace `range` with `replacement`
    #[inline]
    #[must_use]
    pub fn replace(range: Range<usize>, replacement: impl Into<String>) -> Self {
        Self {
            range,
            replacement: replacement.into(),
        }
    }

    /// Delete `range`
    #[inline]
    #[must_use]
    pub fn delete(range: Range<usize>) -> Self {
        Self::replace(range, String::new())
    }

    /// Insert at `offset`
    #[inline]
    #[must_use]
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::replace(offset..offset, text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Mapping {
    original: Range<usize>,
    generated: Range<usize>,
}

/// Maps offsets in rewritten text back to the original text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    mappings: Vec<Mapping>,
}

impl SourceMap {
    /// Map for unedited text
    #[inline]
    #[must_use]
    pub fn identity() -> Self {
        Self::default()
    }

    /// Whether no edits were recorded
    #[inline]
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Number of recorded replacements
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Whether no replacements were recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Original offset of a rewritten-text offset
    ///
    /// Offsets inside a replacement map into the replaced range, clamped to
    /// its end.
    #[must_use]
    pub fn original_offset(&self, generated: usize) -> usize {
        let idx = self
            .mappings
            .partition_point(|m| m.generated.start <= generated);
        let Some(m) = idx.checked_sub(1).map(|i| &self.mappings[i]) else {
            return generated;
        };
        if generated < m.generated.end {
            m.original.start + (generated - m.generated.start).min(m.original.len())
        } else {
            m.original.end + (generated - m.generated.end)
        }
    }

    /// Rewritten-text offset of an original offset
    #[must_use]
    pub fn generated_offset(&self, original: usize) -> usize {
        let idx = self.mappings.partition_point(|m| m.original.start <= original);
        let Some(m) = idx.checked_sub(1).map(|i| &self.mappings[i]) else {
            return original;
        };
        if original < m.original.end {
            m.generated.start + (original - m.original.start).min(m.generated.len())
        } else {
            m.generated.end + (original - m.original.end)
        }
    }
}

/// Sort and validate edits: in bounds, on char boundaries, non-overlapping
///
/// # Errors
///
/// Returns [`ModuleError::InvalidEdit`] describing the first bad edit.
pub fn sorted_edits(text: &str, edits: &[TextEdit]) -> Result<Vec<TextEdit>, ModuleError> {
    let mut sorted = edits.to_vec();
    sorted.sort_by_key(|e| (e.range.start, e.range.end));

    let mut last_end = 0;
    for edit in &sorted {
        let Range { start, end } = edit.range;
        if start > end || end > text.len() {
            return Err(ModuleError::InvalidEdit(format!(
                "range {start}..{end} out of bounds for {} bytes",
                text.len()
            )));
        }
        if !text.is_char_boundary(start) || !text.is_char_boundary(end) {
            return Err(ModuleError::InvalidEdit(format!(
                "range {start}..{end} splits a character"
            )));
        }
        if start < last_end {
            return Err(ModuleError::InvalidEdit(format!(
                "range {start}..{end} overlaps a previous edit ending at {last_end}"
            )));
        }
        last_end = end;
    }
    Ok(sorted)
}

/// Apply edits, returning the new text and its map back to `text`
///
/// # Errors
///
/// Returns [`ModuleError::InvalidEdit`] for out-of-bounds or overlapping edits.
pub fn apply_edits(text: &str, edits: &[TextEdit]) -> Result<(String, SourceMap), ModuleError> {
    let sorted = sorted_edits(text, edits)?;

    let mut out = String::with_capacity(text.len());
    let mut mappings = Vec::with_capacity(sorted.len());
    let mut cursor = 0;

    for edit in sorted {
        out.push_str(&text[cursor..edit.range.start]);
        let generated_start = out.len();
        out.push_str(&edit.replacement);
        mappings.push(Mapping {
            original: edit.range.clone(),
            generated: generated_start..out.len(),
        });
        cursor = edit.range.end;
    }
    out.push_str(&text[cursor..]);

    Ok((out, SourceMap { mappings }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_replacements() {
        let text = "import { a } from './a';\nuse(a);";
        let edits = [TextEdit::replace(18..23, "'/src/a.ts'")];
        let (out, map) = apply_edits(text, &edits).unwrap();

        assert_eq!(out, "import { a } from '/src/a.ts';\nuse(a);");
        // `use` keeps its original offset after the longer specifier
        let generated = out.find("use").unwrap();
        assert_eq!(map.original_offset(generated), text.find("use").unwrap());
        assert_eq!(map.generated_offset(text.find("use").unwrap()), generated);
    }

    #[test]
    fn offsets_before_edits_unchanged() {
        let (_, map) = apply_edits("abcdef", &[TextEdit::replace(3..4, "XYZ")]).unwrap();
        assert_eq!(map.original_offset(2), 2);
        assert_eq!(map.original_offset(3), 3);
        // inside the replacement, clamped to the replaced range
        assert_eq!(map.original_offset(5), 4);
        assert_eq!(map.original_offset(6), 4);
    }

    #[test]
    fn deletions_and_insertions() {
        let text = "let x: number = 1;";
        let edits = [TextEdit::delete(5..13), TextEdit::insert(0, "/*a*/")];
        let (out, map) = apply_edits(text, &edits).unwrap();
        assert_eq!(out, "/*a*/let x = 1;");
        let eq = out.find('=').unwrap();
        assert_eq!(map.original_offset(eq), text.find('=').unwrap());
    }

    #[test]
    fn overlapping_edits_rejected() {
        let edits = [TextEdit::delete(0..4), TextEdit::delete(2..6)];
        assert!(matches!(
            apply_edits("abcdefgh", &edits),
            Err(ModuleError::InvalidEdit(_))
        ));
    }

    #[test]
    fn out_of_bounds_rejected() {
        assert!(apply_edits("abc", &[TextEdit::delete(2..9)]).is_err());
    }

    #[test]
    fn identity_map() {
        let map = SourceMap::identity();
        assert!(map.is_identity());
        assert_eq!(map.original_offset(42), 42);
    }
}
