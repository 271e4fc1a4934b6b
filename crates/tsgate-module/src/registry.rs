//! Module Registry
//!
//! Canonical path → [`ModuleRecord`] for one compilation host.
//!
//! Records are immutable once registered and shared as `Arc<ModuleRecord>`.
//! Registration is idempotent; [`ModuleRegistry::replace`] is the only way
//! to change a record's content, and the only operation that bumps its
//! version.

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tree_sitter::Tree;
use tsgate_upstream::ResponseHead;
use url::Url;

use crate::error::ModuleError;
use crate::path::{ModulePath, ScriptKind};
use crate::source_map::{apply_edits, SourceMap, TextEdit};
use crate::syntax::{self, LineIndex, Position};

/// A registered source module or library
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    /// Canonical path (registry key)
    pub path: ModulePath,
    /// URL the content was fetched from
    pub url: Url,
    /// Script kind
    pub kind: ScriptKind,
    /// Content as served by upstream
    pub raw_text: String,
    /// Content with import specifiers rewritten to canonical paths
    pub text: String,
    /// Parse tree of `text`
    pub tree: Tree,
    /// Offsets in `text` → offsets in `raw_text`
    pub source_map: SourceMap,
    /// Line index of `raw_text`
    pub raw_lines: LineIndex,
    /// Content version, starting at 1
    pub version: u32,
    /// Dependencies discovered while rewriting, in source order
    pub dependencies: Vec<ModulePath>,
    /// Upstream response metadata
    pub response: ResponseHead,
}

impl ModuleRecord {
    /// Parse fetched content into an unrewritten record
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be parsed.
    pub fn parse(
        path: ModulePath,
        url: Url,
        kind: ScriptKind,
        raw_text: String,
        response: ResponseHead,
    ) -> Result<Self, ModuleError> {
        let tree = syntax::parse(&path, kind, &raw_text)?;
        Ok(Self {
            raw_lines: LineIndex::new(&raw_text),
            text: raw_text.clone(),
            raw_text,
            path,
            url,
            kind,
            tree,
            source_map: SourceMap::identity(),
            version: 1,
            dependencies: Vec::new(),
            response,
        })
    }

    /// Apply specifier rewrites and record discovered dependencies
    ///
    /// The tree is edited and reparsed incrementally rather than rebuilt.
    ///
    /// # Errors
    ///
    /// Returns an error if the edits overlap or the reparse fails.
    pub fn rewrite(
        mut self,
        edits: &[TextEdit],
        dependencies: Vec<ModulePath>,
    ) -> Result<Self, ModuleError> {
        self.dependencies = dependencies;
        if edits.is_empty() {
            return Ok(self);
        }

        let (text, source_map) = apply_edits(&self.raw_text, edits)?;
        self.tree = syntax::reparse(
            &self.path,
            self.kind,
            &self.tree,
            &self.raw_text,
            edits,
            &text,
        )?;
        self.text = text;
        self.source_map = source_map;
        Ok(self)
    }

    /// Original-source position of an offset in the rewritten text
    #[must_use]
    pub fn original_position(&self, offset: usize) -> Position {
        let original = self.source_map.original_offset(offset);
        self.raw_lines.position(&self.raw_text, original)
    }

    /// Whether this is an ambient library
    #[inline]
    #[must_use]
    pub fn is_library(&self) -> bool {
        self.path.is_library()
    }
}

/// Registry of module records for one compilation host
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    records: RwLock<IndexMap<ModulePath, Arc<ModuleRecord>>>,
}

impl ModuleRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record, or return the existing one for its path
    pub fn register(&self, record: ModuleRecord) -> Arc<ModuleRecord> {
        let mut records = self.records.write();
        if let Some(existing) = records.get(&record.path) {
            return Arc::clone(existing);
        }
        tracing::debug!(path = %record.path, deps = record.dependencies.len(), "Registered module");
        let record = Arc::new(record);
        records.insert(record.path.clone(), Arc::clone(&record));
        record
    }

    /// Replace the content of a registered module, bumping its version
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::NotRegistered`] if the path is unknown.
    pub fn replace(&self, mut record: ModuleRecord) -> Result<Arc<ModuleRecord>, ModuleError> {
        let mut records = self.records.write();
        let Some(slot) = records.get_mut(&record.path) else {
            return Err(ModuleError::NotRegistered(record.path));
        };
        record.version = slot.version + 1;
        tracing::debug!(path = %record.path, version = record.version, "Replaced module");
        *slot = Arc::new(record);
        Ok(Arc::clone(slot))
    }

    /// Get record by path
    #[must_use]
    pub fn get(&self, path: &ModulePath) -> Option<Arc<ModuleRecord>> {
        self.records.read().get(path).cloned()
    }

    /// Check whether a path is registered
    #[must_use]
    pub fn contains(&self, path: &ModulePath) -> bool {
        self.records.read().contains_key(path)
    }

    /// Registered paths in registration order
    #[must_use]
    pub fn list(&self) -> Vec<ModulePath> {
        self.records.read().keys().cloned().collect()
    }

    /// Registered records in registration order
    #[must_use]
    pub fn records(&self) -> Vec<Arc<ModuleRecord>> {
        self.records.read().values().cloned().collect()
    }

    /// Number of registered modules
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(path: &str, text: &str) -> ModuleRecord {
        let path = ModulePath::parse(path).unwrap();
        let url = path.to_url(&Url::parse("http://app.test/").unwrap()).unwrap();
        let head = ResponseHead {
            url: url.clone(),
            status: 200,
            last_modified: None,
            content_type: None,
        };
        ModuleRecord::parse(path, url, ScriptKind::Ts, text.to_string(), head).unwrap()
    }

    #[test]
    fn register_is_idempotent() {
        let registry = ModuleRegistry::new();
        let first = registry.register(record("/a.ts", "export const a = 1;"));
        let second = registry.register(record("/a.ts", "export const a = 2;"));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.text, "export const a = 1;");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn list_preserves_registration_order() {
        let registry = ModuleRegistry::new();
        registry.register(record("/b.ts", ""));
        registry.register(record("/a.ts", ""));
        let paths: Vec<_> = registry.list().iter().map(ToString::to_string).collect();
        assert_eq!(paths, vec!["/b.ts", "/a.ts"]);
    }

    #[test]
    fn replace_bumps_version() {
        let registry = ModuleRegistry::new();
        registry.register(record("/a.ts", "export const a = 1;"));
        let replaced = registry
            .replace(record("/a.ts", "export const a = 2;"))
            .unwrap();

        assert_eq!(replaced.version, 2);
        assert_eq!(
            registry.get(&replaced.path).unwrap().text,
            "export const a = 2;"
        );
    }

    #[test]
    fn replace_unknown_fails() {
        let registry = ModuleRegistry::new();
        assert!(matches!(
            registry.replace(record("/a.ts", "")),
            Err(ModuleError::NotRegistered(_))
        ));
    }

    #[test]
    fn rewrite_maps_positions_back() {
        let source = "import { a } from './a';\nlet x: string = a;\n";
        let rec = record("/src/main.ts", source)
            .rewrite(
                &[TextEdit::replace(18..23, "'/src/a.ts'")],
                vec![ModulePath::parse("/src/a.ts").unwrap()],
            )
            .unwrap();

        assert_eq!(rec.text, "import { a } from '/src/a.ts';\nlet x: string = a;\n");
        assert_eq!(rec.dependencies.len(), 1);
        let let_offset = rec.text.find("let").unwrap();
        assert_eq!(
            rec.original_position(let_offset),
            Position { line: 2, column: 1 }
        );
    }
}
