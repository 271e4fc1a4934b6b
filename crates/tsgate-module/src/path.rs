//! Canonical module paths
//!
//! Provides [`ModulePath`], the unique key of every registered module.
//!
//! Source modules are `/`-rooted with `.`/`..` segments and repeated slashes
//! collapsed; a path never escapes the root. Ambient libraries live in their
//! own flat namespace and are named `lib.<name>.d.ts`.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use url::Url;

use crate::error::ModuleError;

/// Suffixes recognized as scripts (`.d.ts` counts as `.ts`)
pub const SCRIPT_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx"];

/// Suffix appended to specifiers without a recognized script suffix
pub const DEFAULT_EXTENSION: &str = ".ts";

/// Default library file name reported to the checker
pub const DEFAULT_LIB_FILE_NAME: &str = "lib.d.ts";

/// Canonical module path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModulePath(String);

impl ModulePath {
    /// Canonicalize an absolute source path
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::InvalidPath`] if the path is not `/`-rooted.
    pub fn parse(path: &str) -> Result<Self, ModuleError> {
        if !path.starts_with('/') {
            return Err(ModuleError::InvalidPath(path.to_string()));
        }
        Ok(Self(normalize(path)))
    }

    /// Path of a URL (query and fragment ignored)
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        Self(normalize(url.path()))
    }

    /// Library path for a library name (`ES2015`, `dom`, `lib.dom.d.ts`)
    #[must_use]
    pub fn library(name: &str) -> Self {
        Self(lib_file_name(name))
    }

    /// Path text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is an ambient library path
    #[inline]
    #[must_use]
    pub fn is_library(&self) -> bool {
        !self.0.starts_with('/')
    }

    /// Directory portion, with trailing slash
    #[must_use]
    pub fn dir(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[..=idx],
            None => "/",
        }
    }

    /// Final segment
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// Resolve a relative (`./`, `../`) or root-absolute (`/`) specifier
    ///
    /// Returns `None` for bare specifiers and protocol-relative URLs, which
    /// are left to the runtime.
    #[must_use]
    pub fn resolve(&self, specifier: &str) -> Option<Self> {
        if is_relative(specifier) {
            Some(Self(normalize(&format!("{}{specifier}", self.dir()))))
        } else if is_root_absolute(specifier) {
            Some(Self(normalize(specifier)))
        } else {
            None
        }
    }

    /// Append `.ts` unless the path already carries a script suffix
    #[must_use]
    pub fn with_default_extension(self) -> Self {
        if has_script_extension(&self.0) {
            self
        } else {
            Self(format!("{}{DEFAULT_EXTENSION}", self.0))
        }
    }

    /// Script extension (`d.ts` reported as `ts`)
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        let (_, ext) = name.rsplit_once('.')?;
        SCRIPT_EXTENSIONS.contains(&ext).then_some(ext)
    }

    /// Whether this is a declaration file
    #[inline]
    #[must_use]
    pub fn is_declaration_file(&self) -> bool {
        self.0.ends_with(".d.ts")
    }

    /// URL of this path against an origin or library base
    ///
    /// # Errors
    ///
    /// Returns an error if the join produces an invalid URL.
    pub fn to_url(&self, base: &Url) -> Result<Url, ModuleError> {
        base.join(&self.0)
            .map_err(|e| ModuleError::InvalidPath(format!("{}: {e}", self.0)))
    }
}

impl Display for ModulePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ModulePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Collapse `.`/`..` segments and repeated slashes under `/`
#[must_use]
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut out = String::with_capacity(path.len() + 1);
    for segment in &segments {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// `./x`, `../x`, `.` or `..`
#[inline]
#[must_use]
pub fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier == "."
        || specifier == ".."
}

/// `/x` but not `//host/x`
#[inline]
#[must_use]
pub fn is_root_absolute(specifier: &str) -> bool {
    specifier.starts_with('/') && !specifier.starts_with("//")
}

/// Whether the final segment ends in a recognized script suffix
#[must_use]
pub fn has_script_extension(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && SCRIPT_EXTENSIONS.contains(&ext))
}

/// `lib.<lowercased>.d.ts`, accepting names already in that form
#[must_use]
pub fn lib_file_name(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    let bare = lower.strip_prefix("lib.").unwrap_or(&lower);
    let bare = bare.strip_suffix(".d.ts").unwrap_or(bare);
    if bare.is_empty() || bare == "d.ts" {
        DEFAULT_LIB_FILE_NAME.to_string()
    } else {
        format!("lib.{bare}.d.ts")
    }
}

/// Script kind, selecting the grammar and the checks that apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptKind {
    /// TypeScript
    Ts,
    /// TypeScript with JSX
    Tsx,
    /// JavaScript
    Js,
    /// JavaScript with JSX
    Jsx,
}

impl ScriptKind {
    /// Classify by suffix
    ///
    /// Unknown suffixes are TypeScript unless `allow_js` is set.
    #[must_use]
    pub fn from_path(path: &str, allow_js: bool) -> Self {
        let suffix = path.rsplit_once('.').map_or("", |(_, s)| s);
        match suffix {
            "ts" => Self::Ts,
            "tsx" => Self::Tsx,
            "js" => Self::Js,
            "jsx" => Self::Jsx,
            _ if allow_js => Self::Js,
            _ => Self::Ts,
        }
    }

    /// TypeScript syntax allowed
    #[inline]
    #[must_use]
    pub fn is_typescript(self) -> bool {
        matches!(self, Self::Ts | Self::Tsx)
    }

    /// Parsed with the JSX-capable grammar
    ///
    /// Plain scripts use it too so JSX inside `.js` files parses.
    #[inline]
    #[must_use]
    pub fn uses_jsx_grammar(self) -> bool {
        !matches!(self, Self::Ts)
    }
}

impl Display for ScriptKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ts => "TS",
            Self::Tsx => "TSX",
            Self::Js => "JS",
            Self::Jsx => "JSX",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn path(s: &str) -> ModulePath {
        ModulePath::parse(s).unwrap()
    }

    #[test]
    fn normalize_collapses_segments() {
        assert_eq!(normalize("/src/./a/../b.ts"), "/src/b.ts");
        assert_eq!(normalize("//src///b.ts"), "/src/b.ts");
        assert_eq!(normalize("/../../b.ts"), "/b.ts");
        assert_eq!(normalize("/"), "/");
    }

    #[test]
    fn relative_path_requires_root() {
        assert!(ModulePath::parse("src/a.ts").is_err());
    }

    #[test]
    fn resolve_relative_specifiers() {
        let main = path("/src/main.ts");
        assert_eq!(main.resolve("./util").unwrap().as_str(), "/src/util");
        assert_eq!(main.resolve("../lib/x.ts").unwrap().as_str(), "/lib/x.ts");
        assert_eq!(main.resolve("/shared/y").unwrap().as_str(), "/shared/y");
        assert!(main.resolve("react").is_none());
        assert!(main.resolve("//cdn.test/x.js").is_none());
    }

    #[test]
    fn default_extension_policy() {
        let main = path("/src/main.ts");
        let resolve = |s: &str| main.resolve(s).unwrap().with_default_extension();

        assert_eq!(resolve("./util").as_str(), "/src/util.ts");
        assert_eq!(resolve("./view.tsx").as_str(), "/src/view.tsx");
        assert_eq!(resolve("./legacy.js").as_str(), "/src/legacy.js");
        assert_eq!(resolve("./data.json").as_str(), "/src/data.json.ts");
        assert_eq!(resolve("./types.d.ts").as_str(), "/src/types.d.ts");
    }

    #[test]
    fn lib_names() {
        assert_eq!(lib_file_name("ES2015"), "lib.es2015.d.ts");
        assert_eq!(lib_file_name("dom.iterable"), "lib.dom.iterable.d.ts");
        assert_eq!(lib_file_name("lib.DOM.d.ts"), "lib.dom.d.ts");
        assert!(ModulePath::library("esnext").is_library());
        assert!(ModulePath::library("esnext").is_declaration_file());
    }

    #[test]
    fn script_kind_by_suffix() {
        assert_eq!(ScriptKind::from_path("/a.ts", false), ScriptKind::Ts);
        assert_eq!(ScriptKind::from_path("/a.tsx", false), ScriptKind::Tsx);
        assert_eq!(ScriptKind::from_path("/a.js", false), ScriptKind::Js);
        assert_eq!(ScriptKind::from_path("/a.jsx", false), ScriptKind::Jsx);
        assert_eq!(ScriptKind::from_path("/a.mjs", false), ScriptKind::Ts);
        assert_eq!(ScriptKind::from_path("/a.mjs", true), ScriptKind::Js);
    }

    #[test]
    fn extension_and_declaration() {
        let decl = path("/types/globals.d.ts");
        assert!(decl.is_declaration_file());
        assert_eq!(decl.extension(), Some("ts"));
        assert_eq!(path("/a/b").extension(), None);
        assert_eq!(decl.dir(), "/types/");
        assert_eq!(decl.file_name(), "globals.d.ts");
    }

    #[test]
    fn path_from_url_ignores_query() {
        let url = Url::parse("http://app.test/src/../main.ts?x=1#f").unwrap();
        assert_eq!(ModulePath::from_url(&url).as_str(), "/main.ts");
    }

    proptest! {
        #[test]
        fn normalized_is_rooted_and_clean(segments in prop::collection::vec("[a-z]{1,4}|\\.|\\.\\.|", 0..12)) {
            let raw = format!("/{}", segments.join("/"));
            let out = normalize(&raw);
            prop_assert!(out.starts_with('/'));
            prop_assert!(!out.contains("//"));
            prop_assert!(!out.split('/').any(|s| s == "." || s == ".."));
        }

        #[test]
        fn normalize_is_idempotent(segments in prop::collection::vec("[a-z]{1,4}|\\.|\\.\\.|", 0..12)) {
            let once = normalize(&format!("/{}", segments.join("/")));
            prop_assert_eq!(normalize(&once), once.clone());
        }
    }
}
