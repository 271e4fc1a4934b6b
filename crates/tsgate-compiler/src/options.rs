//! Compiler options and `tsconfig.json`
//!
//! `target`, `module` and `moduleResolution` accept the usual string aliases
//! in any letter case. Unknown or missing values fall back to the defaults
//! (`ESNext`, `ESNext`, `Node`) instead of failing.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

macro_rules! alias_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $canonical:literal $(| $extra:literal)* ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )+
        }

        impl $name {
            /// Resolve an alias, ignoring case
            #[must_use]
            pub fn from_alias(alias: &str) -> Option<Self> {
                $(
                    if alias.eq_ignore_ascii_case($canonical) $(|| alias.eq_ignore_ascii_case($extra))* {
                        return Some(Self::$variant);
                    }
                )+
                None
            }

            /// Canonical alias
            #[must_use]
            pub fn alias(self) -> &'static str {
                match self {
                    $( Self::$variant => $canonical, )+
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.alias())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = Value::deserialize(deserializer)?;
                Ok(raw.as_str().and_then(Self::from_alias).unwrap_or(Self::$default))
            }
        }
    };
}

alias_enum! {
    /// Language level of emitted code
    ScriptTarget, default = EsNext {
        /// ES3
        Es3 => "ES3",
        /// ES5
        Es5 => "ES5",
        /// ES2015
        Es2015 => "ES2015" | "ES6",
        /// ES2016
        Es2016 => "ES2016",
        /// ES2017
        Es2017 => "ES2017",
        /// ES2018
        Es2018 => "ES2018",
        /// ES2019
        Es2019 => "ES2019",
        /// ES2020
        Es2020 => "ES2020",
        /// ESNext, also `Latest`
        #[default]
        EsNext => "ESNext" | "Latest",
        /// JSON
        Json => "JSON",
    }
}

alias_enum! {
    /// Module system of emitted code
    ModuleKind, default = EsNext {
        /// None
        None => "None",
        /// CommonJS
        CommonJs => "CommonJS",
        /// AMD
        Amd => "AMD",
        /// UMD
        Umd => "UMD",
        /// System
        System => "System",
        /// ES2015
        Es2015 => "ES2015" | "ES6",
        /// ES2020
        Es2020 => "ES2020",
        /// ESNext
        #[default]
        EsNext => "ESNext",
    }
}

alias_enum! {
    /// Module resolution strategy
    ModuleResolutionKind, default = Node {
        /// Classic
        Classic => "Classic",
        /// Node
        #[default]
        Node => "Node" | "Node10" | "NodeJs",
    }
}

/// Compiler options recognized by the built-in checker and emitter
///
/// Options the engine does not interpret are kept in `extra` and written
/// back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerOptions {
    /// Emitted language level
    pub target: ScriptTarget,
    /// Emitted module system
    pub module: ModuleKind,
    /// Module resolution strategy
    pub module_resolution: ModuleResolutionKind,
    /// Ambient libraries to load (`["ES2015", "DOM"]`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lib: Option<Vec<String>>,
    /// Accept plain script files
    pub allow_js: bool,
    /// Report errors in plain script files
    pub check_js: bool,
    /// Suppress all output when any error is reported
    pub no_emit_on_error: bool,
    /// Concatenate output into one file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_file: Option<String>,
    /// Report unused locals as errors
    pub no_unused_locals: bool,
    /// Keep imports exactly as written, eliding only `type` imports
    pub verbatim_module_syntax: bool,
    /// Reject syntax that needs more than type erasure
    pub erasable_syntax_only: bool,
    /// Uninterpreted options
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parsed `tsconfig.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TsConfig {
    /// Compiler options, defaulted when absent
    #[serde(default)]
    pub compiler_options: CompilerOptions,
    /// Remaining top-level keys (`include`, `files`, ...)
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl TsConfig {
    /// Parse a `tsconfig.json` document
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the document is malformed.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_map_to_enums() {
        let config = TsConfig::from_slice(
            br#"{ "compilerOptions": { "target": "es2017", "module": "CommonJS", "moduleResolution": "classic" } }"#,
        )
        .unwrap();
        let options = config.compiler_options;
        assert_eq!(options.target, ScriptTarget::Es2017);
        assert_eq!(options.module, ModuleKind::CommonJs);
        assert_eq!(options.module_resolution, ModuleResolutionKind::Classic);
    }

    #[test]
    fn unknown_aliases_default() {
        let config = TsConfig::from_slice(
            br#"{ "compilerOptions": { "target": "ES1999", "module": 7 } }"#,
        )
        .unwrap();
        let options = config.compiler_options;
        assert_eq!(options.target, ScriptTarget::EsNext);
        assert_eq!(options.module, ModuleKind::EsNext);
        assert_eq!(options.module_resolution, ModuleResolutionKind::Node);
    }

    #[test]
    fn latest_is_esnext() {
        assert_eq!(ScriptTarget::from_alias("Latest"), Some(ScriptTarget::EsNext));
    }

    #[test]
    fn missing_compiler_options_default() {
        let config = TsConfig::from_slice(br#"{ "include": ["src"] }"#).unwrap();
        assert_eq!(config.compiler_options, CompilerOptions::default());
        assert!(config.rest.contains_key("include"));
    }

    #[test]
    fn flags_and_extra_options() {
        let config = TsConfig::from_slice(
            br#"{ "compilerOptions": { "allowJs": true, "noEmitOnError": true, "lib": ["ES2015", "dom"], "strict": true } }"#,
        )
        .unwrap();
        let options = &config.compiler_options;
        assert!(options.allow_js);
        assert!(options.no_emit_on_error);
        assert_eq!(options.lib.as_deref(), Some(&["ES2015".to_string(), "dom".to_string()][..]));
        assert_eq!(options.extra.get("strict"), Some(&Value::Bool(true)));
    }

    #[test]
    fn resolved_document_serializes_canonical_aliases() {
        let config = TsConfig::from_slice(br#"{ "compilerOptions": { "target": "es5" } }"#).unwrap();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["compilerOptions"]["target"], "ES5");
        assert_eq!(json["compilerOptions"]["module"], "ESNext");
        assert_eq!(json["compilerOptions"]["moduleResolution"], "Node");
    }

    #[test]
    fn malformed_document_is_error() {
        assert!(TsConfig::from_slice(b"{ not json").is_err());
    }
}
