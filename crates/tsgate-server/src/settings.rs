//! Gateway settings
//!
//! Loaded from TOML; every key is optional. Command-line flags are applied
//! on top by the binary.
//!
//! ```toml
//! listen = "127.0.0.1:8787"
//! upstream = "http://localhost:3000/"
//! scope = "/src/"
//! store_dir = "/var/cache/tsgate"
//!
//! [log]
//! format = "json"
//! filter = "info,tsgate_compiler=debug"
//! ```

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ServerError;
use crate::logging::LogSettings;

/// Default `lib.*.d.ts` location
pub const DEFAULT_LIB_BASE: &str = "https://cdn.jsdelivr.net/npm/typescript@5/lib/";

/// Gateway settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the gateway listens on
    pub listen: SocketAddr,
    /// Application server the gateway fronts
    pub upstream: String,
    /// Path prefix under which TypeScript is compiled
    pub scope: String,
    /// Base URL of `lib.*.d.ts` files
    pub lib_base: String,
    /// Path of `tsconfig.json` on the upstream
    pub tsconfig_path: String,
    /// Directory of the persistent store; in-memory when absent
    pub store_dir: Option<PathBuf>,
    /// Entries kept by the in-memory store
    pub cache_capacity: u64,
    /// Upstream request timeout in seconds
    pub upstream_timeout_secs: u64,
    /// Logging
    pub log: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8787)),
            upstream: "http://127.0.0.1:3000/".to_string(),
            scope: "/".to_string(),
            lib_base: DEFAULT_LIB_BASE.to_string(),
            tsconfig_path: "/tsconfig.json".to_string(),
            store_dir: None,
            cache_capacity: tsgate_cache::DEFAULT_CAPACITY,
            upstream_timeout_secs: 30,
            log: LogSettings::default(),
        }
    }
}

impl Settings {
    /// Parse TOML settings
    ///
    /// # Errors
    ///
    /// Returns an error for malformed TOML or inconsistent values.
    pub fn from_toml_str(text: &str) -> Result<Self, ServerError> {
        let settings: Self = toml::from_str(text).map_err(ServerError::settings)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read and parse a settings file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let text = std::fs::read_to_string(path).map_err(|source| ServerError::SettingsIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check URLs and the scope
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found.
    pub fn validate(&self) -> Result<(), ServerError> {
        self.upstream_url()?;
        self.lib_base_url()?;
        if !self.scope.starts_with('/') {
            return Err(ServerError::settings(format!(
                "scope `{}` must start with `/`",
                self.scope
            )));
        }
        if !self.tsconfig_path.starts_with('/') {
            return Err(ServerError::settings(format!(
                "tsconfig_path `{}` must start with `/`",
                self.tsconfig_path
            )));
        }
        Ok(())
    }

    /// Upstream origin
    ///
    /// # Errors
    ///
    /// Returns an error if `upstream` is not an absolute URL.
    pub fn upstream_url(&self) -> Result<Url, ServerError> {
        parse_base(&self.upstream, "upstream")
    }

    /// Library base, always ending in `/`
    ///
    /// # Errors
    ///
    /// Returns an error if `lib_base` is not an absolute URL.
    pub fn lib_base_url(&self) -> Result<Url, ServerError> {
        parse_base(&self.lib_base, "lib_base")
    }

    /// Upstream request timeout
    #[inline]
    #[must_use]
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

fn parse_base(value: &str, key: &str) -> Result<Url, ServerError> {
    let mut url = Url::parse(value).map_err(|e| ServerError::settings(format!("{key}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(ServerError::settings(format!("{key}: `{value}` cannot be a base URL")));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;

    #[test]
    fn empty_file_is_defaults() {
        assert_eq!(Settings::from_toml_str("").unwrap(), Settings::default());
    }

    #[test]
    fn parses_all_sections() {
        let settings = Settings::from_toml_str(
            r#"
            listen = "0.0.0.0:9000"
            upstream = "http://app.internal:3000"
            scope = "/src/"
            store_dir = "/tmp/tsgate"

            [log]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(settings.listen.port(), 9000);
        assert_eq!(settings.upstream_url().unwrap().as_str(), "http://app.internal:3000/");
        assert_eq!(settings.store_dir.as_deref(), Some(Path::new("/tmp/tsgate")));
        assert_eq!(settings.log.format, LogFormat::Json);
        assert_eq!(settings.log.filter, LogSettings::default().filter);
    }

    #[test]
    fn lib_base_gains_trailing_slash() {
        let settings = Settings {
            lib_base: "http://cdn.test/ts/lib".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.lib_base_url().unwrap().as_str(), "http://cdn.test/ts/lib/");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Settings::from_toml_str("upstream = \"not a url\"").is_err());
        assert!(Settings::from_toml_str("scope = \"src\"").is_err());
        assert!(Settings::from_toml_str("listen = 5").is_err());
    }
}
