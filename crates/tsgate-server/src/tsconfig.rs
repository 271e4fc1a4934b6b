//! `tsconfig.json` loading
//!
//! Fetched from the upstream once per compiling pass with the bypass
//! marker. The resolved document is written to the store under
//! [`TSCONFIG_KEY`] so it can be inspected after the fact.

use std::sync::Arc;
use tsgate_cache::{set_json, KeyValueStore, StoreNamespace};
use tsgate_compiler::TsConfig;
use tsgate_upstream::{fetch_source, FetchError, Upstream};
use url::Url;

/// Store key of the resolved configuration
pub const TSCONFIG_KEY: &str = "tsConfig";

/// Errors loading `tsconfig.json`
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Fetch failed; the message is upstream's status text when there is one
    #[error("{message}")]
    Fetch {
        /// Reported message
        message: String,
        /// Underlying error
        #[source]
        source: FetchError,
    },

    /// Document is not valid JSON of the expected shape
    #[error("Unable to parse tsconfig.json file")]
    Parse(#[source] serde_json::Error),
}

impl From<FetchError> for ConfigError {
    fn from(source: FetchError) -> Self {
        let message = match &source {
            FetchError::Status { status_text, .. } => status_text.clone(),
            other => other.to_string(),
        };
        Self::Fetch { message, source }
    }
}

/// Loads compiler configuration from the upstream
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    upstream: Arc<dyn Upstream>,
    store: Arc<dyn KeyValueStore>,
    url: Url,
}

impl ConfigLoader {
    /// Loader for the document at `url`
    #[must_use]
    pub fn new(upstream: Arc<dyn Upstream>, store: Arc<dyn KeyValueStore>, url: Url) -> Self {
        Self { upstream, store, url }
    }

    /// Document URL
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Fetch, parse and record the configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Fetch`] for a failed or non-200 fetch and
    /// [`ConfigError::Parse`] for a malformed document.
    pub async fn load(&self) -> Result<TsConfig, ConfigError> {
        let response = fetch_source(self.upstream.as_ref(), &self.url).await?;
        let config = TsConfig::from_slice(&response.body).map_err(ConfigError::Parse)?;
        tracing::debug!(
            url = %self.url,
            target = config.compiler_options.target.alias(),
            module = config.compiler_options.module.alias(),
            "Loaded tsconfig.json"
        );

        if let Err(error) = set_json(self.store.as_ref(), &StoreNamespace::config(), TSCONFIG_KEY, &config).await {
            tracing::warn!(error = %error, "Failed to record resolved tsconfig.json");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsgate_cache::{get_json, MemoryStore};
    use tsgate_compiler::{ModuleKind, ScriptTarget};
    use tsgate_test_utils::{url, StaticUpstream};

    fn loader(upstream: StaticUpstream) -> (ConfigLoader, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let loader = ConfigLoader::new(Arc::new(upstream), store.clone(), url("/tsconfig.json"));
        (loader, store)
    }

    #[tokio::test]
    async fn loads_and_records_config() {
        let upstream = StaticUpstream::new().with_file(
            "/tsconfig.json",
            r#"{ "compilerOptions": { "target": "es2015", "module": "commonjs", "strict": true } }"#,
        );
        let (loader, store) = loader(upstream);

        let config = loader.load().await.unwrap();
        assert_eq!(config.compiler_options.target, ScriptTarget::Es2015);
        assert_eq!(config.compiler_options.module, ModuleKind::CommonJs);

        let stored: TsConfig = get_json(store.as_ref(), &StoreNamespace::config(), TSCONFIG_KEY)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, config);
    }

    #[tokio::test]
    async fn status_text_is_the_message() {
        let upstream = StaticUpstream::new().with_status("/tsconfig.json", 404, "Not Found");
        let (loader, _) = loader(upstream);

        let error = loader.load().await.unwrap_err();
        assert!(matches!(error, ConfigError::Fetch { .. }));
        assert_eq!(error.to_string(), "Not Found");
    }

    #[tokio::test]
    async fn malformed_document() {
        let upstream = StaticUpstream::new().with_file("/tsconfig.json", "{ compilerOptions: ");
        let (loader, _) = loader(upstream);

        let error = loader.load().await.unwrap_err();
        assert_eq!(error.to_string(), "Unable to parse tsconfig.json file");
    }
}
