//! tsgate Server
//!
//! HTTP gateway in front of an application server. Requests for `.ts` and
//! `.tsx` modules are answered with JavaScript compiled on the fly;
//! everything else is forwarded unchanged.
//!
//! # Overview
//!
//! - [`Interceptor`]: routes each request to compilation or passthrough
//! - [`CompileHandler`]: freshness check, compilation pass, cache update
//! - [`ConfigLoader`]: per-pass `tsconfig.json` from the upstream
//! - [`Gateway`]: wiring from [`Settings`]
//! - [`server`]: warp front end

pub mod error;
pub mod handler;
pub mod interceptor;
pub mod logging;
pub mod server;
pub mod settings;
pub mod tsconfig;

pub use error::ServerError;
pub use handler::CompileHandler;
pub use interceptor::{classify, Interceptor, Route};
pub use logging::{LogFormat, LogSettings};
pub use settings::Settings;
pub use tsconfig::{ConfigError, ConfigLoader, TSCONFIG_KEY};

use std::sync::Arc;
use tsgate_cache::{FileStore, FreshnessCache, KeyValueStore, MemoryStore};
use tsgate_upstream::{HttpUpstream, Upstream};
use url::Url;

/// Fully wired gateway
#[derive(Debug, Clone)]
pub struct Gateway {
    settings: Settings,
    origin: Url,
    interceptor: Interceptor,
}

impl Gateway {
    /// Gateway over HTTP with the configured store
    ///
    /// # Errors
    ///
    /// Returns an error for invalid settings or an unusable HTTP client.
    pub fn from_settings(settings: Settings) -> Result<Self, ServerError> {
        let upstream: Arc<dyn Upstream> =
            Arc::new(HttpUpstream::with_timeout(settings.upstream_timeout())?);
        let store: Arc<dyn KeyValueStore> = match &settings.store_dir {
            Some(dir) => Arc::new(FileStore::new(dir)),
            None => Arc::new(MemoryStore::new(settings.cache_capacity)),
        };
        Self::with_parts(settings, upstream, store)
    }

    /// Gateway over an explicit upstream and store
    ///
    /// # Errors
    ///
    /// Returns an error for invalid settings.
    pub fn with_parts(
        settings: Settings,
        upstream: Arc<dyn Upstream>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, ServerError> {
        settings.validate()?;
        let origin = settings.upstream_url()?;
        let tsconfig_url = origin
            .join(&settings.tsconfig_path)
            .map_err(ServerError::settings)?;

        let config = ConfigLoader::new(Arc::clone(&upstream), Arc::clone(&store), tsconfig_url);
        let handler = CompileHandler::new(
            Arc::clone(&upstream),
            FreshnessCache::new(store),
            config,
            origin.clone(),
            settings.lib_base_url()?,
        );
        let interceptor = Interceptor::new(upstream, handler, settings.scope.clone());
        tracing::debug!(origin = %origin, scope = %settings.scope, "Gateway configured");

        Ok(Self {
            settings,
            origin,
            interceptor,
        })
    }

    /// Settings
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Interception entry point
    #[inline]
    #[must_use]
    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    /// Upstream URL of a request target (`/src/a.ts?v=1`)
    ///
    /// # Errors
    ///
    /// Returns an error if the target does not form a valid URL.
    pub fn request_url(&self, target: &str) -> Result<Url, ServerError> {
        self.origin
            .join(target)
            .map_err(|e| ServerError::InvalidTarget {
                target: target.to_string(),
                message: e.to_string(),
            })
    }
}
