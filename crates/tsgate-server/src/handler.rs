//! Compile request handler
//!
//! Per request: fetch the module from upstream (bypass marker, no-cache),
//! pass non-200 answers through, serve a fresh cache entry when the
//! upstream `last-modified` allows it, and otherwise run a full
//! compilation pass on a new host. Every module compiled by the pass is
//! recorded in the cache under its own URL. A module served without
//! `last-modified` loses its cache entry whatever the pass produced.

use std::sync::Arc;
use tsgate_cache::{CacheEntry, FreshnessCache, JAVASCRIPT_CONTENT_TYPE};
use tsgate_compiler::{CombinedEmitOutput, CompilationHost, HostConfig};
use tsgate_upstream::{fetch_source, source_url, Upstream, UpstreamRequest, UpstreamResponse};
use url::Url;

use crate::error::ServerError;
use crate::interceptor::end_to_end_headers;
use crate::tsconfig::ConfigLoader;

const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Handles requests routed to compilation
#[derive(Debug, Clone)]
pub struct CompileHandler {
    upstream: Arc<dyn Upstream>,
    cache: FreshnessCache,
    config: ConfigLoader,
    origin: Url,
    lib_base: Url,
}

impl CompileHandler {
    /// Create handler
    #[must_use]
    pub fn new(
        upstream: Arc<dyn Upstream>,
        cache: FreshnessCache,
        config: ConfigLoader,
        origin: Url,
        lib_base: Url,
    ) -> Self {
        Self {
            upstream,
            cache,
            config,
            origin,
            lib_base,
        }
    }

    /// Compiled-module cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &FreshnessCache {
        &self.cache
    }

    /// Answer a compile request; failures become `500 text/plain`
    pub async fn handle(&self, url: &Url) -> UpstreamResponse {
        match self.respond(url).await {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(url = %url, error = %error, "Compilation pass failed");
                text_response(url, 500, error.to_string())
            }
        }
    }

    async fn respond(&self, url: &Url) -> Result<UpstreamResponse, ServerError> {
        let source = source_url(url);
        let response = self.upstream.fetch(UpstreamRequest::bypass(&source)).await?;
        if !response.is_ok() {
            tracing::debug!(url = %source, status = response.status, "Passing through upstream answer");
            let headers = end_to_end_headers(&response.headers);
            return Ok(UpstreamResponse { headers, ..response });
        }

        if let Some(entry) = self.cache.lookup_fresh(&source, response.last_modified()).await {
            return Ok(cached_response(&source, entry));
        }

        let marker = response.last_modified();
        let compiled = self.compile(&source, response).await;
        if marker.is_none() {
            self.cache.delete(&source).await;
        }
        let output = compiled?;
        self.record(&output).await;
        Ok(answer(&source, &output))
    }

    /// Run a full pass rooted at `url` with an already fetched response
    ///
    /// # Errors
    ///
    /// Returns configuration and ingestion failures; diagnostics are part
    /// of the output.
    pub async fn compile(
        &self,
        url: &Url,
        response: UpstreamResponse,
    ) -> Result<CombinedEmitOutput, ServerError> {
        let config = self.config.load().await?;
        let host = CompilationHost::new(
            Arc::clone(&self.upstream),
            HostConfig::new(self.origin.clone(), self.lib_base.clone())
                .with_options(config.compiler_options),
        );
        host.add_lib_files(None).await?;
        host.add_root_url(url, Some(response)).await?;

        let output = host.emit_outputs()?;
        let report = output.report();
        if !report.is_empty() {
            tracing::warn!(
                url = %url,
                errors = report.error_count(),
                diagnostics = %report.render(),
                "Compilation reported diagnostics"
            );
        }
        Ok(output)
    }

    /// Fetch and compile `url` without touching the cache
    ///
    /// # Errors
    ///
    /// Returns the fetch failure or the pass failure.
    pub async fn check(&self, url: &Url) -> Result<CombinedEmitOutput, ServerError> {
        let response = fetch_source(self.upstream.as_ref(), url).await?;
        self.compile(&source_url(url), response).await
    }

    /// Store every compiled module; drop entries of modules without a marker
    async fn record(&self, output: &CombinedEmitOutput) {
        for module in output.files.values() {
            match (&module.compiled, module.response.last_modified) {
                (Some(compiled), marker) => self.cache.record(&module.url, compiled, marker).await,
                (None, None) => self.cache.delete(&module.url).await,
                (None, Some(_)) => {}
            }
        }
    }
}

fn cached_response(url: &Url, entry: CacheEntry) -> UpstreamResponse {
    UpstreamResponse::ok(url.clone(), entry.body)
        .with_header("content-type", entry.content_type)
        .with_header("last-modified", entry.last_modified.to_http_date())
}

/// Requested module's output, else the diagnostics, else not-found
fn answer(url: &Url, output: &CombinedEmitOutput) -> UpstreamResponse {
    if let Some(module) = output.find_by_url(url) {
        if let Some(compiled) = &module.compiled {
            let mut response = UpstreamResponse::ok(url.clone(), compiled.clone())
                .with_header("content-type", JAVASCRIPT_CONTENT_TYPE);
            if let Some(marker) = module.response.last_modified {
                response = response.with_header("last-modified", marker.to_http_date());
            }
            return response;
        }
    }

    let report = output.report();
    if report.is_empty() {
        text_response(url, 500, format!("File “{url}” not found in compiled output"))
    } else {
        text_response(url, 500, report.render())
    }
}

fn text_response(url: &Url, status: u16, body: String) -> UpstreamResponse {
    UpstreamResponse::with_status(url.clone(), status, "Internal Server Error")
        .with_header("content-type", TEXT_CONTENT_TYPE)
        .with_body(body)
}
