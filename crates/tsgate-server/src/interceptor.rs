//! Request interception
//!
//! Decides per request whether to compile or to forward it untouched.
//! Only GET requests for `.ts`/`.tsx` paths inside the scope compile;
//! declaration files and anything carrying the bypass marker pass through.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tsgate_upstream::{has_bypass_marker, Upstream, UpstreamRequest, UpstreamResponse};

use crate::handler::CompileHandler;

static DECLARATION_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\.d\.ts$").unwrap_or_else(|_| unreachable!("declaration pattern is valid"))
});

static TYPESCRIPT_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\.tsx?$").unwrap_or_else(|_| unreachable!("typescript pattern is valid"))
});

/// Headers that describe one connection rather than the message
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Whether a header must not be forwarded
#[must_use]
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Headers minus hop-by-hop ones
#[must_use]
pub fn end_to_end_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name))
        .cloned()
        .collect()
}

/// What to do with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Forward to upstream unchanged
    Passthrough,
    /// Compile the module
    Compile,
}

/// Route a request
#[must_use]
pub fn classify(request: &UpstreamRequest, scope: &str) -> Route {
    if !request.method.eq_ignore_ascii_case("GET") || has_bypass_marker(&request.url) {
        return Route::Passthrough;
    }
    let path = request.url.path();
    if !path.starts_with(scope) || DECLARATION_FILE.is_match(path) {
        return Route::Passthrough;
    }
    if TYPESCRIPT_FILE.is_match(path) {
        Route::Compile
    } else {
        Route::Passthrough
    }
}

/// Interception entry point
#[derive(Debug, Clone)]
pub struct Interceptor {
    upstream: Arc<dyn Upstream>,
    handler: CompileHandler,
    scope: String,
}

impl Interceptor {
    /// Create interceptor compiling under `scope`
    #[must_use]
    pub fn new(upstream: Arc<dyn Upstream>, handler: CompileHandler, scope: impl Into<String>) -> Self {
        Self {
            upstream,
            handler,
            scope: scope.into(),
        }
    }

    /// Compile handler
    #[inline]
    #[must_use]
    pub fn handler(&self) -> &CompileHandler {
        &self.handler
    }

    /// Answer a request
    pub async fn handle(&self, request: UpstreamRequest) -> UpstreamResponse {
        match classify(&request, &self.scope) {
            Route::Compile => self.handler.handle(&request.url).await,
            Route::Passthrough => self.forward(request).await,
        }
    }

    async fn forward(&self, mut request: UpstreamRequest) -> UpstreamResponse {
        request.headers = end_to_end_headers(&request.headers);
        let url = request.url.clone();
        match self.upstream.fetch(request).await {
            Ok(mut response) => {
                response.headers = end_to_end_headers(&response.headers);
                response
            }
            Err(error) => {
                tracing::warn!(url = %url, error = %error, "Passthrough fetch failed");
                UpstreamResponse::with_status(url, 502, "Bad Gateway")
                    .with_header("content-type", "text/plain; charset=utf-8")
                    .with_body(error.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsgate_test_utils::url;
    use tsgate_upstream::with_bypass_marker;

    fn get(path: &str) -> UpstreamRequest {
        UpstreamRequest::get(url(path))
    }

    #[test]
    fn routes_typescript_gets() {
        assert_eq!(classify(&get("/src/a.ts"), "/"), Route::Compile);
        assert_eq!(classify(&get("/src/view.tsx?v=2"), "/"), Route::Compile);
        assert_eq!(classify(&get("/src/a.js"), "/"), Route::Passthrough);
        assert_eq!(classify(&get("/src/a.ts.map"), "/"), Route::Passthrough);
        assert_eq!(classify(&get("/types/env.d.ts"), "/"), Route::Passthrough);
    }

    #[test]
    fn other_methods_and_marked_requests_pass_through() {
        let post = get("/src/a.ts").with_method("POST");
        assert_eq!(classify(&post, "/"), Route::Passthrough);
        let head = get("/src/a.ts").with_method("HEAD");
        assert_eq!(classify(&head, "/"), Route::Passthrough);
        let marked = UpstreamRequest::get(with_bypass_marker(&url("/src/a.ts")));
        assert_eq!(classify(&marked, "/"), Route::Passthrough);
    }

    #[test]
    fn scope_limits_compilation() {
        assert_eq!(classify(&get("/src/a.ts"), "/src/"), Route::Compile);
        assert_eq!(classify(&get("/vendor/a.ts"), "/src/"), Route::Passthrough);
    }

    #[test]
    fn hop_by_hop_headers_are_dropped() {
        let headers = vec![
            ("Connection".to_string(), "keep-alive".to_string()),
            ("content-type".to_string(), "text/plain".to_string()),
            ("Transfer-Encoding".to_string(), "chunked".to_string()),
        ];
        assert_eq!(
            end_to_end_headers(&headers),
            vec![("content-type".to_string(), "text/plain".to_string())]
        );
    }
}
