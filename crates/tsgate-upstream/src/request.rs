//! Upstream requests and the interception bypass marker
//!
//! Internal re-fetches carry [`BYPASS_PARAM`] in their query string so the
//! interception layer passes them through instead of compiling them again.

use url::Url;

/// Query parameter marking a request that must not be intercepted
pub const BYPASS_PARAM: &str = "x-tsgate-skip-compile";

/// Caching mode requested from upstream and intermediaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Let intermediaries apply their own policy
    #[default]
    Default,
    /// Revalidate with the origin, never serve a stored copy
    NoCache,
}

/// Request sent to the upstream server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRequest {
    /// HTTP method
    pub method: String,
    /// Absolute URL
    pub url: Url,
    /// Request headers (name, value)
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Vec<u8>,
    /// Caching mode
    pub cache_mode: CacheMode,
}

impl UpstreamRequest {
    /// Plain GET request
    #[inline]
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            headers: Vec::new(),
            body: Vec::new(),
            cache_mode: CacheMode::Default,
        }
    }

    /// GET request for internal re-fetches: bypass marker plus no-cache
    #[must_use]
    pub fn bypass(url: &Url) -> Self {
        Self {
            cache_mode: CacheMode::NoCache,
            ..Self::get(with_bypass_marker(url))
        }
    }

    /// Override the method
    #[inline]
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Add a header
    #[inline]
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body
    #[inline]
    #[must_use]
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Case-insensitive header lookup
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Headers to put on the wire, including the cache-mode headers
    #[must_use]
    pub fn wire_headers(&self) -> Vec<(String, String)> {
        let mut headers = self.headers.clone();
        if self.cache_mode == CacheMode::NoCache {
            headers.retain(|(n, _)| {
                !n.eq_ignore_ascii_case("cache-control") && !n.eq_ignore_ascii_case("pragma")
            });
            headers.push(("cache-control".to_string(), "no-cache".to_string()));
            headers.push(("pragma".to_string(), "no-cache".to_string()));
        }
        headers
    }

    /// Whether this request carries the bypass marker
    #[inline]
    #[must_use]
    pub fn is_bypassed(&self) -> bool {
        has_bypass_marker(&self.url)
    }
}

/// Append the bypass marker unless already present
#[must_use]
pub fn with_bypass_marker(url: &Url) -> Url {
    let mut marked = url.clone();
    if !has_bypass_marker(url) {
        marked.query_pairs_mut().append_pair(BYPASS_PARAM, "true");
    }
    marked
}

/// Whether a URL carries the bypass marker
#[must_use]
pub fn has_bypass_marker(url: &Url) -> bool {
    url.query_pairs()
        .any(|(key, _)| key.eq_ignore_ascii_case(BYPASS_PARAM))
}

/// URL identifying a source resource: query and fragment removed
#[must_use]
pub fn source_url(url: &Url) -> Url {
    let mut source = url.clone();
    source.set_query(None);
    source.set_fragment(None);
    source
}
