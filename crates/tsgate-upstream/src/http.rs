//! reqwest-backed upstream

use crate::{FetchError, Upstream, UpstreamRequest, UpstreamResponse};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use std::time::Duration;

/// Default request timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP upstream
///
/// Non-success statuses are returned as responses, not errors: the caller
/// decides whether a 404 passes through or fails a compilation pass.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: Client,
}

impl HttpUpstream {
    /// Create with the default timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    /// Create with a custom request timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tsgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::transport("<client>", e))?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    #[inline]
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn header_map(headers: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            tracing::debug!(header = %name, "Dropping invalid request header");
            continue;
        };
        map.append(name, value);
    }
    map
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, req: UpstreamRequest) -> Result<UpstreamResponse, FetchError> {
        let method = Method::from_bytes(req.method.as_bytes())
            .map_err(|e| FetchError::transport(req.url.as_str(), e))?;

        tracing::debug!(method = %method, url = %req.url, "Fetching from upstream");

        let mut builder = self
            .client
            .request(method, req.url.clone())
            .headers(header_map(&req.wire_headers()));
        if !req.body.is_empty() {
            builder = builder.body(req.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::transport(req.url.as_str(), e))?;

        let status = response.status();
        let url = response.url().clone();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::transport(req.url.as_str(), e))?
            .to_vec();

        Ok(UpstreamResponse {
            url,
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_headers_are_dropped() {
        let map = header_map(&[
            ("accept".to_string(), "*/*".to_string()),
            ("bad header".to_string(), "x".to_string()),
        ]);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("accept").unwrap(), "*/*");
    }

    #[test]
    fn client_builds() {
        assert!(HttpUpstream::with_timeout(Duration::from_secs(1)).is_ok());
    }
}
