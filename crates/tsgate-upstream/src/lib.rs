//! tsgate Upstream
//!
//! The fetch contract between the gateway and the application server it sits
//! in front of.
//!
//! # Overview
//!
//! - [`Upstream`]: async fetch trait, implemented over HTTP by
//!   [`HttpUpstream`] and in memory by the test fixtures
//! - [`UpstreamRequest`] / [`UpstreamResponse`]: owned request/response data
//! - [`BYPASS_PARAM`]: query marker attached to internal re-fetches so the
//!   interception layer does not compile them again
//! - [`FreshnessMarker`]: parsed `last-modified` used for cache staleness

pub mod error;
pub mod http;
pub mod request;
pub mod response;

pub use error::FetchError;
pub use http::HttpUpstream;
pub use request::{
    has_bypass_marker, source_url, with_bypass_marker, CacheMode, UpstreamRequest, BYPASS_PARAM,
};
pub use response::{FreshnessMarker, ResponseHead, UpstreamResponse};

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Source of upstream content
#[async_trait]
pub trait Upstream: Send + Sync + Debug {
    /// Perform a request
    ///
    /// Any HTTP status is a successful fetch; only transport failures are
    /// errors.
    async fn fetch(&self, req: UpstreamRequest) -> Result<UpstreamResponse, FetchError>;
}

#[async_trait]
impl<T: Upstream + ?Sized> Upstream for Arc<T> {
    async fn fetch(&self, req: UpstreamRequest) -> Result<UpstreamResponse, FetchError> {
        (**self).fetch(req).await
    }
}

/// Fetch `url` with the bypass marker and no-cache, requiring a 200
///
/// # Errors
///
/// Returns [`FetchError::Status`] for any other status, or the transport
/// error from the upstream.
pub async fn fetch_source(
    upstream: &dyn Upstream,
    url: &url::Url,
) -> Result<UpstreamResponse, FetchError> {
    let response = upstream.fetch(UpstreamRequest::bypass(url)).await?;
    if !response.is_ok() {
        return Err(FetchError::status(
            source_url(url).as_str(),
            response.status,
            response.status_text.clone(),
        ));
    }
    Ok(response)
}
