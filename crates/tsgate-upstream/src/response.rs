//! Upstream responses and freshness markers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use url::Url;

/// Upstream `last-modified` timestamp used as a coarse staleness check
///
/// Second precision, compared chronologically. Content is never hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FreshnessMarker(DateTime<Utc>);

impl FreshnessMarker {
    /// Wrap a timestamp
    #[inline]
    #[must_use]
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// Parse an HTTP date (`Wed, 21 Oct 2015 07:28:00 GMT`)
    ///
    /// Returns `None` for anything that is not a valid date; callers treat
    /// that the same as a missing marker.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        DateTime::parse_from_rfc2822(value.trim())
            .ok()
            .map(|dt| Self(dt.with_timezone(&Utc)))
    }

    /// Timestamp
    #[inline]
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }

    /// Format as an HTTP date header value
    #[must_use]
    pub fn to_http_date(&self) -> String {
        self.0.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }
}

impl Display for FreshnessMarker {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_http_date())
    }
}

/// Response metadata kept alongside a module for later freshness comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Source URL the content was fetched for (no bypass marker)
    pub url: Url,
    /// HTTP status
    pub status: u16,
    /// Freshness marker, if upstream sent a parseable `last-modified`
    pub last_modified: Option<FreshnessMarker>,
    /// Upstream content type
    pub content_type: Option<String>,
}

/// Response received from the upstream server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    /// Final URL of the response
    pub url: Url,
    /// HTTP status
    pub status: u16,
    /// Reason phrase
    pub status_text: String,
    /// Response headers (name, value)
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    /// 200 response with a body
    #[must_use]
    pub fn ok(url: Url, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url,
            status: 200,
            status_text: "OK".to_string(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Response with an arbitrary status and empty body
    #[must_use]
    pub fn with_status(url: Url, status: u16, status_text: impl Into<String>) -> Self {
        Self {
            url,
            status,
            status_text: status_text.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Add a header
    #[inline]
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body
    #[inline]
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Exactly 200: the only status that is compiled or cached
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Case-insensitive header lookup
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parsed `last-modified` header
    #[must_use]
    pub fn last_modified(&self) -> Option<FreshnessMarker> {
        self.header("last-modified").and_then(FreshnessMarker::parse)
    }

    /// Body decoded as UTF-8 (invalid sequences replaced)
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Metadata for `source_url`
    #[must_use]
    pub fn head(&self, source_url: &Url) -> ResponseHead {
        ResponseHead {
            url: source_url.clone(),
            status: self.status,
            last_modified: self.last_modified(),
            content_type: self.header("content-type").map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_http_date() {
        let marker = FreshnessMarker::parse("Wed, 21 Oct 2015 07:28:00 GMT").unwrap();
        assert_eq!(marker.to_http_date(), "Wed, 21 Oct 2015 07:28:00 GMT");
    }

    #[test]
    fn invalid_date_is_none() {
        assert!(FreshnessMarker::parse("yesterday").is_none());
        assert!(FreshnessMarker::parse("").is_none());
    }

    #[test]
    fn markers_order_chronologically() {
        let older = FreshnessMarker::parse("Wed, 21 Oct 2015 07:28:00 GMT").unwrap();
        let newer = FreshnessMarker::parse("Thu, 22 Oct 2015 07:28:00 GMT").unwrap();
        assert!(older < newer);
    }

    #[test]
    fn response_last_modified() {
        let url = Url::parse("http://app.test/a.ts").unwrap();
        let resp = UpstreamResponse::ok(url.clone(), "x")
            .with_header("Last-Modified", "Wed, 21 Oct 2015 07:28:00 GMT")
            .with_header("Content-Type", "video/mp2t");

        let head = resp.head(&url);
        assert!(resp.is_ok());
        assert!(head.last_modified.is_some());
        assert_eq!(head.content_type.as_deref(), Some("video/mp2t"));
    }

    #[test]
    fn only_200_is_ok() {
        let url = Url::parse("http://app.test/a.ts").unwrap();
        assert!(!UpstreamResponse::with_status(url.clone(), 204, "No Content").is_ok());
        assert!(!UpstreamResponse::with_status(url, 304, "Not Modified").is_ok());
    }
}
