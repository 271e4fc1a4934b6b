//! Error types for upstream fetches
//!
//! Every variant is `Clone` so a failure can be observed by all callers that
//! share one in-flight ingestion task.

/// Errors fetching source, library or configuration content from upstream
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Upstream answered with a non-success status
    #[error("{status} {status_text}: {url}")]
    Status {
        /// Requested URL (without the bypass marker)
        url: String,
        /// HTTP status code
        status: u16,
        /// Reason phrase reported by upstream
        status_text: String,
    },

    /// Request could not be delivered or the body could not be read
    #[error("request to {url} failed: {message}")]
    Transport {
        /// Requested URL
        url: String,
        /// Transport error description
        message: String,
    },

    /// URL could not be parsed or joined
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Create status error
    pub fn status(url: impl Into<String>, status: u16, status_text: impl Into<String>) -> Self {
        Self::Status {
            url: url.into(),
            status,
            status_text: status_text.into(),
        }
    }

    /// Create transport error
    pub fn transport(url: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// HTTP status carried by the error, if any
    #[inline]
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<url::ParseError> for FetchError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_display() {
        let err = FetchError::status("http://app.test/src/a.ts", 404, "Not Found");
        assert_eq!(err.to_string(), "404 Not Found: http://app.test/src/a.ts");
        assert_eq!(err.status_code(), Some(404));
    }

    #[test]
    fn transport_error_has_no_status() {
        let err = FetchError::transport("http://app.test/", "connection refused");
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(err.status_code(), None);
    }
}
