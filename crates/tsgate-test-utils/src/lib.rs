//! Testing utilities for the tsgate workspace
//!
//! An in-memory [`Upstream`] with request accounting, plus fixture URLs.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tsgate_upstream::{
    source_url, FetchError, FreshnessMarker, Upstream, UpstreamRequest, UpstreamResponse,
};
use url::Url;

pub const ORIGIN: &str = "http://app.test/";
pub const LIB_BASE: &str = "http://cdn.test/typescript/lib/";

pub fn origin() -> Url {
    Url::parse(ORIGIN).unwrap()
}

pub fn lib_base() -> Url {
    Url::parse(LIB_BASE).unwrap()
}

/// Origin URL of a path (`/src/a.ts`)
pub fn url(path: &str) -> Url {
    origin().join(path).unwrap()
}

/// URL of a `lib.<name>.d.ts` file
pub fn lib_url(name: &str) -> Url {
    lib_base()
        .join(&format!("lib.{}.d.ts", name.to_ascii_lowercase()))
        .unwrap()
}

/// HTTP date of a Unix timestamp
pub fn http_date(secs: i64) -> String {
    let at = Utc.timestamp_opt(secs, 0).single().unwrap();
    FreshnessMarker::new(at).to_http_date()
}

#[derive(Debug, Clone)]
pub struct StaticFile {
    pub status: u16,
    pub status_text: String,
    pub body: Vec<u8>,
    pub last_modified: Option<String>,
    pub content_type: Option<String>,
}

impl StaticFile {
    pub fn ok(body: impl Into<Vec<u8>>, content_type: Option<&str>) -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            body: body.into(),
            last_modified: None,
            content_type: content_type.map(str::to_string),
        }
    }
}

/// In-memory upstream keyed by source URL (bypass marker ignored)
///
/// Unknown URLs answer 404. Every fetch yields once so concurrent callers
/// interleave.
#[derive(Debug, Default)]
pub struct StaticUpstream {
    files: Mutex<HashMap<String, StaticFile>>,
    fetches: Mutex<HashMap<String, usize>>,
    requests: Mutex<Vec<UpstreamRequest>>,
}

impl StaticUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` at an origin path
    #[must_use]
    pub fn with_file(self, path: &str, body: &str) -> Self {
        self.set_file(path, body);
        self
    }

    /// Serve `body` at an origin path with a `last-modified` timestamp
    #[must_use]
    pub fn with_file_modified(self, path: &str, body: &str, modified_secs: i64) -> Self {
        self.set_file(path, body);
        self.set_last_modified(path, Some(modified_secs));
        self
    }

    /// Answer an origin path with a bodyless status
    #[must_use]
    pub fn with_status(self, path: &str, status: u16, status_text: &str) -> Self {
        let mut file = StaticFile::ok(Vec::new(), None);
        file.status = status;
        file.status_text = status_text.to_string();
        self.insert(&url(path), file);
        self
    }

    /// Serve a library by name
    #[must_use]
    pub fn with_lib(self, name: &str, body: &str) -> Self {
        self.insert(&lib_url(name), StaticFile::ok(body, Some("text/plain")));
        self
    }

    pub fn set_file(&self, path: &str, body: &str) {
        let content_type = if path.ends_with(".json") {
            "application/json"
        } else if path.ends_with(".js") {
            "application/javascript"
        } else {
            "text/plain"
        };
        let mut file = StaticFile::ok(body, Some(content_type));
        if let Some(existing) = self.files.lock().get(url(path).as_str()) {
            file.last_modified.clone_from(&existing.last_modified);
        }
        self.insert(&url(path), file);
    }

    pub fn set_last_modified(&self, path: &str, modified_secs: Option<i64>) {
        if let Some(file) = self.files.lock().get_mut(url(path).as_str()) {
            file.last_modified = modified_secs.map(http_date);
        }
    }

    pub fn insert(&self, url: &Url, file: StaticFile) {
        self.files.lock().insert(source_url(url).to_string(), file);
    }

    /// Number of fetches of a URL, bypassed or not
    pub fn fetch_count(&self, url: &Url) -> usize {
        self.fetches
            .lock()
            .get(source_url(url).as_str())
            .copied()
            .unwrap_or(0)
    }

    /// Fetches across all URLs
    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().values().sum()
    }

    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Upstream for StaticUpstream {
    async fn fetch(&self, req: UpstreamRequest) -> Result<UpstreamResponse, FetchError> {
        tokio::task::yield_now().await;

        let key = source_url(&req.url).to_string();
        *self.fetches.lock().entry(key.clone()).or_insert(0) += 1;
        self.requests.lock().push(req.clone());

        let Some(file) = self.files.lock().get(&key).cloned() else {
            return Ok(UpstreamResponse::with_status(req.url, 404, "Not Found"));
        };
        let mut response = UpstreamResponse {
            url: req.url,
            status: file.status,
            status_text: file.status_text,
            headers: Vec::new(),
            body: file.body,
        };
        if let Some(content_type) = file.content_type {
            response = response.with_header("content-type", content_type);
        }
        if let Some(modified) = file.last_modified {
            response = response.with_header("last-modified", modified);
        }
        Ok(response)
    }
}
