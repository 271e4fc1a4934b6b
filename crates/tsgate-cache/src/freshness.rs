//! Freshness cache of compiled modules
//!
//! Entries are keyed by the module's source URL and carry the upstream
//! `last-modified` marker they were compiled from. An entry is served only
//! while its marker is at least as new as the upstream's; content is never
//! hashed. Store failures are logged and behave like misses.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tsgate_upstream::{source_url, FreshnessMarker};
use url::Url;

use crate::store::{get_json, set_json, KeyValueStore, StoreNamespace};

/// Content type of compiled modules
pub const JAVASCRIPT_CONTENT_TYPE: &str = "application/javascript";

/// A compiled module as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Source URL (no bypass marker)
    pub url: String,
    /// Compiled JavaScript
    pub body: String,
    /// Response content type
    pub content_type: String,
    /// Upstream marker the body was compiled from
    pub last_modified: FreshnessMarker,
}

impl CacheEntry {
    /// JavaScript entry for a source URL
    #[must_use]
    pub fn javascript(url: &Url, body: impl Into<String>, last_modified: FreshnessMarker) -> Self {
        Self {
            url: source_url(url).to_string(),
            body: body.into(),
            content_type: JAVASCRIPT_CONTENT_TYPE.to_string(),
            last_modified,
        }
    }

    /// Whether this entry is at least as new as `upstream`
    #[inline]
    #[must_use]
    pub fn is_fresh(&self, upstream: FreshnessMarker) -> bool {
        self.last_modified >= upstream
    }
}

/// Compiled-module cache over a key/value store
#[derive(Debug, Clone)]
pub struct FreshnessCache {
    store: Arc<dyn KeyValueStore>,
    namespace: StoreNamespace,
}

impl FreshnessCache {
    /// Cache in the compiled partition of `store`
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            namespace: StoreNamespace::compiled(),
        }
    }

    /// Underlying store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    fn key(url: &Url) -> String {
        source_url(url).to_string()
    }

    /// Stored entry regardless of freshness
    pub async fn get(&self, url: &Url) -> Option<CacheEntry> {
        let key = Self::key(url);
        match get_json::<CacheEntry>(self.store.as_ref(), &self.namespace, &key).await {
            Ok(entry) => entry,
            Err(error) => {
                tracing::warn!(url = %key, error = %error, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Entry for `url` if it is fresh against the upstream marker
    ///
    /// Without an upstream marker nothing is fresh.
    pub async fn lookup_fresh(&self, url: &Url, upstream: Option<FreshnessMarker>) -> Option<CacheEntry> {
        let Some(upstream) = upstream else {
            tracing::debug!(url = %url, "No freshness marker upstream, cache bypassed");
            return None;
        };
        let entry = self.get(url).await?;
        if entry.is_fresh(upstream) {
            tracing::debug!(url = %entry.url, cached = %entry.last_modified, "Cache hit");
            Some(entry)
        } else {
            tracing::debug!(
                url = %entry.url,
                cached = %entry.last_modified,
                upstream = %upstream,
                "Cached entry is stale"
            );
            None
        }
    }

    /// Store an entry, overwriting any previous one
    pub async fn put(&self, entry: &CacheEntry) {
        if let Err(error) = set_json(self.store.as_ref(), &self.namespace, &entry.url, entry).await {
            tracing::warn!(url = %entry.url, error = %error, "Cache write failed");
        }
    }

    /// Remove the entry for `url`
    pub async fn delete(&self, url: &Url) {
        let key = Self::key(url);
        if let Err(error) = self.store.delete(&self.namespace, &key).await {
            tracing::warn!(url = %key, error = %error, "Cache delete failed");
        }
    }

    /// Record a compiled module: stored when it has a marker, otherwise any
    /// previous entry is removed
    pub async fn record(&self, url: &Url, compiled: &str, last_modified: Option<FreshnessMarker>) {
        match last_modified {
            Some(marker) => self.put(&CacheEntry::javascript(url, compiled, marker)).await,
            None => self.delete(url).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::StoreNamespace;
    use tsgate_upstream::with_bypass_marker;

    fn marker(secs: i64) -> FreshnessMarker {
        FreshnessMarker::parse(&tsgate_test_utils::http_date(secs)).unwrap()
    }

    fn cache() -> FreshnessCache {
        FreshnessCache::new(Arc::new(MemoryStore::default()))
    }

    #[tokio::test]
    async fn fresh_while_marker_not_newer() {
        let cache = cache();
        let url = tsgate_test_utils::url("/a.ts");
        cache.record(&url, "let a = 1;", Some(marker(1_000))).await;

        let hit = cache.lookup_fresh(&url, Some(marker(1_000))).await.unwrap();
        assert_eq!(hit.body, "let a = 1;");
        assert_eq!(hit.content_type, "application/javascript");
        assert!(cache.lookup_fresh(&url, Some(marker(999))).await.is_some());
        assert!(cache.lookup_fresh(&url, Some(marker(1_001))).await.is_none());
    }

    #[tokio::test]
    async fn missing_marker_is_never_fresh_and_clears_entry() {
        let cache = cache();
        let url = tsgate_test_utils::url("/a.ts");
        cache.record(&url, "let a = 1;", Some(marker(1_000))).await;

        assert!(cache.lookup_fresh(&url, None).await.is_none());
        cache.record(&url, "let a = 2;", None).await;
        assert!(cache.get(&url).await.is_none());
    }

    #[tokio::test]
    async fn keyed_by_source_url() {
        let cache = cache();
        let url = tsgate_test_utils::url("/a.ts");
        cache.record(&with_bypass_marker(&url), "x", Some(marker(5))).await;

        let entry = cache.get(&url).await.unwrap();
        assert_eq!(entry.url, "http://app.test/a.ts");
    }

    #[tokio::test]
    async fn corrupt_entries_are_misses() {
        let store = Arc::new(MemoryStore::default());
        let url = tsgate_test_utils::url("/a.ts");
        store
            .set(&StoreNamespace::compiled(), url.as_str(), b"not json".to_vec())
            .await
            .unwrap();

        let cache = FreshnessCache::new(store);
        assert!(cache.lookup_fresh(&url, Some(marker(1))).await.is_none());
    }
}
