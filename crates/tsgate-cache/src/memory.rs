//! In-memory store using moka
//!
//! Bounded by entry count with LRU-style eviction; contents are lost on
//! restart.

use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;

use crate::error::StoreError;
use crate::store::{KeyValueStore, StoreNamespace};

/// Default number of entries kept
pub const DEFAULT_CAPACITY: u64 = 10_000;

/// Process-local key/value store
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Cache<String, Arc<Vec<u8>>>,
}

impl MemoryStore {
    /// Create store holding at most `max_capacity` entries
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Approximate entry count
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, namespace: &StoreNamespace, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .inner
            .get(&namespace.qualify(key))
            .await
            .map(|value| value.as_ref().clone()))
    }

    async fn set(&self, namespace: &StoreNamespace, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.inner.insert(namespace.qualify(key), Arc::new(value)).await;
        Ok(())
    }

    async fn delete(&self, namespace: &StoreNamespace, key: &str) -> Result<(), StoreError> {
        self.inner.invalidate(&namespace.qualify(key)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let store = MemoryStore::default();
        let ns = StoreNamespace::compiled();

        assert_eq!(store.get(&ns, "k").await.unwrap(), None);
        store.set(&ns, "k", b"v".to_vec()).await.unwrap();
        assert_eq!(store.get(&ns, "k").await.unwrap(), Some(b"v".to_vec()));

        store.delete(&ns, "k").await.unwrap();
        store.delete(&ns, "k").await.unwrap();
        assert_eq!(store.get(&ns, "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn partitions_are_disjoint() {
        let store = MemoryStore::default();
        store
            .set(&StoreNamespace::compiled(), "k", b"compiled".to_vec())
            .await
            .unwrap();
        assert_eq!(store.get(&StoreNamespace::config(), "k").await.unwrap(), None);
    }
}
