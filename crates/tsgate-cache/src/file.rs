//! Directory-backed store
//!
//! Layout: `<root>/<name>/v<version>/<partition>/<blake3(key)>`. Writes go to
//! a sibling temporary file first and are renamed into place, so readers
//! never observe a partial value.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::StoreError;
use crate::store::{KeyValueStore, StoreNamespace};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Persistent key/value store in a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Store rooted at `root`; directories are created on first write
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, namespace: &StoreNamespace) -> PathBuf {
        self.root
            .join(namespace.name())
            .join(format!("v{}", namespace.version()))
            .join(namespace.partition())
    }

    /// File holding `key`
    #[must_use]
    pub fn entry_path(&self, namespace: &StoreNamespace, key: &str) -> PathBuf {
        let digest = blake3::hash(key.as_bytes());
        self.partition_dir(namespace).join(digest.to_hex().as_str())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, namespace: &StoreNamespace, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.entry_path(namespace, key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    async fn set(&self, namespace: &StoreNamespace, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let dir = self.partition_dir(namespace);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;

        let path = self.entry_path(namespace, key);
        let temp = path.with_extension(format!(
            "{}-{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&temp, &value)
            .await
            .map_err(|e| StoreError::io(&temp, e))?;
        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            // best effort; the rename error is the one worth reporting
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(StoreError::io(path, e));
        }
        Ok(())
    }

    async fn delete(&self, namespace: &StoreNamespace, key: &str) -> Result<(), StoreError> {
        let path = self.entry_path(namespace, key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn values_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let ns = StoreNamespace::compiled();

        FileStore::new(dir.path())
            .set(&ns, "http://app.test/a.ts", b"compiled".to_vec())
            .await
            .unwrap();

        let reopened = FileStore::new(dir.path());
        assert_eq!(
            reopened.get(&ns, "http://app.test/a.ts").await.unwrap(),
            Some(b"compiled".to_vec())
        );
    }

    #[tokio::test]
    async fn overwrite_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let ns = StoreNamespace::config();

        assert_eq!(store.get(&ns, "tsConfig").await.unwrap(), None);
        store.set(&ns, "tsConfig", b"1".to_vec()).await.unwrap();
        store.set(&ns, "tsConfig", b"2".to_vec()).await.unwrap();
        assert_eq!(store.get(&ns, "tsConfig").await.unwrap(), Some(b"2".to_vec()));

        store.delete(&ns, "tsConfig").await.unwrap();
        store.delete(&ns, "tsConfig").await.unwrap();
        assert_eq!(store.get(&ns, "tsConfig").await.unwrap(), None);
    }

    #[test]
    fn layout_is_versioned() {
        let store = FileStore::new("/var/cache/tsgate");
        let path = store.entry_path(&StoreNamespace::compiled(), "k");
        assert!(path.starts_with("/var/cache/tsgate/tsgate/v1/compiled"));
        assert_eq!(path.file_name().unwrap().len(), 64);
    }

    #[tokio::test]
    async fn unreadable_entry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let ns = StoreNamespace::compiled();
        // a directory where the entry file should be
        tokio::fs::create_dir_all(store.entry_path(&ns, "k")).await.unwrap();

        assert!(matches!(store.get(&ns, "k").await, Err(StoreError::Io { .. })));
    }
}
