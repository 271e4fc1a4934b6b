//! Key/value store contract
//!
//! Keys live in a [`StoreNamespace`]: fixed store name and version plus a
//! partition (`compiled`, `config`). Bumping [`STORE_VERSION`] orphans every
//! older entry.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

use crate::error::StoreError;

/// Store name shared by every partition
pub const STORE_NAME: &str = "tsgate";

/// Store layout version
pub const STORE_VERSION: u32 = 1;

/// Partition holding compiled modules
pub const COMPILED_PARTITION: &str = "compiled";

/// Partition holding resolved configuration
pub const CONFIG_PARTITION: &str = "config";

/// Name, version and partition of a group of keys
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreNamespace {
    name: String,
    version: u32,
    partition: String,
}

impl StoreNamespace {
    /// Partition of the current store version
    #[must_use]
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            name: STORE_NAME.to_string(),
            version: STORE_VERSION,
            partition: partition.into(),
        }
    }

    /// Compiled-module partition
    #[inline]
    #[must_use]
    pub fn compiled() -> Self {
        Self::new(COMPILED_PARTITION)
    }

    /// Configuration partition
    #[inline]
    #[must_use]
    pub fn config() -> Self {
        Self::new(CONFIG_PARTITION)
    }

    /// Store name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store version
    #[inline]
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Partition
    #[inline]
    #[must_use]
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// Fully qualified key
    #[must_use]
    pub fn qualify(&self, key: &str) -> String {
        format!("{self}/{key}")
    }
}

impl Display for StoreNamespace {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/v{}/{}", self.name, self.version, self.partition)
    }
}

/// Persistent key/value store
#[async_trait]
pub trait KeyValueStore: Send + Sync + Debug {
    /// Value of a key, `None` when absent
    async fn get(&self, namespace: &StoreNamespace, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Insert or overwrite a key
    async fn set(&self, namespace: &StoreNamespace, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Remove a key; removing an absent key succeeds
    async fn delete(&self, namespace: &StoreNamespace, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    async fn get(&self, namespace: &StoreNamespace, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(namespace, key).await
    }

    async fn set(&self, namespace: &StoreNamespace, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        (**self).set(namespace, key, value).await
    }

    async fn delete(&self, namespace: &StoreNamespace, key: &str) -> Result<(), StoreError> {
        (**self).delete(namespace, key).await
    }
}

/// Read and decode a JSON value
///
/// # Errors
///
/// Returns the store error, or [`StoreError::Decode`] for malformed bytes.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    namespace: &StoreNamespace,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let Some(bytes) = store.get(namespace, key).await? else {
        return Ok(None);
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Decode {
            key: namespace.qualify(key),
            source,
        })
}

/// Encode and write a JSON value
///
/// # Errors
///
/// Returns [`StoreError::Encode`] or the store error.
pub async fn set_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    namespace: &StoreNamespace,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(value).map_err(|source| StoreError::Encode {
        key: namespace.qualify(key),
        source,
    })?;
    store.set(namespace, key, bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_qualifies_keys() {
        let ns = StoreNamespace::compiled();
        assert_eq!(ns.name(), "tsgate");
        assert_eq!(ns.version(), 1);
        assert_eq!(ns.qualify("http://app.test/a.ts"), "tsgate/v1/compiled/http://app.test/a.ts");
        assert_ne!(StoreNamespace::config(), ns);
    }
}
