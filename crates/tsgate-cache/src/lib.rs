//! tsgate Cache
//!
//! Persistence for the gateway.
//!
//! # Overview
//!
//! - [`KeyValueStore`]: async get/set/delete in a [`StoreNamespace`]
//! - [`MemoryStore`]: bounded moka-backed store, the default
//! - [`FileStore`]: directory-backed store that survives restarts
//! - [`FreshnessCache`]: compiled modules keyed by source URL and validated
//!   against upstream `last-modified`

pub mod error;
pub mod file;
pub mod freshness;
pub mod memory;
pub mod store;

pub use error::StoreError;
pub use file::FileStore;
pub use freshness::{CacheEntry, FreshnessCache, JAVASCRIPT_CONTENT_TYPE};
pub use memory::{MemoryStore, DEFAULT_CAPACITY};
pub use store::{
    get_json, set_json, KeyValueStore, StoreNamespace, COMPILED_PARTITION, CONFIG_PARTITION,
    STORE_NAME, STORE_VERSION,
};
