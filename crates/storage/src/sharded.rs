//! Sharded in-memory store
//!
//! Replaces RwLock + BTreeMap with DashMap.
//! Reads and writes only lock the shard that owns the key, so unrelated keys
//! never contend. Iteration order is unspecified; use [`UnifiedStore`] when a
//! sorted view matters.
//!
//! [`UnifiedStore`]: crate::UnifiedStore

use dashmap::DashMap;
use std::sync::Arc;

use stratalock_core::{Key, KeyValueStore, Value};

/// Store backed by a sharded concurrent hash map
#[derive(Debug, Clone, Default)]
pub struct ShardedStore {
    data: Arc<DashMap<Key, Value>>,
}

impl ShardedStore {
    /// Create an empty store with DashMap's default shard count
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with a fixed shard count (must be a power of two)
    pub fn with_shards(shards: usize) -> Self {
        Self {
            data: Arc::new(DashMap::with_shard_amount(shards)),
        }
    }

    /// Number of keys currently stored
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl KeyValueStore for ShardedStore {
    #[inline]
    fn get(&self, key: &Key) -> Option<Value> {
        self.data.get(key).map(|entry| entry.value().clone())
    }

    #[inline]
    fn put(&self, key: Key, value: Value) {
        self.data.insert(key, value);
    }

    fn delete(&self, key: &Key) -> Option<Value> {
        self.data.remove(key).map(|(_, v)| v)
    }
}
