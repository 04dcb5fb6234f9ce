//! UnifiedStore: ordered in-memory store with a single RwLock
//!
//! This module implements the KeyValueStore trait using:
//! - `BTreeMap<Key, Value>` for ordered key storage
//! - `parking_lot::RwLock` for thread-safe access
//!
//! # Design Notes
//!
//! - **No version history**: each key stores only its latest value; rollback
//!   is driven by the transaction's own undo log, not by the store
//! - **Ordered**: `snapshot()` and `keys()` return keys in sorted order, which
//!   keeps test assertions stable

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use stratalock_core::{Key, KeyValueStore, Value};

/// Unified storage backend using BTreeMap with RwLock
///
/// Cloning a `UnifiedStore` yields another handle to the same data.
#[derive(Debug, Clone, Default)]
pub struct UnifiedStore {
    /// The main data store: ordered map from Key to Value
    data: Arc<RwLock<BTreeMap<Key, Value>>>,
}

impl UnifiedStore {
    /// Create a new empty UnifiedStore
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `entries`
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<Value>,
    {
        let data = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Number of keys currently stored
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// All keys in sorted order
    pub fn keys(&self) -> Vec<Key> {
        self.data.read().keys().cloned().collect()
    }

    /// Deep copy of the current contents
    pub fn snapshot(&self) -> BTreeMap<Key, Value> {
        self.data.read().clone()
    }
}

impl KeyValueStore for UnifiedStore {
    fn get(&self, key: &Key) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    fn put(&self, key: Key, value: Value) {
        self.data.write().insert(key, value);
    }

    fn delete(&self, key: &Key) -> Option<Value> {
        self.data.write().remove(key)
    }
}
