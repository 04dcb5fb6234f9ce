//! Core traits for storage abstraction
//!
//! The lock layer is agnostic of how values are kept. Anything that can get,
//! put and delete single keys can sit underneath it; the store provides no
//! transactional semantics of its own.

use std::sync::Arc;

use crate::types::Key;
use crate::value::Value;

/// Key-value store used underneath the lock table
///
/// Thread safety: all methods must be safe to call concurrently from
/// multiple threads (requires Send + Sync). Each individual call must be
/// atomic; the lock table provides isolation across calls.
pub trait KeyValueStore: Send + Sync {
    /// Get the current value for key
    ///
    /// Returns None if the key doesn't exist.
    fn get(&self, key: &Key) -> Option<Value>;

    /// Insert or overwrite the value for key
    fn put(&self, key: Key, value: Value);

    /// Remove key, returning the previous value if it existed
    ///
    /// Used to restore "absent" pre-images on rollback.
    fn delete(&self, key: &Key) -> Option<Value>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn get(&self, key: &Key) -> Option<Value> {
        (**self).get(key)
    }

    fn put(&self, key: Key, value: Value) {
        (**self).put(key, value)
    }

    fn delete(&self, key: &Key) -> Option<Value> {
        (**self).delete(key)
    }
}
