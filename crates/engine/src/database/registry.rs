//! Registry of live transactions
//!
//! Maps each live transaction id to its shared handler so the deadlock
//! detector can abort a victim that is owned by another thread. Entries are
//! removed when the transaction commits, aborts or is chosen as a victim.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use stratalock_concurrency::TransactionHandler;
use stratalock_core::{Error, Result, TxnId};

/// A handler shared between its `Transaction` and the registry
pub(crate) type SharedHandler = Arc<Mutex<TransactionHandler>>;

#[derive(Default)]
pub(crate) struct TransactionRegistry {
    live: DashMap<TxnId, SharedHandler>,
}

impl TransactionRegistry {
    /// Register a handler built by `make`, rejecting an id already in use
    pub(crate) fn register(
        &self,
        txn: TxnId,
        make: impl FnOnce() -> TransactionHandler,
    ) -> Result<SharedHandler> {
        match self.live.entry(txn) {
            Entry::Occupied(_) => Err(Error::DuplicateTransaction(txn)),
            Entry::Vacant(slot) => {
                let handler = Arc::new(Mutex::new(make()));
                slot.insert(Arc::clone(&handler));
                Ok(handler)
            }
        }
    }

    pub(crate) fn get(&self, txn: TxnId) -> Option<SharedHandler> {
        self.live.get(&txn).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn remove(&self, txn: TxnId) -> bool {
        self.live.remove(&txn).is_some()
    }

    pub(crate) fn contains(&self, txn: TxnId) -> bool {
        self.live.contains_key(&txn)
    }

    pub(crate) fn len(&self) -> usize {
        self.live.len()
    }

    pub(crate) fn ids(&self) -> Vec<TxnId> {
        let mut ids: Vec<TxnId> = self.live.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }
}
