//! Database struct and open/close logic
//!
//! This module provides the main Database struct that orchestrates:
//! - Store selection from `stratalock.toml`
//! - The shared lock table and its deadlock coordinator
//! - Transaction id allocation and the registry of live transactions
//! - The background deadlock detector
//!
//! ## Transaction API
//!
//! `begin()` hands out a [`Transaction`] with the next free id;
//! `begin_with_id(id)` accepts an externally assigned one. Each transaction
//! can be driven by polling (`get`/`put` then `check_lock`) or by the
//! blocking `get_wait`/`put_wait`.

pub mod config;
pub(crate) mod registry;

pub use config::{LockConfig, StoreKind, CONFIG_FILE_NAME};

use parking_lot::Mutex as ParkingMutex;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use stratalock_concurrency::{LockTable, TransactionCoordinator, TransactionHandler};
use stratalock_core::{AbortMode, Completion, Error, KeyValueStore, Result, TxnId};
use stratalock_storage::{ShardedStore, UnifiedStore};

use crate::background::DeadlockDetector;
use crate::transaction::Transaction;
use registry::{SharedHandler, TransactionRegistry};

/// Snapshot of database counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DatabaseStats {
    /// Transactions currently registered
    pub active: usize,
    /// Transactions begun since open
    pub started: u64,
    /// Transactions committed
    pub committed: u64,
    /// Transactions rolled back, victims included
    pub aborted: u64,
    /// Victims aborted by deadlock resolution
    pub deadlocks_resolved: u64,
}

/// Counters behind [`DatabaseStats`].
///
/// Relaxed ordering: the counters are observational and synchronise nothing.
#[derive(Default)]
struct Counters {
    started: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
    deadlocks_resolved: AtomicU64,
}

/// State shared by the database, its transactions and the detector thread
pub(crate) struct DatabaseInner {
    config: LockConfig,
    table: Arc<LockTable>,
    store: Arc<dyn KeyValueStore>,
    coordinator: TransactionCoordinator,
    registry: TransactionRegistry,
    next_id: AtomicU64,
    counters: Counters,
}

impl DatabaseInner {
    pub(crate) fn config(&self) -> &LockConfig {
        &self.config
    }

    pub(crate) fn lock_table(&self) -> &Arc<LockTable> {
        &self.table
    }

    /// Register a handler for `txn`
    fn begin(&self, txn: TxnId) -> Result<SharedHandler> {
        let handler = self.registry.register(txn, || {
            TransactionHandler::new(Arc::clone(&self.table), txn, Arc::clone(&self.store))
        })?;
        self.counters.started.fetch_add(1, Ordering::Relaxed);
        Ok(handler)
    }

    /// Drop a finished transaction from the registry and count it
    pub(crate) fn finish(&self, txn: TxnId, completion: Completion) {
        if !self.registry.remove(txn) {
            return;
        }
        match completion {
            Completion::Committed => self.counters.committed.fetch_add(1, Ordering::Relaxed),
            Completion::UserAbort | Completion::DeadlockAbort => {
                self.counters.aborted.fetch_add(1, Ordering::Relaxed)
            }
        };
    }

    /// Abort deadlock victims until the waits-for graph is acyclic
    pub(crate) fn resolve_deadlocks(&self) -> Vec<TxnId> {
        let mut victims = Vec::new();

        while let Some(victim) = self.coordinator.detect_deadlocks() {
            let Some(handler) = self.registry.get(victim) else {
                warn!(victim = %victim, "deadlock victim is not a live transaction");
                break;
            };

            let completion = {
                let mut handler = handler.lock();
                if handler.status().is_terminal() {
                    // Finished on its own between detection and now
                    None
                } else {
                    Some(handler.abort(AbortMode::DeadlockVictim))
                }
            };

            if let Some(completion) = completion {
                self.finish(victim, completion);
                self.counters.deadlocks_resolved.fetch_add(1, Ordering::Relaxed);
                info!(victim = %victim, "deadlock victim aborted");
                victims.push(victim);
            }
        }
        victims
    }
}

/// A lock-managed key-value database
///
/// Owns the lock table, the store and the background deadlock detector.
/// Dropping the database stops the detector; transactions still alive keep
/// the shared state alive until they finish.
pub struct Database {
    inner: Arc<DatabaseInner>,
    detector: ParkingMutex<Option<DeadlockDetector>>,
}

impl Database {
    /// Open a database configured by `stratalock.toml` in `dir`
    ///
    /// Creates the directory and a default config file if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or config file cannot be created or
    /// read, or if the config is invalid.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Arc<Self>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let config_path = dir.join(CONFIG_FILE_NAME);
        LockConfig::write_default_if_missing(&config_path)?;
        let config = LockConfig::from_file(&config_path)?;
        Self::open_with_config(config)
    }

    /// Open a database with an explicit configuration
    pub fn open_with_config(config: LockConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let store: Arc<dyn KeyValueStore> = match config.store_kind()? {
            StoreKind::Unified => Arc::new(UnifiedStore::new()),
            StoreKind::Sharded => Arc::new(ShardedStore::new()),
        };
        let table = Arc::new(LockTable::new());

        let inner = Arc::new(DatabaseInner {
            coordinator: TransactionCoordinator::new(Arc::clone(&table)),
            table,
            store,
            registry: TransactionRegistry::default(),
            next_id: AtomicU64::new(1),
            counters: Counters::default(),
            config,
        });

        let detector = if inner.config.deadlock_detection {
            Some(DeadlockDetector::spawn(
                Arc::downgrade(&inner),
                inner.config.detection_interval(),
            )?)
        } else {
            None
        };

        info!(
            store = %inner.config.store,
            deadlock_detection = inner.config.deadlock_detection,
            "database opened"
        );

        Ok(Arc::new(Self {
            inner,
            detector: ParkingMutex::new(detector),
        }))
    }

    /// Open a database with the default configuration
    pub fn ephemeral() -> Result<Arc<Self>> {
        Self::open_with_config(LockConfig::default())
    }

    /// The active configuration
    pub fn config(&self) -> &LockConfig {
        &self.inner.config
    }

    /// The shared lock table
    pub fn lock_table(&self) -> &Arc<LockTable> {
        &self.inner.table
    }

    /// The underlying store, bypassing locking
    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.inner.store)
    }

    /// Begin a transaction with the next free id
    pub fn begin(&self) -> Result<Transaction> {
        loop {
            let txn = TxnId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
            // Skip ids taken through begin_with_id
            if self.inner.registry.contains(txn) {
                continue;
            }
            match self.inner.begin(txn) {
                Ok(handler) => return Ok(Transaction::new(Arc::clone(&self.inner), txn, handler)),
                Err(Error::DuplicateTransaction(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Begin a transaction with an externally assigned id
    ///
    /// # Errors
    ///
    /// Returns `DuplicateTransaction` if a live transaction already uses `id`.
    pub fn begin_with_id(&self, id: impl Into<TxnId>) -> Result<Transaction> {
        let txn = id.into();
        let handler = self.inner.begin(txn)?;
        debug!(txn = %txn, "transaction registered with external id");
        Ok(Transaction::new(Arc::clone(&self.inner), txn, handler))
    }

    /// Ids of live transactions, ascending
    pub fn active_transactions(&self) -> Vec<TxnId> {
        self.inner.registry.ids()
    }

    /// Abort deadlock victims until no cycle remains
    ///
    /// Returns the victims in the order they were aborted. The background
    /// detector calls this periodically when enabled.
    pub fn resolve_deadlocks(&self) -> Vec<TxnId> {
        self.inner.resolve_deadlocks()
    }

    /// Current counters
    pub fn stats(&self) -> DatabaseStats {
        let counters = &self.inner.counters;
        DatabaseStats {
            active: self.inner.registry.len(),
            started: counters.started.load(Ordering::Relaxed),
            committed: counters.committed.load(Ordering::Relaxed),
            aborted: counters.aborted.load(Ordering::Relaxed),
            deadlocks_resolved: counters.deadlocks_resolved.load(Ordering::Relaxed),
        }
    }

    /// Check if the background detector is running
    pub fn is_detector_running(&self) -> bool {
        self.detector
            .lock()
            .as_ref()
            .map_or(false, DeadlockDetector::is_running)
    }

    /// Stop the background detector
    ///
    /// Transactions keep working; deadlocks must then be resolved with
    /// [`resolve_deadlocks`](Self::resolve_deadlocks).
    pub fn shutdown(&self) {
        if let Some(mut detector) = self.detector.lock().take() {
            detector.stop();
        }
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.shutdown();
    }
}
