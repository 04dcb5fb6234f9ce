//! Transaction handles
//!
//! A [`Transaction`] wraps a registered [`TransactionHandler`] behind a mutex
//! so the deadlock detector can abort it from its own thread. Every operation
//! first checks that the transaction is still live:
//!
//! - chosen as a deadlock victim: `Error::TransactionAborted`
//! - committed or aborted by its owner: `Error::TransactionNotActive`
//!
//! Blocking waits never hold the handler mutex while sleeping; a victim abort
//! bumps the lock table's release generation, which wakes the waiter so it
//! can observe the abort.

use parking_lot::MutexGuard;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use stratalock_concurrency::{TransactionHandler, TransactionStatus};
use stratalock_core::{AbortMode, Completion, Error, Key, Outcome, Result, TxnId, Value};

use crate::database::registry::SharedHandler;
use crate::database::DatabaseInner;

/// A live transaction on a [`Database`](crate::Database)
///
/// Dropping a transaction that has not finished aborts it.
pub struct Transaction {
    db: Arc<DatabaseInner>,
    txn: TxnId,
    handler: SharedHandler,
}

impl Transaction {
    pub(crate) fn new(db: Arc<DatabaseInner>, txn: TxnId, handler: SharedHandler) -> Self {
        Self { db, txn, handler }
    }

    /// Transaction id
    pub fn id(&self) -> TxnId {
        self.txn
    }

    /// Current status
    pub fn status(&self) -> TransactionStatus {
        self.handler.lock().status()
    }

    /// Check if a request is queued
    pub fn is_blocked(&self) -> bool {
        self.handler.lock().is_blocked()
    }

    /// Keys held, with their modes
    pub fn held_locks(&self) -> Vec<(Key, stratalock_core::LockMode)> {
        self.handler
            .lock()
            .acquired_locks()
            .iter()
            .map(|(key, mode)| (key.clone(), *mode))
            .collect()
    }

    /// Read `key`; [`Outcome::Blocked`] if the request was queued
    pub fn get(&self, key: impl Into<Key>) -> Result<Outcome> {
        Ok(self.live()?.perform_get(key))
    }

    /// Write `key`; [`Outcome::Blocked`] if the request was queued
    pub fn put(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<Outcome> {
        Ok(self.live()?.perform_put(key, value))
    }

    /// Poll the queued request
    ///
    /// # Errors
    ///
    /// Returns `NoPendingLock` if nothing is queued.
    pub fn check_lock(&self) -> Result<Outcome> {
        let mut handler = self.live()?;
        if !handler.is_blocked() {
            return Err(Error::NoPendingLock(self.txn));
        }
        Ok(handler.check_lock())
    }

    /// Read `key`, waiting for the lock if needed
    ///
    /// Waits up to `lock_wait_timeout_ms` if configured. A request queued
    /// earlier is waited for first.
    pub fn get_wait(&self, key: impl Into<Key>) -> Result<Outcome> {
        self.settle_pending()?;
        let outcome = self.live()?.perform_get(key);
        self.wait_if_blocked(outcome)
    }

    /// Write `key`, waiting for the lock if needed
    ///
    /// Waits up to `lock_wait_timeout_ms` if configured. A request queued
    /// earlier is waited for first.
    pub fn put_wait(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<Outcome> {
        self.settle_pending()?;
        let outcome = self.live()?.perform_put(key, value);
        self.wait_if_blocked(outcome)
    }

    /// Wait until the queued request is granted
    ///
    /// # Errors
    ///
    /// - `NoPendingLock` if nothing is queued
    /// - `LockWaitTimeout` if the configured bound elapses (the request stays queued)
    /// - `TransactionAborted` if the transaction is chosen as a deadlock victim
    pub fn wait_for_grant(&self) -> Result<Outcome> {
        let table = Arc::clone(self.db.lock_table());
        let deadline = self.db.config().lock_wait_timeout().map(|t| Instant::now() + t);

        loop {
            let seen = {
                let mut handler = self.live()?;
                let Some(key) = handler.pending().map(|r| r.key().clone()) else {
                    return Err(Error::NoPendingLock(self.txn));
                };

                let seen = table.generation();
                let outcome = handler.check_lock();
                if !outcome.is_blocked() {
                    return Ok(outcome);
                }
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    debug!(txn = %self.txn, key = %key, "lock wait timed out");
                    return Err(Error::LockWaitTimeout { txn: self.txn, key });
                }
                seen
            };

            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            table.wait_for_release(seen, remaining);
        }
    }

    /// Commit and release every lock
    pub fn commit(&self) -> Result<Completion> {
        let completion = self.live()?.commit();
        self.db.finish(self.txn, completion);
        Ok(completion)
    }

    /// Roll back every write and release every lock
    pub fn abort(&self) -> Result<Completion> {
        let completion = self.live()?.abort(AbortMode::UserRequested);
        self.db.finish(self.txn, completion);
        Ok(completion)
    }

    /// Lock the handler, failing if the transaction has finished
    fn live(&self) -> Result<MutexGuard<'_, TransactionHandler>> {
        let handler = self.handler.lock();
        match handler.status() {
            TransactionStatus::Active | TransactionStatus::Blocked => Ok(handler),
            TransactionStatus::Aborted(AbortMode::DeadlockVictim) => Err(Error::TransactionAborted {
                txn: self.txn,
                completion: Completion::DeadlockAbort,
            }),
            status => Err(Error::TransactionNotActive {
                txn: self.txn,
                state: status.to_string(),
            }),
        }
    }

    fn settle_pending(&self) -> Result<()> {
        if self.live()?.is_blocked() {
            self.wait_for_grant()?;
        }
        Ok(())
    }

    fn wait_if_blocked(&self, outcome: Outcome) -> Result<Outcome> {
        match outcome {
            Outcome::Blocked => self.wait_for_grant(),
            outcome => Ok(outcome),
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("txn", &self.txn)
            .field("status", &self.status())
            .finish()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let completion = {
            let mut handler = self.handler.lock();
            if handler.status().is_terminal() {
                return;
            }
            warn!(txn = %self.txn, "transaction dropped without commit or abort, aborting");
            handler.abort(AbortMode::UserRequested)
        };
        self.db.finish(self.txn, completion);
    }
}
