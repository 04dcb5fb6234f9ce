//! Per-transaction lock protocol
//!
//! A [`TransactionHandler`] drives one transaction through strict 2PL:
//! every read takes a Shared lock, every write an Exclusive lock, and all
//! locks are held until [`commit`](TransactionHandler::commit) or
//! [`abort`](TransactionHandler::abort).
//!
//! ## Polling
//!
//! A request that cannot be granted leaves the handler `Blocked` with the
//! request remembered as pending. The caller polls
//! [`check_lock`](TransactionHandler::check_lock) until the lock shows up
//! among the key's holders, at which point the deferred read or write is
//! performed. [`wait_for_grant`](TransactionHandler::wait_for_grant) and the
//! `*_blocking` wrappers do the polling on the table's release condvar.
//!
//! ## Rollback
//!
//! Each write records the key's previous value (or its absence) in the undo
//! log before touching the store. Abort replays the log newest-first, then
//! releases.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use stratalock_core::{
    AbortMode, Completion, Error, Key, KeyValueStore, LockMode, Outcome, Result, TxnId, Value,
};

use crate::lock_table::{Acquisition, LockTable};

/// A request that was queued and is waiting to be granted
#[derive(Debug, Clone, PartialEq)]
pub enum PendingRequest {
    /// Deferred read, needs Shared
    Read {
        /// Key to read
        key: Key,
    },
    /// Deferred write, needs Exclusive
    Write {
        /// Key to write
        key: Key,
        /// Value to write once granted
        value: Value,
    },
}

impl PendingRequest {
    /// Key the request waits on
    pub fn key(&self) -> &Key {
        match self {
            PendingRequest::Read { key } | PendingRequest::Write { key, .. } => key,
        }
    }

    /// Mode the request waits for
    pub fn mode(&self) -> LockMode {
        match self {
            PendingRequest::Read { .. } => LockMode::Shared,
            PendingRequest::Write { .. } => LockMode::Exclusive,
        }
    }
}

/// Pre-image of one write
#[derive(Debug, Clone, PartialEq)]
pub struct UndoEntry {
    /// Written key
    pub key: Key,
    /// Value before the write, `None` if the key was absent
    pub previous: Option<Value>,
}

/// Lifecycle of a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Running, no request outstanding
    Active,
    /// A request is queued in the lock table
    Blocked,
    /// Committed; locks released
    Committed,
    /// Rolled back; locks released
    Aborted(AbortMode),
}

impl TransactionStatus {
    /// Check if the transaction has finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Committed | TransactionStatus::Aborted(_))
    }

    /// The completion recorded for a finished transaction
    pub fn completion(&self) -> Option<Completion> {
        match self {
            TransactionStatus::Committed => Some(Completion::Committed),
            TransactionStatus::Aborted(mode) => Some(Completion::for_abort(*mode)),
            TransactionStatus::Active | TransactionStatus::Blocked => None,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Active => f.write_str("active"),
            TransactionStatus::Blocked => f.write_str("blocked"),
            TransactionStatus::Committed => f.write_str("committed"),
            TransactionStatus::Aborted(mode) => write!(f, "aborted ({})", mode),
        }
    }
}

/// One transaction's view of the lock protocol
///
/// Not shared between threads; the lock table and the store are.
pub struct TransactionHandler {
    xid: TxnId,
    table: Arc<LockTable>,
    store: Arc<dyn KeyValueStore>,
    acquired: BTreeMap<Key, LockMode>,
    desired: Option<PendingRequest>,
    undo_log: Vec<UndoEntry>,
    status: TransactionStatus,
}

impl TransactionHandler {
    /// Start a transaction with an externally assigned id
    pub fn new(table: Arc<LockTable>, xid: impl Into<TxnId>, store: Arc<dyn KeyValueStore>) -> Self {
        let xid = xid.into();
        debug!(txn = %xid, "transaction started");
        Self {
            xid,
            table,
            store,
            acquired: BTreeMap::new(),
            desired: None,
            undo_log: Vec::new(),
            status: TransactionStatus::Active,
        }
    }

    /// Transaction id
    pub fn xid(&self) -> TxnId {
        self.xid
    }

    /// Current status
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Check if a request is queued
    pub fn is_blocked(&self) -> bool {
        self.desired.is_some()
    }

    /// Locks held, one mode per key
    pub fn acquired_locks(&self) -> &BTreeMap<Key, LockMode> {
        &self.acquired
    }

    /// Mode held on `key`, if any
    pub fn held_mode(&self, key: &Key) -> Option<LockMode> {
        self.acquired.get(key).copied()
    }

    /// The queued request, if any
    pub fn pending(&self) -> Option<&PendingRequest> {
        self.desired.as_ref()
    }

    /// Write pre-images, oldest first
    pub fn undo_log(&self) -> &[UndoEntry] {
        &self.undo_log
    }

    /// The shared lock table
    pub fn lock_table(&self) -> &Arc<LockTable> {
        &self.table
    }

    /// Read `key` under a Shared lock
    ///
    /// Returns the value, [`Outcome::NoSuchKey`], or [`Outcome::Blocked`] if
    /// the request was queued.
    pub fn perform_get(&mut self, key: impl Into<Key>) -> Outcome {
        let key = key.into();
        if !self.ready("get", &key) {
            return Outcome::Blocked;
        }

        match self.table.acquire(self.xid, &key, LockMode::Shared) {
            Acquisition::Queued => {
                self.block(PendingRequest::Read { key });
                Outcome::Blocked
            }
            Acquisition::Granted | Acquisition::Upgraded | Acquisition::AlreadyHeld => {
                let value = self.store.get(&key);
                self.acquired.entry(key).or_insert(LockMode::Shared);
                Outcome::from_read(value)
            }
        }
    }

    /// Write `value` to `key` under an Exclusive lock
    ///
    /// Returns [`Outcome::Success`], or [`Outcome::Blocked`] with the value
    /// kept for the deferred write.
    pub fn perform_put(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Outcome {
        let key = key.into();
        let value = value.into();
        if !self.ready("put", &key) {
            return Outcome::Blocked;
        }

        match self.table.acquire(self.xid, &key, LockMode::Exclusive) {
            Acquisition::Queued => {
                self.block(PendingRequest::Write { key, value });
                Outcome::Blocked
            }
            Acquisition::Granted | Acquisition::Upgraded | Acquisition::AlreadyHeld => {
                self.acquired.insert(key.clone(), LockMode::Exclusive);
                self.apply_write(key, value);
                Outcome::Success
            }
        }
    }

    /// Poll the queued request
    ///
    /// Once the table lists this transaction as holder in the requested
    /// mode, performs the deferred read or write and returns its outcome.
    /// Otherwise returns [`Outcome::Blocked`] and changes nothing. Polling
    /// with nothing queued is a no-op that also returns `Blocked`.
    pub fn check_lock(&mut self) -> Outcome {
        let Some(request) = self.desired.as_ref() else {
            warn!(txn = %self.xid, status = %self.status, "lock poll with no pending request");
            return Outcome::Blocked;
        };
        if !self.table.is_granted(self.xid, request.key(), request.mode()) {
            return Outcome::Blocked;
        }

        let request = match self.desired.take() {
            Some(request) => request,
            None => return Outcome::Blocked,
        };
        self.status = TransactionStatus::Active;
        debug!(txn = %self.xid, key = %request.key(), mode = %request.mode(), "pending lock granted");

        match request {
            PendingRequest::Read { key } => {
                let value = self.store.get(&key);
                self.acquired.entry(key).or_insert(LockMode::Shared);
                Outcome::from_read(value)
            }
            PendingRequest::Write { key, value } => {
                // Replaces a Shared record left over from before the upgrade
                self.acquired.insert(key.clone(), LockMode::Exclusive);
                self.apply_write(key, value);
                Outcome::Success
            }
        }
    }

    /// Commit: release every lock and forget the undo log
    ///
    /// Calling it again returns the completion recorded the first time.
    pub fn commit(&mut self) -> Completion {
        if let Some(completion) = self.status.completion() {
            return completion;
        }
        self.release_and_grant_locks();
        self.undo_log.clear();
        self.status = TransactionStatus::Committed;
        debug!(txn = %self.xid, "transaction committed");
        Completion::Committed
    }

    /// Abort: restore every written key, then release every lock
    ///
    /// `mode` only decides the returned completion. Calling it on a finished
    /// transaction returns the completion recorded the first time.
    pub fn abort(&mut self, mode: AbortMode) -> Completion {
        if let Some(completion) = self.status.completion() {
            return completion;
        }

        let undone = self.undo_log.len();
        while let Some(UndoEntry { key, previous }) = self.undo_log.pop() {
            match previous {
                Some(value) => self.store.put(key, value),
                None => {
                    self.store.delete(&key);
                }
            }
        }

        self.release_and_grant_locks();
        self.status = TransactionStatus::Aborted(mode);
        debug!(txn = %self.xid, mode = %mode, undone, "transaction aborted");
        Completion::for_abort(mode)
    }

    /// Poll until the queued request is granted
    ///
    /// Sleeps on the table's release condvar between polls. On timeout the
    /// request stays queued and [`Error::LockWaitTimeout`] is returned.
    pub fn wait_for_grant(&mut self, timeout: Option<Duration>) -> Result<Outcome> {
        self.ensure_not_finished()?;
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let Some(key) = self.desired.as_ref().map(|r| r.key().clone()) else {
                return Err(Error::NoPendingLock(self.xid));
            };

            let seen = self.table.generation();
            let outcome = self.check_lock();
            if !outcome.is_blocked() {
                return Ok(outcome);
            }

            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        debug!(txn = %self.xid, key = %key, "lock wait timed out");
                        return Err(Error::LockWaitTimeout { txn: self.xid, key });
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            self.table.wait_for_release(seen, remaining);
        }
    }

    /// [`perform_get`](Self::perform_get), then wait for the lock if queued
    ///
    /// If an earlier request is still queued, waits for that one first.
    pub fn get_blocking(&mut self, key: impl Into<Key>, timeout: Option<Duration>) -> Result<Outcome> {
        self.finish_pending(timeout)?;
        match self.perform_get(key) {
            Outcome::Blocked => self.wait_for_grant(timeout),
            outcome => Ok(outcome),
        }
    }

    /// [`perform_put`](Self::perform_put), then wait for the lock if queued
    ///
    /// If an earlier request is still queued, waits for that one first.
    pub fn put_blocking(
        &mut self,
        key: impl Into<Key>,
        value: impl Into<Value>,
        timeout: Option<Duration>,
    ) -> Result<Outcome> {
        self.finish_pending(timeout)?;
        match self.perform_put(key, value) {
            Outcome::Blocked => self.wait_for_grant(timeout),
            outcome => Ok(outcome),
        }
    }

    fn finish_pending(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.ensure_not_finished()?;
        if self.desired.is_some() {
            self.wait_for_grant(timeout)?;
        }
        Ok(())
    }

    fn ensure_not_finished(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::TransactionNotActive {
                txn: self.xid,
                state: self.status.to_string(),
            });
        }
        Ok(())
    }

    /// Check that a new request may be issued, logging why not
    fn ready(&self, op: &str, key: &Key) -> bool {
        if self.status.is_terminal() {
            warn!(txn = %self.xid, key = %key, op, status = %self.status, "request on finished transaction");
            return false;
        }
        if let Some(pending) = &self.desired {
            warn!(txn = %self.xid, key = %key, op, pending = %pending.key(), "request while another is queued");
            return false;
        }
        true
    }

    fn block(&mut self, request: PendingRequest) {
        debug!(txn = %self.xid, key = %request.key(), mode = %request.mode(), "transaction blocked");
        self.desired = Some(request);
        self.status = TransactionStatus::Blocked;
    }

    fn apply_write(&mut self, key: Key, value: Value) {
        let previous = self.store.get(&key);
        self.undo_log.push(UndoEntry {
            key: key.clone(),
            previous,
        });
        self.store.put(key, value);
    }

    /// Release every held lock and withdraw the queued request
    fn release_and_grant_locks(&mut self) {
        let pending = self.desired.take();
        self.table.release_all(
            self.xid,
            self.acquired.iter().map(|(key, mode)| (key, *mode)),
            pending.as_ref().map(|r| (r.key(), r.mode())),
        );
        self.acquired.clear();
    }
}

impl fmt::Debug for TransactionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandler")
            .field("xid", &self.xid)
            .field("status", &self.status)
            .field("acquired", &self.acquired)
            .field("desired", &self.desired)
            .field("undo_log", &self.undo_log.len())
            .finish_non_exhaustive()
    }
}

impl Drop for TransactionHandler {
    fn drop(&mut self) {
        if !self.status.is_terminal() {
            warn!(txn = %self.xid, status = %self.status, "transaction dropped while active, aborting");
            self.abort(AbortMode::UserRequested);
        }
    }
}
