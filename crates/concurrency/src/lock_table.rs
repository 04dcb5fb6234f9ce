//! Lock table for strict two-phase locking
//!
//! Maps each key to a [`LockEntry`]: the set of transactions currently
//! holding a lock on the key and a FIFO queue of transactions waiting for one.
//!
//! ## Acquisition rules
//!
//! ```text
//! request      | grant immediately when
//! -------------+-----------------------------------------------------------
//! Shared       | no entry, or all holders Shared and queue empty,
//!              | or the requester already holds the key (any mode)
//! Exclusive    | no entry, or the requester is the sole holder
//!              | (Shared is upgraded in place)
//! ```
//!
//! A request that cannot be granted is queued: at the front when the
//! requester is a Shared holder asking to upgrade while others still share
//! the key, otherwise at the back. Readers never overtake a queued writer.
//!
//! ## Concurrency
//!
//! One table-wide `parking_lot::Mutex` serialises every acquisition, release,
//! poll and graph snapshot. Releases bump a generation counter and signal a
//! condvar so that blocking waiters can sleep between polls without losing a
//! wake-up.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use stratalock_core::{Key, LockMode, TxnId};

/// A (transaction, mode) pair, either holding or waiting for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRequest {
    /// Requesting transaction
    pub txn: TxnId,
    /// Requested mode
    pub mode: LockMode,
}

impl LockRequest {
    /// Create a new request
    pub fn new(txn: TxnId, mode: LockMode) -> Self {
        Self { txn, mode }
    }
}

/// Immediate result of a lock request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// A new lock was granted
    Granted,
    /// The requester's Shared lock was converted to Exclusive in place
    Upgraded,
    /// The requester already holds a lock that covers the request
    AlreadyHeld,
    /// The request was queued; the caller must poll
    Queued,
}

impl Acquisition {
    /// Check if the caller may proceed without waiting
    pub fn is_granted(self) -> bool {
        !matches!(self, Acquisition::Queued)
    }
}

/// Holders and waiters of a single key
///
/// Invariant: `granted` is either all Shared or exactly one Exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockEntry {
    granted: Vec<LockRequest>,
    queue: VecDeque<LockRequest>,
}

impl LockEntry {
    /// Current holders, in grant order
    pub fn granted(&self) -> &[LockRequest] {
        &self.granted
    }

    /// Waiting requests, head first
    pub fn queue(&self) -> &VecDeque<LockRequest> {
        &self.queue
    }

    /// Check if nobody holds or waits for the key
    pub fn is_empty(&self) -> bool {
        self.granted.is_empty() && self.queue.is_empty()
    }

    /// Check the mutual-exclusion invariant
    pub fn is_consistent(&self) -> bool {
        let exclusive = self.granted.iter().filter(|h| h.mode.is_exclusive()).count();
        exclusive == 0 || (exclusive == 1 && self.granted.len() == 1)
    }

    /// Check if `txn` holds the key in exactly `mode`
    pub fn is_granted(&self, txn: TxnId, mode: LockMode) -> bool {
        self.granted.contains(&LockRequest::new(txn, mode))
    }

    fn holder_position(&self, txn: TxnId) -> Option<usize> {
        self.granted.iter().position(|h| h.txn == txn)
    }

    fn all_shared(&self) -> bool {
        self.granted.iter().all(|h| h.mode.is_shared())
    }

    fn acquire_shared(&mut self, txn: TxnId) -> Acquisition {
        if self.holder_position(txn).is_some() {
            return Acquisition::AlreadyHeld;
        }
        // A non-empty queue means a writer is waiting; readers line up behind it
        if self.all_shared() && self.queue.is_empty() {
            self.granted.push(LockRequest::new(txn, LockMode::Shared));
            Acquisition::Granted
        } else {
            self.queue.push_back(LockRequest::new(txn, LockMode::Shared));
            Acquisition::Queued
        }
    }

    fn acquire_exclusive(&mut self, txn: TxnId) -> Acquisition {
        let request = LockRequest::new(txn, LockMode::Exclusive);
        match self.holder_position(txn) {
            Some(pos) if self.granted.len() == 1 => {
                if self.granted[pos].mode.is_exclusive() {
                    Acquisition::AlreadyHeld
                } else {
                    self.granted[pos] = request;
                    Acquisition::Upgraded
                }
            }
            Some(_) => {
                // Upgrade priority: ahead of later arrivals, still behind the co-holders
                self.queue.push_front(request);
                Acquisition::Queued
            }
            None if self.is_empty() => {
                self.granted.push(request);
                Acquisition::Granted
            }
            None => {
                self.queue.push_back(request);
                Acquisition::Queued
            }
        }
    }

    /// Drop `txn`'s hold on the key and hand it to the next waiters.
    fn release(&mut self, txn: TxnId) -> bool {
        let Some(pos) = self.holder_position(txn) else {
            return false;
        };

        if self.granted.len() == 1 {
            match self.queue.front().map(|r| r.mode) {
                None => self.granted.clear(),
                Some(LockMode::Exclusive) => {
                    self.granted.clear();
                    self.granted.extend(self.queue.pop_front());
                }
                Some(LockMode::Shared) => {
                    self.grant_shared_prefix();
                    self.granted.retain(|h| h.txn != txn);
                }
            }
        } else {
            self.granted.remove(pos);
            // A lone survivor with a queued upgrade gets it now
            if let [survivor] = self.granted.as_slice() {
                let survivor = survivor.txn;
                if let Some(i) = self.queue.iter().position(|r| r.txn == survivor) {
                    if let Some(upgrade) = self.queue.remove(i) {
                        self.granted[0] = upgrade;
                    }
                }
            }
        }
        true
    }

    /// Remove a still-queued request of `txn`.
    fn withdraw(&mut self, txn: TxnId, mode: LockMode) -> bool {
        let request = LockRequest::new(txn, mode);
        match self.queue.iter().position(|r| *r == request) {
            Some(i) => {
                self.queue.remove(i);
                true
            }
            None => false,
        }
    }

    /// Grant whatever the head of the queue is now compatible with.
    fn grant_waiters(&mut self) {
        if self.granted.is_empty() {
            match self.queue.front().map(|r| r.mode) {
                Some(LockMode::Exclusive) => self.granted.extend(self.queue.pop_front()),
                Some(LockMode::Shared) => self.grant_shared_prefix(),
                None => {}
            }
        } else if self.all_shared() {
            self.grant_shared_prefix();
        }
    }

    fn grant_shared_prefix(&mut self) {
        while let Some(next) = self.queue.front().copied() {
            if !next.mode.is_shared() {
                break;
            }
            self.queue.pop_front();
            self.granted.push(next);
        }
    }
}

#[derive(Debug, Default)]
struct TableState {
    entries: BTreeMap<Key, LockEntry>,
    /// Bumped on every release
    generation: u64,
}

/// Process-wide lock table shared by all transaction handlers
///
/// Share it with `Arc<LockTable>`; independent tables never interact.
#[derive(Debug, Default)]
pub struct LockTable {
    state: Mutex<TableState>,
    released: Condvar,
}

impl LockTable {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a lock on `key` for `txn`
    ///
    /// Never blocks: a request that cannot be granted is queued and
    /// [`Acquisition::Queued`] is returned. The entry is created lazily.
    pub fn acquire(&self, txn: TxnId, key: &Key, mode: LockMode) -> Acquisition {
        let mut state = self.state.lock();
        let entry = state.entries.entry(key.clone()).or_default();
        let result = match mode {
            LockMode::Shared => entry.acquire_shared(txn),
            LockMode::Exclusive => entry.acquire_exclusive(txn),
        };
        debug!(txn = %txn, key = %key, mode = %mode, result = ?result, "lock request");
        result
    }

    /// Check if `txn` currently holds `key` in exactly `mode`
    pub fn is_granted(&self, txn: TxnId, key: &Key, mode: LockMode) -> bool {
        self.state
            .lock()
            .entries
            .get(key)
            .map_or(false, |entry| entry.is_granted(txn, mode))
    }

    /// Release every lock in `held` and withdraw the `pending` request
    ///
    /// Holders are matched by transaction id, so a Shared record whose lock
    /// was meanwhile promoted to Exclusive still releases the promoted lock.
    /// Wakes all blocking waiters.
    pub fn release_all<'a, I>(&self, txn: TxnId, held: I, pending: Option<(&Key, LockMode)>)
    where
        I: IntoIterator<Item = (&'a Key, LockMode)>,
    {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        for (key, mode) in held {
            let Some(entry) = state.entries.get_mut(key) else {
                warn!(txn = %txn, key = %key, "release of a key with no lock entry");
                continue;
            };
            if entry.release(txn) {
                debug!(txn = %txn, key = %key, mode = %mode, holders = ?entry.granted(), "lock released");
            }
            if entry.is_empty() {
                state.entries.remove(key);
            }
        }

        if let Some((key, mode)) = pending {
            if let Some(entry) = state.entries.get_mut(key) {
                if entry.withdraw(txn, mode) {
                    debug!(txn = %txn, key = %key, mode = %mode, "queued request withdrawn");
                    entry.grant_waiters();
                } else if entry.release(txn) {
                    // Granted by an earlier release but never polled
                    debug!(txn = %txn, key = %key, mode = %mode, "unpolled grant released");
                }
                if entry.is_empty() {
                    state.entries.remove(key);
                }
            }
        }

        state.generation = state.generation.wrapping_add(1);
        self.released.notify_all();
    }

    /// Current release generation
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Sleep until a release happens after generation `seen` was observed
    ///
    /// Returns `true` if a release happened, `false` on timeout.
    pub fn wait_for_release(&self, seen: u64, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        while state.generation == seen {
            match deadline {
                Some(deadline) => {
                    if self.released.wait_until(&mut state, deadline).timed_out() {
                        return state.generation != seen;
                    }
                }
                None => self.released.wait(&mut state),
            }
        }
        true
    }

    /// Run `f` over all entries while holding the table lock
    pub fn inspect<R>(&self, f: impl FnOnce(&BTreeMap<Key, LockEntry>) -> R) -> R {
        f(&self.state.lock().entries)
    }

    /// Deep copy of the table
    pub fn snapshot(&self) -> BTreeMap<Key, LockEntry> {
        self.inspect(Clone::clone)
    }

    /// Holders of `key`, empty if nobody holds it
    pub fn holders(&self, key: &Key) -> Vec<LockRequest> {
        self.inspect(|entries| {
            entries
                .get(key)
                .map(|e| e.granted().to_vec())
                .unwrap_or_default()
        })
    }

    /// Waiters for `key`, head first
    pub fn waiters(&self, key: &Key) -> Vec<LockRequest> {
        self.inspect(|entries| {
            entries
                .get(key)
                .map(|e| e.queue().iter().copied().collect())
                .unwrap_or_default()
        })
    }

    /// Every key `txn` holds or waits for, with the mode
    pub fn locks_of(&self, txn: TxnId) -> Vec<(Key, LockMode)> {
        self.inspect(|entries| {
            entries
                .iter()
                .flat_map(|(key, e)| {
                    e.granted()
                        .iter()
                        .chain(e.queue().iter())
                        .filter(move |r| r.txn == txn)
                        .map(move |r| (key.clone(), r.mode))
                })
                .collect()
        })
    }

    /// Check if an entry exists for `key`
    pub fn contains_key(&self, key: &Key) -> bool {
        self.inspect(|entries| entries.contains_key(key))
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.inspect(BTreeMap::len)
    }

    /// Check if no entry exists
    pub fn is_empty(&self) -> bool {
        self.inspect(BTreeMap::is_empty)
    }

    /// First key whose entry breaks mutual exclusion, if any
    pub fn find_violation(&self) -> Option<Key> {
        self.inspect(|entries| {
            entries
                .iter()
                .find(|(_, e)| !e.is_consistent())
                .map(|(k, _)| k.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn t(id: u64) -> TxnId {
        TxnId::new(id)
    }

    fn k(s: &str) -> Key {
        Key::from(s)
    }

    fn s(id: u64) -> LockRequest {
        LockRequest::new(t(id), LockMode::Shared)
    }

    fn x(id: u64) -> LockRequest {
        LockRequest::new(t(id), LockMode::Exclusive)
    }

    fn release(table: &LockTable, txn: u64, key: &str, mode: LockMode) {
        let key = k(key);
        table.release_all(t(txn), [(&key, mode)], None);
    }

    #[test]
    fn test_first_request_creates_entry() {
        let table = LockTable::new();
        assert!(table.is_empty());

        assert_eq!(table.acquire(t(1), &k("a"), LockMode::Shared), Acquisition::Granted);
        assert!(table.contains_key(&k("a")));
        assert_eq!(table.holders(&k("a")), vec![s(1)]);
    }

    #[test]
    fn test_shared_locks_are_compatible() {
        let table = LockTable::new();
        for id in 0..3 {
            assert_eq!(table.acquire(t(id), &k("a"), LockMode::Shared), Acquisition::Granted);
        }
        assert_eq!(table.holders(&k("a")), vec![s(0), s(1), s(2)]);
        assert!(table.waiters(&k("a")).is_empty());
    }

    #[test]
    fn test_reader_does_not_overtake_waiting_writer() {
        let table = LockTable::new();
        table.acquire(t(0), &k("a"), LockMode::Shared);
        assert_eq!(table.acquire(t(1), &k("a"), LockMode::Exclusive), Acquisition::Queued);
        assert_eq!(table.acquire(t(2), &k("a"), LockMode::Shared), Acquisition::Queued);

        assert_eq!(table.holders(&k("a")), vec![s(0)]);
        assert_eq!(table.waiters(&k("a")), vec![x(1), s(2)]);
    }

    #[test]
    fn test_holder_reads_without_table_change() {
        let table = LockTable::new();
        table.acquire(t(0), &k("a"), LockMode::Exclusive);
        assert_eq!(table.acquire(t(0), &k("a"), LockMode::Shared), Acquisition::AlreadyHeld);
        assert_eq!(table.holders(&k("a")), vec![x(0)]);

        table.acquire(t(1), &k("b"), LockMode::Shared);
        table.acquire(t(2), &k("b"), LockMode::Shared);
        table.acquire(t(3), &k("b"), LockMode::Exclusive);
        assert_eq!(table.acquire(t(1), &k("b"), LockMode::Shared), Acquisition::AlreadyHeld);
        assert_eq!(table.holders(&k("b")), vec![s(1), s(2)]);
    }

    #[test]
    fn test_sole_reader_upgrades_in_place() {
        let table = LockTable::new();
        table.acquire(t(0), &k("a"), LockMode::Shared);
        assert_eq!(table.acquire(t(0), &k("a"), LockMode::Exclusive), Acquisition::Upgraded);
        assert_eq!(table.holders(&k("a")), vec![x(0)]);
        assert_eq!(table.acquire(t(0), &k("a"), LockMode::Exclusive), Acquisition::AlreadyHeld);
    }

    #[test]
    fn test_shared_upgrade_goes_to_queue_front() {
        let table = LockTable::new();
        table.acquire(t(0), &k("a"), LockMode::Shared);
        table.acquire(t(1), &k("a"), LockMode::Shared);
        table.acquire(t(2), &k("a"), LockMode::Exclusive);

        assert_eq!(table.acquire(t(0), &k("a"), LockMode::Exclusive), Acquisition::Queued);
        assert_eq!(table.waiters(&k("a")), vec![x(0), x(2)]);
    }

    #[test]
    fn test_release_last_holder_drops_entry() {
        let table = LockTable::new();
        table.acquire(t(0), &k("a"), LockMode::Exclusive);
        release(&table, 0, "a", LockMode::Exclusive);
        assert!(table.is_empty());
    }

    #[test]
    fn test_release_hands_exclusive_to_queue_head() {
        let table = LockTable::new();
        table.acquire(t(0), &k("a"), LockMode::Exclusive);
        table.acquire(t(1), &k("a"), LockMode::Exclusive);
        table.acquire(t(2), &k("a"), LockMode::Shared);

        release(&table, 0, "a", LockMode::Exclusive);
        assert_eq!(table.holders(&k("a")), vec![x(1)]);
        assert_eq!(table.waiters(&k("a")), vec![s(2)]);
    }

    #[test]
    fn test_release_grants_contiguous_shared_prefix() {
        let table = LockTable::new();
        table.acquire(t(0), &k("a"), LockMode::Exclusive);
        table.acquire(t(1), &k("a"), LockMode::Shared);
        table.acquire(t(2), &k("a"), LockMode::Shared);
        table.acquire(t(3), &k("a"), LockMode::Exclusive);
        table.acquire(t(4), &k("a"), LockMode::Shared);

        release(&table, 0, "a", LockMode::Exclusive);
        assert_eq!(table.holders(&k("a")), vec![s(1), s(2)]);
        assert_eq!(table.waiters(&k("a")), vec![x(3), s(4)]);
    }

    #[test]
    fn test_release_promotes_lone_survivor_upgrade() {
        let table = LockTable::new();
        table.acquire(t(0), &k("a"), LockMode::Shared);
        table.acquire(t(1), &k("a"), LockMode::Shared);
        table.acquire(t(2), &k("a"), LockMode::Exclusive);
        table.acquire(t(0), &k("a"), LockMode::Exclusive);

        release(&table, 1, "a", LockMode::Shared);
        assert_eq!(table.holders(&k("a")), vec![x(0)]);
        assert_eq!(table.waiters(&k("a")), vec![x(2)]);
    }

    #[test]
    fn test_release_co_holder_keeps_writer_waiting() {
        let table = LockTable::new();
        table.acquire(t(0), &k("a"), LockMode::Shared);
        table.acquire(t(1), &k("a"), LockMode::Shared);
        table.acquire(t(2), &k("a"), LockMode::Exclusive);

        release(&table, 0, "a", LockMode::Shared);
        assert_eq!(table.holders(&k("a")), vec![s(1)]);
        assert_eq!(table.waiters(&k("a")), vec![x(2)]);
    }

    #[test]
    fn test_release_matches_holder_by_txn_after_promotion() {
        let table = LockTable::new();
        table.acquire(t(0), &k("a"), LockMode::Shared);
        table.acquire(t(1), &k("a"), LockMode::Shared);
        table.acquire(t(0), &k("a"), LockMode::Exclusive);
        release(&table, 1, "a", LockMode::Shared);
        assert_eq!(table.holders(&k("a")), vec![x(0)]);

        // T0 still books the key as Shared; releasing it frees the promoted lock
        let key = k("a");
        table.release_all(t(0), [(&key, LockMode::Shared)], Some((&key, LockMode::Exclusive)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_withdraw_pending_request() {
        let table = LockTable::new();
        table.acquire(t(0), &k("a"), LockMode::Exclusive);
        table.acquire(t(1), &k("a"), LockMode::Shared);

        let key = k("a");
        table.release_all(t(1), std::iter::empty(), Some((&key, LockMode::Shared)));
        assert_eq!(table.holders(&k("a")), vec![x(0)]);
        assert!(table.waiters(&k("a")).is_empty());
    }

    #[test]
    fn test_withdrawn_writer_lets_readers_behind_it_in() {
        let table = LockTable::new();
        table.acquire(t(0), &k("a"), LockMode::Shared);
        table.acquire(t(1), &k("a"), LockMode::Exclusive);
        table.acquire(t(2), &k("a"), LockMode::Shared);

        let key = k("a");
        table.release_all(t(1), std::iter::empty(), Some((&key, LockMode::Exclusive)));
        assert_eq!(table.holders(&k("a")), vec![s(0), s(2)]);
        assert!(table.waiters(&k("a")).is_empty());
    }

    #[test]
    fn test_locks_of_lists_held_and_waiting() {
        let table = LockTable::new();
        table.acquire(t(0), &k("a"), LockMode::Exclusive);
        table.acquire(t(1), &k("b"), LockMode::Shared);
        table.acquire(t(1), &k("a"), LockMode::Shared);

        assert_eq!(
            table.locks_of(t(1)),
            vec![(k("a"), LockMode::Shared), (k("b"), LockMode::Shared)]
        );
        assert_eq!(table.locks_of(t(0)), vec![(k("a"), LockMode::Exclusive)]);
    }

    #[test]
    fn test_entry_consistency() {
        let mut entry = LockEntry::default();
        assert!(entry.is_consistent());
        entry.granted = vec![s(1), s(2)];
        assert!(entry.is_consistent());
        entry.granted = vec![x(1)];
        assert!(entry.is_consistent());
        entry.granted = vec![x(1), s(2)];
        assert!(!entry.is_consistent());
    }

    #[test]
    fn test_release_bumps_generation() {
        let table = LockTable::new();
        let before = table.generation();
        table.acquire(t(0), &k("a"), LockMode::Exclusive);
        assert_eq!(table.generation(), before);
        release(&table, 0, "a", LockMode::Exclusive);
        assert_eq!(table.generation(), before + 1);
    }

    #[test]
    fn test_pending_release_frees_unpolled_grant() {
        let table = LockTable::new();
        table.acquire(t(0), &k("a"), LockMode::Exclusive);
        table.acquire(t(1), &k("a"), LockMode::Shared);
        table.acquire(t(2), &k("a"), LockMode::Exclusive);
        release(&table, 0, "a", LockMode::Exclusive);
        assert_eq!(table.holders(&k("a")), vec![s(1)]);

        // T1 never polled, so it only knows the request as pending
        let key = k("a");
        table.release_all(t(1), std::iter::empty(), Some((&key, LockMode::Shared)));
        assert_eq!(table.holders(&k("a")), vec![x(2)]);
        assert!(table.waiters(&k("a")).is_empty());

        release(&table, 2, "a", LockMode::Exclusive);
        assert!(table.is_empty());
    }

    #[test]
    fn test_wait_for_release_times_out() {
        let table = LockTable::new();
        let seen = table.generation();
        assert!(!table.wait_for_release(seen, Some(Duration::from_millis(10))));
        // An already-advanced generation returns immediately
        release(&table, 0, "missing", LockMode::Shared);
        assert!(table.wait_for_release(seen, None));
    }

    #[test]
    fn test_wait_for_release_wakes_on_release() {
        let table = Arc::new(LockTable::new());
        table.acquire(t(0), &k("a"), LockMode::Exclusive);
        let seen = table.generation();

        let waiter = {
            let table = Arc::clone(&table);
            thread::spawn(move || table.wait_for_release(seen, Some(Duration::from_secs(10))))
        };
        release(&table, 0, "a", LockMode::Exclusive);
        assert!(waiter.join().unwrap());
    }
}
