//! Core types for StrataLock
//!
//! This module defines the foundational types:
//! - TxnId: Externally assigned transaction identifier
//! - Key: Ordered string key used by the lock table and the store
//! - LockMode: Shared / Exclusive lock discriminator
//! - AbortMode: Why a transaction is being aborted

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Unique identifier for a transaction
///
/// Ids are assigned by the caller (or by the engine's allocator) and are
/// assumed unique among live transactions. The total order on ids is what
/// makes deadlock victim selection deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxnId(u64);

impl TxnId {
    /// Wrap a raw id
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw id
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for TxnId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Key addressed by transactions
///
/// Keys are plain UTF-8 strings. Ordering is lexicographic so that lock
/// table iteration (and everything derived from it) is reproducible.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key(String);

impl Key {
    /// Create a key from anything string-like
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key, returning the owned string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&Key> for Key {
    fn from(k: &Key) -> Self {
        k.clone()
    }
}

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lock modes
///
/// Shared locks are mutually compatible; Exclusive is compatible with
/// nothing, including another Exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LockMode {
    /// Read lock, any number of holders
    Shared,
    /// Write lock, single holder
    Exclusive,
}

impl LockMode {
    /// Whether a lock in `self` mode can be held alongside one in `other` mode
    pub fn is_compatible_with(self, other: LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }

    /// Check if this is the shared mode
    pub fn is_shared(self) -> bool {
        self == LockMode::Shared
    }

    /// Check if this is the exclusive mode
    pub fn is_exclusive(self) -> bool {
        self == LockMode::Exclusive
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Shared => f.write_str("S"),
            LockMode::Exclusive => f.write_str("X"),
        }
    }
}

/// Reason an abort was issued
///
/// Rollback is identical for both; the mode only selects the reported
/// completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbortMode {
    /// The transaction asked to abort itself
    UserRequested,
    /// The deadlock detector picked this transaction as the victim
    DeadlockVictim,
}

impl fmt::Display for AbortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortMode::UserRequested => f.write_str("user requested"),
            AbortMode::DeadlockVictim => f.write_str("deadlock victim"),
        }
    }
}
