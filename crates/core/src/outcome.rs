//! Protocol outcomes
//!
//! Every lock-protocol operation answers with a distinguished variant rather
//! than an error: a blocked request, a missing key and a successful write are
//! all normal results. The `Display` strings are the status lines a client
//! transport sends back verbatim.

use crate::types::AbortMode;
use crate::value::Value;
use std::fmt;

/// Result of `get`, `put` or a lock poll
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A read was granted and the key holds this value
    Value(Value),
    /// A read was granted and the key is absent
    NoSuchKey,
    /// A write was granted and applied
    Success,
    /// The lock is not (yet) granted; poll again later
    Blocked,
}

impl Outcome {
    /// Map a store read to the read outcome
    pub fn from_read(value: Option<Value>) -> Self {
        match value {
            Some(v) => Outcome::Value(v),
            None => Outcome::NoSuchKey,
        }
    }

    /// Check if the request is still waiting for its lock
    pub fn is_blocked(&self) -> bool {
        matches!(self, Outcome::Blocked)
    }

    /// Get the read value, if this is a granted read of a present key
    pub fn value(&self) -> Option<&Value> {
        match self {
            Outcome::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Value(v) => write!(f, "{}", v),
            Outcome::NoSuchKey => f.write_str("No such key"),
            Outcome::Success => f.write_str("Success"),
            Outcome::Blocked => f.write_str("Blocked"),
        }
    }
}

/// Terminal status of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Completion {
    /// Committed; all locks released
    Committed,
    /// Rolled back at the client's request
    UserAbort,
    /// Rolled back after being chosen as a deadlock victim
    DeadlockAbort,
}

impl Completion {
    /// Completion reported by an abort issued with `mode`
    pub fn for_abort(mode: AbortMode) -> Self {
        match mode {
            AbortMode::UserRequested => Completion::UserAbort,
            AbortMode::DeadlockVictim => Completion::DeadlockAbort,
        }
    }

    /// Check if this completion rolled the transaction back
    pub fn is_abort(&self) -> bool {
        !matches!(self, Completion::Committed)
    }
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Committed => f.write_str("Transaction Completed"),
            Completion::UserAbort => f.write_str("User Abort"),
            Completion::DeadlockAbort => f.write_str("Deadlock Abort"),
        }
    }
}
