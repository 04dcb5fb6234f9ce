//! Error types for StrataLock
//!
//! Lock-protocol outcomes (blocked, no such key, aborted) are not errors; see
//! [`crate::outcome`]. This module covers genuine failures around the
//! protocol: misuse of a finished transaction, configuration problems, and
//! wait timeouts of the blocking wrappers.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::outcome::Completion;
use crate::types::{Key, TxnId};
use std::io;
use thiserror::Error;

/// Result type alias for StrataLock operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for StrataLock
#[derive(Debug, Error)]
pub enum Error {
    /// The transaction was rolled back by someone else (deadlock victim)
    #[error("Transaction {txn} aborted: {completion}")]
    TransactionAborted {
        /// Transaction that was aborted
        txn: TxnId,
        /// How it ended
        completion: Completion,
    },

    /// The transaction already committed or aborted
    #[error("Transaction {txn} is not active ({state})")]
    TransactionNotActive {
        /// Transaction that was used after completion
        txn: TxnId,
        /// Its current state
        state: String,
    },

    /// A live transaction already uses this id
    #[error("Duplicate transaction id {0}")]
    DuplicateTransaction(TxnId),

    /// A lock poll or wait was issued with no request outstanding
    #[error("Transaction {0} is not waiting for any lock")]
    NoPendingLock(TxnId),

    /// A blocking wait gave up before the lock was granted
    #[error("Transaction {txn} timed out waiting for lock on '{key}'")]
    LockWaitTimeout {
        /// Waiting transaction
        txn: TxnId,
        /// Key it is queued on
        key: Key,
    },

    /// Invalid configuration value or unparsable config file
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error (config files, thread spawning)
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl Error {
    /// Check if this error means the transaction is gone for good
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::TransactionAborted { .. })
    }
}
