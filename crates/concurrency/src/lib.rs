//! Concurrency layer for StrataLock
//!
//! This crate implements strict two-phase locking (2PL) with:
//! - LockTable: per-key Shared/Exclusive locks with FIFO wait queues
//! - TransactionHandler: one transaction's acquire, poll, commit and abort
//! - TransactionCoordinator: deadlock detection on the waits-for graph
//!
//! Locks are held until commit or abort. A request that cannot be granted is
//! queued and polled with `check_lock`; the coordinator names a victim when
//! the queues form a cycle, and the caller aborts it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod handler;
pub mod lock_table;

pub use coordinator::{TransactionCoordinator, WaitsForGraph};
pub use handler::{PendingRequest, TransactionHandler, TransactionStatus, UndoEntry};
pub use lock_table::{Acquisition, LockEntry, LockRequest, LockTable};
