//! Database engine for stratalock
//!
//! This crate ties the lower layers together:
//! - Database: store selection, config loading, transaction ids
//! - Transaction: polling and blocking access through the lock table
//! - Background deadlock detection
//!
//! The engine is the only component that shares handlers across threads; the
//! concurrency crate's handlers are single-owner.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod background;
pub mod database;
pub mod transaction;

pub use background::{DeadlockDetector, DETECTOR_THREAD_NAME};
pub use database::{Database, DatabaseStats, LockConfig, StoreKind, CONFIG_FILE_NAME};
pub use transaction::Transaction;
