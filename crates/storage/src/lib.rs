//! Storage layer for StrataLock
//!
//! In-memory implementations of [`KeyValueStore`]:
//! - UnifiedStore: BTreeMap-based storage with RwLock, sorted iteration
//! - ShardedStore: DashMap-based storage, per-shard locking
//!
//! Neither store is transactional. Isolation comes from the lock table in
//! `stratalock-concurrency`; rollback comes from each transaction's undo log.
//!
//! [`KeyValueStore`]: stratalock_core::KeyValueStore

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod sharded;
pub mod unified;

pub use sharded::ShardedStore;
pub use unified::UnifiedStore;
