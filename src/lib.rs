//! StrataLock - strict two-phase locking over a key-value store
//!
//! Transactions read and write single keys through a shared lock table.
//! Shared locks guard reads, Exclusive locks guard writes, and every lock is
//! held until commit or abort. A request that cannot be granted is queued and
//! answers [`Outcome::Blocked`]; the client polls with `check_lock` or waits
//! with the blocking variants. Cycles in the waits-for graph are broken by
//! aborting the youngest transaction.
//!
//! # Quick Start
//!
//! ```ignore
//! use stratalock::{Database, Outcome};
//!
//! let db = Database::ephemeral()?;
//!
//! let t1 = db.begin()?;
//! t1.put("a", "0")?;
//!
//! let t2 = db.begin()?;
//! assert_eq!(t2.get("a")?, Outcome::Blocked);
//!
//! t1.commit()?;
//! assert_eq!(t2.check_lock()?.to_string(), "0");
//! ```
//!
//! # Architecture
//!
//! - `stratalock-core`: ids, keys, values, outcomes and errors
//! - `stratalock-storage`: the in-memory stores underneath the locks
//! - `stratalock-concurrency`: lock table, transaction handler, deadlock coordinator
//! - `stratalock-engine`: the [`Database`], its transactions and the detector thread

pub use stratalock_concurrency::{
    Acquisition, LockEntry, LockRequest, LockTable, PendingRequest, TransactionCoordinator,
    TransactionHandler, TransactionStatus, UndoEntry, WaitsForGraph,
};
pub use stratalock_core::{
    AbortMode, Completion, Error, Key, KeyValueStore, LockMode, Outcome, Result, TxnId, Value,
};
pub use stratalock_engine::{
    Database, DatabaseStats, DeadlockDetector, LockConfig, StoreKind, Transaction,
    CONFIG_FILE_NAME,
};
pub use stratalock_storage::{ShardedStore, UnifiedStore};
