//! Shared test utilities for the integration suites.
//!
//! Import via `mod common;` from any test's main.rs.

#![allow(dead_code)]

use std::sync::Arc;

pub use stratalock::{
    Completion, Database, Error, Key, KeyValueStore, LockConfig, LockMode, Outcome, StoreKind,
    TxnId,
};
use tempfile::TempDir;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Database with the background detector switched off
pub fn manual_db() -> Arc<Database> {
    init_tracing();
    Database::open_with_config(LockConfig::default().with_deadlock_detection(false))
        .expect("open manual database")
}

/// Database opened from a temporary directory
pub struct TestDb {
    pub db: Arc<Database>,
    pub dir: TempDir,
}

impl TestDb {
    pub fn new() -> Self {
        init_tracing();
        let dir = TempDir::new().expect("create temp dir");
        let db = Database::open(dir.path()).expect("open database");
        Self { db, dir }
    }

    /// Reopen with whatever `stratalock.toml` now says
    pub fn reopen(self) -> Self {
        let TestDb { db, dir } = self;
        db.shutdown();
        drop(db);
        let db = Database::open(dir.path()).expect("reopen database");
        Self { db, dir }
    }
}

/// Status line a client transport would send for an operation result
pub fn line(result: stratalock::Result<Outcome>) -> String {
    match result {
        Ok(outcome) => outcome.to_string(),
        Err(e) => panic!("operation failed: {}", e),
    }
}
