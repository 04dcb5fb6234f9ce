//! Core types and traits for StrataLock
//!
//! This crate defines the foundational types used throughout the system:
//! - TxnId: Transaction identifier
//! - Key: Ordered string key
//! - LockMode / AbortMode: Tagged lock and abort modes
//! - Value: Unified value enum
//! - Outcome / Completion: Protocol results (blocked, no such key, ...)
//! - Error: Error type hierarchy
//! - Traits: Core trait definitions (KeyValueStore)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod outcome;
pub mod traits;
pub mod types;
pub mod value;

// Re-export commonly used types and traits
pub use error::{Error, Result};
pub use outcome::{Completion, Outcome};
pub use traits::KeyValueStore;
pub use types::{AbortMode, Key, LockMode, TxnId};
pub use value::Value;
