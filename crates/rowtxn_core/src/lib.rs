//! # rowtxn Core
//!
//! Multi-row, multi-table ACID transactions over a row-atomic store.
//!
//! This crate provides:
//! - Buffered transactions with read-your-writes and repeatable reads
//! - Optimistic two-phase commit driven by a per-row lock column
//! - A single atomic commit point on the transaction's primary row
//! - Lazy recovery of locks left behind by crashed clients
//! - Merged scans over buffered and stored rows
//!
//! The store underneath only needs [`rowtxn_storage::KvStore`]: single-row
//! atomic reads, writes and check-and-mutate. No coordinator is involved;
//! every client runs the protocol itself.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use rowtxn_core::{Config, Put, TransactionManager};
//! use rowtxn_storage::{ColumnSelection, InMemoryStore};
//!
//! let manager = TransactionManager::new(Arc::new(InMemoryStore::new()), Config::default());
//!
//! let mut txn = manager.begin();
//! txn.put("accounts", Put::new("alice").add("balance", "amount", "70")).unwrap();
//! txn.put("accounts", Put::new("bob").add("balance", "amount", "30")).unwrap();
//! txn.commit().unwrap();
//!
//! let mut txn = manager.begin();
//! let row = txn.get("accounts", b"bob", &ColumnSelection::all()).unwrap();
//! assert_eq!(row.value(b"balance", b"amount").unwrap(), "30");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
pub mod lock;
mod manager;
mod mutation;
mod recovery;
mod scanner;
mod stats;
mod transaction;
mod types;

pub use config::Config;
pub use error::{TxnError, TxnResult};
pub use lock::{LockState, RowLock, LOCK_COLUMN, LOCK_FAMILY, LOCK_QUALIFIER};
pub use manager::{TimestampOracle, TransactionManager};
pub use mutation::{Delete, Mutation, Put};
pub use recovery::{RecoveryResolver, Resolution};
pub use scanner::{
    merge_row, merge_view, CellSource, TransactionScanner, BUFFER_SEQUENCE, STORE_SEQUENCE,
};
pub use stats::{StatsSnapshot, TxnStats};
pub use transaction::{Transaction, TransactionState};
pub use types::{RowRef, Timestamp, TransactionId};
