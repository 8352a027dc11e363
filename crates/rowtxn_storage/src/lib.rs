//! # rowtxn Storage
//!
//! Cell model and store boundary for rowtxn.
//!
//! This crate provides the lowest-level abstraction for rowtxn: a sharded,
//! row-atomic key-value store addressed by `(table, row, family, qualifier)`.
//! Stores know nothing about transactions; they only offer single-row
//! reads, writes and check-and-mutate.
//!
//! ## Design Principles
//!
//! - Every write touches exactly one row and is atomic for that row
//! - Check-and-mutate is the only synchronization primitive
//! - Stores must be `Send + Sync` for concurrent access
//! - The transaction layer owns the meaning of every reserved column
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and embedding
//!
//! ## Example
//!
//! ```rust
//! use rowtxn_storage::{Cell, Column, ColumnSelection, InMemoryStore, KvStore};
//!
//! let store = InMemoryStore::new();
//! let column = Column::new(b"data", b"value");
//! let applied = store
//!     .check_and_mutate("t", b"row", column, None, &[Cell::put("row", "data", "value", "1")])
//!     .unwrap();
//! assert!(applied);
//!
//! let row = store.get("t", b"row", &ColumnSelection::all()).unwrap();
//! assert_eq!(row.value(b"data", b"value").unwrap(), "1");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod cell;
mod error;
mod memory;
mod row;
mod selection;

pub use backend::{Column, KvStore, RowScanner};
pub use cell::{escape_bytes, Cell, CellType};
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStore;
pub use row::RowSnapshot;
pub use selection::{ColumnSelection, RowRange};
