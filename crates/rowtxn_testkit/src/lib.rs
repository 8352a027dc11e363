//! # rowtxn Testkit
//!
//! Test utilities for rowtxn.
//!
//! This crate provides:
//! - Test fixtures over an in-memory store
//! - Crash injection for the commit protocol
//! - Property-based test generators using proptest
//! - Stress workloads for concurrent transactions
//!
//! ## Usage
//!
//! ```rust
//! use rowtxn_testkit::prelude::*;
//!
//! let cluster = TestCluster::new();
//! cluster.seed("t", "row", "f", "q", "1");
//! assert_eq!(cluster.value("t", "row", "f", "q").unwrap(), "1");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stress;

use tracing_subscriber::EnvFilter;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
    pub use crate::stress::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;

/// Installs a test subscriber filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
