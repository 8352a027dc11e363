//! Test fixtures and store helpers.
//!
//! Provides an in-memory cluster that several simulated clients can share,
//! plus direct (non-transactional) access to what the store holds.

use bytes::Bytes;
use rowtxn_core::{lock, Config, Put, RowLock, RowRef, TimestampOracle, TransactionManager};
use rowtxn_storage::{ColumnSelection, InMemoryStore, KvStore};
use std::sync::Arc;
use std::time::Duration;

/// One shared in-memory store and the clients that talk to it.
pub struct TestCluster {
    /// The store every client shares.
    pub store: Arc<InMemoryStore>,
    /// The default client.
    pub manager: TransactionManager,
    oracle: TimestampOracle,
}

impl TestCluster {
    /// Creates a cluster with the default configuration and no read retries.
    pub fn new() -> Self {
        Self::with_config(Config::new().read_retry_attempts(0))
    }

    /// Creates a cluster whose default client uses `config`.
    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let oracle = TimestampOracle::new();
        let manager = TransactionManager::with_oracle(store.clone(), config, oracle.clone());
        Self {
            store,
            manager,
            oracle,
        }
    }

    /// Returns another client of the same store and oracle.
    pub fn client(&self, config: Config) -> TransactionManager {
        TransactionManager::with_oracle(self.store.clone(), config, self.oracle.clone())
    }

    /// Returns a client that never waits on a live lock.
    ///
    /// It still recovers every lock whose lease has run out.
    pub fn recovery_client(&self) -> TransactionManager {
        self.client(Config::new().read_retry_attempts(0))
    }

    /// Returns a client whose locks expire as soon as they are written, so
    /// anything it leaves behind can be recovered at once.
    pub fn short_lease_client(&self) -> TransactionManager {
        self.client(Config::new().lock_timeout(Duration::ZERO).read_retry_attempts(0))
    }

    /// Commits one cell through the default client.
    pub fn seed(
        &self,
        table: &str,
        row: &'static str,
        family: &'static str,
        qualifier: &'static str,
        value: &'static str,
    ) {
        let mut txn = self.manager.begin();
        txn.put(table, Put::new(row).add(family, qualifier, value))
            .expect("Failed to buffer seed row");
        txn.commit().expect("Failed to commit seed row");
    }

    /// Reads a cell straight from the store, bypassing the protocol.
    pub fn value(&self, table: &str, row: &str, family: &str, qualifier: &str) -> Option<Bytes> {
        self.store
            .get(table, row.as_bytes(), &ColumnSelection::all())
            .expect("Failed to read store")
            .value(family.as_bytes(), qualifier.as_bytes())
            .cloned()
    }

    /// Reads the lock record of a row, if it was ever locked.
    pub fn lock(&self, table: &str, row: &str) -> Option<RowLock> {
        lock::read(self.store.as_ref(), &RowRef::new(table, Bytes::copy_from_slice(row.as_bytes())))
            .expect("Failed to read lock")
            .map(|(_, lock)| lock)
    }

    /// Returns true if the row's lock is stable or absent.
    pub fn is_stable(&self, table: &str, row: &str) -> bool {
        self.lock(table, row).map_or(true, |lock| lock.is_stable())
    }
}

impl Default for TestCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestCluster {
    type Target = TransactionManager;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

/// Runs a test with a fresh cluster.
///
/// # Example
///
/// ```rust
/// use rowtxn_testkit::with_cluster;
///
/// with_cluster(|cluster| {
///     cluster.seed("t", "a", "f", "q", "1");
///     assert!(cluster.is_stable("t", "a"));
/// });
/// ```
pub fn with_cluster<F, R>(f: F) -> R
where
    F: FnOnce(&TestCluster) -> R,
{
    let cluster = TestCluster::new();
    f(&cluster)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clients_share_the_store() {
        let cluster = TestCluster::new();
        cluster.seed("t", "a", "f", "q", "1");

        let other = cluster.client(Config::default());
        let mut txn = other.begin();
        let row = txn.get("t", b"a", &ColumnSelection::all()).unwrap();
        assert_eq!(row.value(b"f", b"q").unwrap(), "1");
    }

    #[test]
    fn clients_share_the_oracle() {
        let cluster = TestCluster::new();
        let other = cluster.client(Config::default());
        let first = cluster.oracle().next();
        assert!(other.oracle().next() > first);
    }

    #[test]
    fn committed_rows_are_stable() {
        let cluster = TestCluster::new();
        cluster.seed("t", "a", "f", "q", "1");
        assert!(cluster.is_stable("t", "a"));
        assert!(cluster.is_stable("t", "never-written"));
        assert!(cluster.lock("t", "never-written").is_none());
    }
}
