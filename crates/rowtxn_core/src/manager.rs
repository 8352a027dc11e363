//! Transaction manager and timestamp oracle.

use crate::config::Config;
use crate::error::{TxnError, TxnResult};
use crate::recovery::RecoveryResolver;
use crate::stats::TxnStats;
use crate::transaction::Transaction;
use crate::types::{RowRef, Timestamp};
use rowtxn_storage::KvStore;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Source of transaction ids and commit timestamps.
///
/// Timestamps follow the wall clock in milliseconds but never repeat or go
/// backwards: when the clock stalls the oracle counts up from its last
/// value. Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct TimestampOracle {
    last: Arc<AtomicU64>,
}

impl TimestampOracle {
    /// Creates a new oracle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the wall clock in milliseconds since the Unix epoch.
    #[must_use]
    pub fn wall_clock_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }

    /// Returns a timestamp greater than every one returned before.
    pub fn next(&self) -> Timestamp {
        self.next_after(Timestamp::ZERO)
    }

    /// Returns a timestamp greater than `floor` and than every one returned
    /// before.
    pub fn next_after(&self, floor: Timestamp) -> Timestamp {
        let now = Self::wall_clock_millis();
        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let candidate = now
                .max(last.saturating_add(1))
                .max(floor.as_u64().saturating_add(1));
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return Timestamp::new(candidate),
                Err(actual) => last = actual,
            }
        }
    }

    /// Returns the last timestamp handed out.
    #[must_use]
    pub fn current(&self) -> Timestamp {
        Timestamp::new(self.last.load(Ordering::SeqCst))
    }
}

/// State shared by a manager and every transaction it begins.
pub(crate) struct TxnContext {
    pub(crate) store: Arc<dyn KvStore>,
    pub(crate) config: Config,
    pub(crate) oracle: TimestampOracle,
    pub(crate) stats: TxnStats,
}

impl TxnContext {
    pub(crate) fn resolver(&self) -> RecoveryResolver<'_> {
        RecoveryResolver::new(self.store.as_ref(), &self.stats)
    }

    /// Builds a write conflict and counts it.
    pub(crate) fn conflict(&self, row: &RowRef, reason: &str) -> TxnError {
        self.stats.record_conflict();
        debug!(%row, reason, "write conflict");
        TxnError::write_conflict(row.clone(), reason)
    }
}

/// Begins transactions against one store.
///
/// A manager holds no locks and no per-transaction state: every transaction
/// it creates coordinates with others only through lock records in the
/// store. Managers are cheap to share behind an `Arc`, and several managers
/// (one per client) may run against the same store.
///
/// # Example
///
/// ```rust
/// use rowtxn_core::{Config, Put, TransactionManager};
/// use rowtxn_storage::{ColumnSelection, InMemoryStore};
/// use std::sync::Arc;
///
/// let manager = TransactionManager::new(Arc::new(InMemoryStore::new()), Config::default());
///
/// let mut txn = manager.begin();
/// txn.put("accounts", Put::new("alice").add("data", "balance", "100")).unwrap();
/// txn.put("accounts", Put::new("bob").add("data", "balance", "50")).unwrap();
/// txn.commit().unwrap();
///
/// let mut txn = manager.begin();
/// let row = txn.get("accounts", b"alice", &ColumnSelection::all()).unwrap();
/// assert_eq!(row.value(b"data", b"balance").unwrap(), "100");
/// txn.commit().unwrap();
/// ```
pub struct TransactionManager {
    ctx: Arc<TxnContext>,
}

impl TransactionManager {
    /// Creates a manager with its own timestamp oracle.
    pub fn new(store: Arc<dyn KvStore>, config: Config) -> Self {
        Self::with_oracle(store, config, TimestampOracle::new())
    }

    /// Creates a manager that draws timestamps from a shared oracle.
    pub fn with_oracle(store: Arc<dyn KvStore>, config: Config, oracle: TimestampOracle) -> Self {
        Self {
            ctx: Arc::new(TxnContext {
                store,
                config,
                oracle,
                stats: TxnStats::new(),
            }),
        }
    }

    /// Begins a new transaction.
    pub fn begin(&self) -> Transaction {
        self.ctx.stats.record_begin();
        Transaction::new(Arc::clone(&self.ctx))
    }

    /// Runs `body` in a transaction and commits it, retrying the whole
    /// transaction up to `attempts` times on conflict or contention.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted, or the first error
    /// that is not retryable.
    pub fn run<T, F>(&self, attempts: u32, mut body: F) -> TxnResult<T>
    where
        F: FnMut(&mut Transaction) -> TxnResult<T>,
    {
        let attempts = attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut txn = self.begin();
            let result = body(&mut txn).and_then(|value| txn.commit().map(|()| value));
            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if let Err(rollback) = txn.rollback() {
                        warn!(
                            state = ?txn.state(),
                            error = %rollback,
                            "could not roll back failed transaction"
                        );
                    }
                    if !e.is_retryable() || attempt >= attempts {
                        return Err(e);
                    }
                    debug!(attempt, error = %e, "retrying transaction");
                }
            }
        }
    }

    /// Returns a resolver for stale locks in this manager's store.
    pub fn resolver(&self) -> RecoveryResolver<'_> {
        self.ctx.resolver()
    }

    /// Returns the statistics for transactions begun by this manager.
    pub fn stats(&self) -> &TxnStats {
        &self.ctx.stats
    }

    /// Returns the timestamp oracle.
    pub fn oracle(&self) -> &TimestampOracle {
        &self.ctx.oracle
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.ctx.store
    }
}

impl fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionManager")
            .field("config", &self.ctx.config)
            .field("oracle", &self.ctx.oracle.current())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn oracle_is_strictly_increasing() {
        let oracle = TimestampOracle::new();
        let mut last = oracle.next();
        for _ in 0..1000 {
            let next = oracle.next();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn oracle_respects_floor() {
        let oracle = TimestampOracle::new();
        let far = Timestamp::new(u64::MAX / 2);
        assert!(oracle.next_after(far) > far);
        assert!(oracle.next() > far);
    }

    #[test]
    fn oracle_follows_wall_clock() {
        let oracle = TimestampOracle::new();
        let before = TimestampOracle::wall_clock_millis();
        assert!(oracle.next().as_u64() >= before);
    }

    #[test]
    fn oracle_clones_share_the_counter() {
        let oracle = TimestampOracle::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let oracle = oracle.clone();
                thread::spawn(move || (0..250).map(|_| oracle.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for ts in h.join().unwrap() {
                assert!(seen.insert(ts), "duplicate timestamp {ts}");
            }
        }
        assert_eq!(seen.len(), 1000);
    }
}
