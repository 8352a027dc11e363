//! Stress tests for rowtxn.
//!
//! These workloads run many read-modify-write transactions against shared
//! counters, sequentially or from several threads, and report how many
//! committed.

use bytes::Bytes;
use rand::Rng;
use rowtxn_core::{Put, Transaction, TransactionManager, TxnError, TxnResult};
use rowtxn_storage::ColumnSelection;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Family of a counter cell.
pub const COUNTER_FAMILY: &str = "counter";
/// Qualifier of a counter cell.
pub const COUNTER_QUALIFIER: &str = "value";

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total transactions attempted.
    pub total_ops: usize,
    /// Transactions that committed.
    pub successful_ops: usize,
    /// Transactions that gave up.
    pub failed_ops: usize,
    /// Sum of every committed increment.
    pub expected_total: u64,
    /// Commits that did not observe the previous committed value.
    pub lost_updates: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, expected_total: u64, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            expected_total,
            lost_updates: 0,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total transactions: {}", self.total_ops);
        println!("Committed: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Expected total: {}", self.expected_total);
        println!("Lost updates: {}", self.lost_updates);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} txn/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Transactions per thread.
    pub operations: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Number of distinct counter rows.
    pub counters: usize,
    /// Largest random increment; `1` always adds one.
    pub max_increment: u64,
    /// Attempts per transaction before it is counted as failed.
    pub retry_attempts: u32,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 1_000,
            threads: 4,
            counters: 1,
            max_increment: 1,
            retry_attempts: 100,
        }
    }
}

/// Returns the row key of counter `index`.
pub fn counter_row(index: usize) -> Bytes {
    Bytes::from(format!("counter-{index:04}"))
}

/// Reads a counter inside `txn`. A missing counter reads as zero.
///
/// # Errors
///
/// Returns any read error, or [`TxnError::InvalidOperation`] if the cell
/// does not hold a counter.
pub fn read_counter(txn: &mut Transaction, table: &str, row: &[u8]) -> TxnResult<u64> {
    let selection = ColumnSelection::all().add_column(COUNTER_FAMILY, COUNTER_QUALIFIER);
    let snapshot = txn.get(table, row, &selection)?;
    match snapshot.value(COUNTER_FAMILY.as_bytes(), COUNTER_QUALIFIER.as_bytes()) {
        None => Ok(0),
        Some(value) => std::str::from_utf8(value)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| TxnError::invalid_operation("counter cell is not a number")),
    }
}

/// Adds `amount` to a counter inside `txn` and returns the new value.
///
/// # Errors
///
/// Same as [`read_counter`], plus any buffering error.
pub fn increment(txn: &mut Transaction, table: &str, row: &[u8], amount: u64) -> TxnResult<u64> {
    let value = read_counter(txn, table, row)? + amount;
    txn.put(
        table,
        Put::new(Bytes::copy_from_slice(row)).add(
            COUNTER_FAMILY,
            COUNTER_QUALIFIER,
            value.to_string(),
        ),
    )?;
    Ok(value)
}

/// Reads a counter in its own transaction.
///
/// # Errors
///
/// Same as [`read_counter`].
pub fn counter_value(manager: &TransactionManager, table: &str, row: &[u8]) -> TxnResult<u64> {
    manager.run(1, |txn| read_counter(txn, table, row))
}

fn pick<R: Rng>(rng: &mut R, config: &StressConfig) -> (usize, u64) {
    let index = rng.gen_range(0..config.counters.max(1));
    let amount = rng.gen_range(1..=config.max_increment.max(1));
    (index, amount)
}

/// Run sequential increments from one client.
///
/// Counters are expected to start at zero. Every commit must see the value
/// left by the previous one; a commit that does not is counted in
/// [`StressTestResult::lost_updates`].
pub fn stress_sequential_increments(
    manager: &TransactionManager,
    table: &str,
    config: &StressConfig,
) -> StressTestResult {
    let mut rng = rand::thread_rng();
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;
    let mut lost_updates = 0usize;
    let mut total = 0u64;
    let mut counters = vec![0u64; config.counters.max(1)];

    for step in 0..config.operations {
        let (index, amount) = pick(&mut rng, config);
        let row = counter_row(index);
        match manager.run(config.retry_attempts, |txn| increment(txn, table, &row, amount)) {
            Ok(value) => {
                successful += 1;
                total += amount;
                counters[index] += amount;
                if value != counters[index] {
                    tracing::error!(
                        step,
                        counter = index,
                        expected = counters[index],
                        committed = value,
                        "increment did not observe the previous commit"
                    );
                    lost_updates += 1;
                    counters[index] = value;
                }
            }
            Err(_) => failed += 1,
        }
    }

    let mut result = StressTestResult::new(successful, failed, total, start.elapsed());
    result.lost_updates = lost_updates;
    result
}

/// Run increments from `config.threads` threads sharing one client.
pub fn stress_concurrent_increments(
    manager: &TransactionManager,
    table: &str,
    config: &StressConfig,
) -> StressTestResult {
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let total = AtomicU64::new(0);
    let start = Instant::now();

    thread::scope(|scope| {
        for _ in 0..config.threads {
            scope.spawn(|| {
                let mut rng = rand::thread_rng();
                for _ in 0..config.operations {
                    let (index, amount) = pick(&mut rng, config);
                    let row = counter_row(index);
                    match manager
                        .run(config.retry_attempts, |txn| increment(txn, table, &row, amount))
                    {
                        Ok(_) => {
                            successful.fetch_add(1, Ordering::Relaxed);
                            total.fetch_add(amount, Ordering::Relaxed);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "increment gave up");
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            });
        }
    });

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        total.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Sums every counter row of a stress run.
///
/// # Errors
///
/// Same as [`read_counter`].
pub fn sum_counters(
    manager: &TransactionManager,
    table: &str,
    config: &StressConfig,
) -> TxnResult<u64> {
    (0..config.counters.max(1))
        .map(|i| counter_value(manager, table, &counter_row(i)))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestCluster;

    #[test]
    fn increment_reads_its_own_write() {
        let cluster = TestCluster::new();
        let mut txn = cluster.begin();
        assert_eq!(increment(&mut txn, "t", b"c", 2).unwrap(), 2);
        assert_eq!(increment(&mut txn, "t", b"c", 3).unwrap(), 5);
        txn.commit().unwrap();
        assert_eq!(counter_value(&cluster, "t", b"c").unwrap(), 5);
    }

    #[test]
    fn garbage_counter_is_rejected() {
        let cluster = TestCluster::new();
        cluster.seed("t", "c", COUNTER_FAMILY, COUNTER_QUALIFIER, "twelve");
        let mut txn = cluster.begin();
        assert!(read_counter(&mut txn, "t", b"c").is_err());
    }

    #[test]
    fn small_sequential_run() {
        let cluster = TestCluster::new();
        let config = StressConfig {
            operations: 20,
            counters: 3,
            max_increment: 4,
            ..StressConfig::default()
        };
        let result = stress_sequential_increments(&cluster, "t", &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.lost_updates, 0);
        assert_eq!(sum_counters(&cluster, "t", &config).unwrap(), result.expected_total);
    }

    #[test]
    fn sequential_run_reports_a_lost_update() {
        let cluster = TestCluster::new();
        // A counter that does not start at zero makes every commit disagree
        // with the running total until the total catches up.
        cluster.seed("t", "counter-0000", COUNTER_FAMILY, COUNTER_QUALIFIER, "7");
        let config = StressConfig {
            operations: 3,
            ..StressConfig::default()
        };
        let result = stress_sequential_increments(&cluster, "t", &config);
        assert_eq!(result.successful_ops, 3);
        assert_eq!(result.lost_updates, 1);
        assert_eq!(counter_value(&cluster, "t", b"counter-0000").unwrap(), 10);
    }
}
