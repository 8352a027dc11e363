//! Crash recovery testing for rowtxn.
//!
//! A client can die between any two of its store writes. This module wraps
//! a store so that writes start failing after a chosen number of them,
//! which leaves the rows exactly as a crashed client would: some locks
//! written, some not. Another client then reads the rows and must recover
//! them.
//!
//! ## Test Strategy
//!
//! 1. **Crash before the commit point** - every row is rolled back
//! 2. **Crash after the commit point** - every row is rolled forward
//! 3. **Crash after the secondaries** - only the primary is left, and it is
//!    rolled forward
//!
//! ## Usage
//!
//! ```rust
//! use rowtxn_testkit::crash::{CrashPoint, CrashRecoveryHarness};
//!
//! let result = CrashRecoveryHarness::new(3).run(CrashPoint::AfterCommitPoint);
//! assert!(result.passed, "{:?}", result.error);
//! ```

use parking_lot::Mutex;
use rowtxn_core::{Config, Put, TransactionManager};
use rowtxn_storage::{
    Cell, Column, ColumnSelection, KvStore, RowRange, RowScanner, RowSnapshot, StorageError,
    StorageResult,
};
use std::sync::Arc;
use std::time::Duration;

use crate::fixtures::TestCluster;

/// Points at which the committing client can crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// Every row is prewritten; the primary was never committed.
    BeforeCommitPoint,
    /// The primary is committed; no secondary was applied.
    AfterCommitPoint,
    /// Every secondary is applied; the primary is still committed.
    AfterSecondaries,
}

impl CrashPoint {
    /// Every crash point.
    pub const ALL: [CrashPoint; 3] = [
        CrashPoint::BeforeCommitPoint,
        CrashPoint::AfterCommitPoint,
        CrashPoint::AfterSecondaries,
    ];

    /// Number of store writes that succeed before the crash, for a
    /// transaction writing `rows` rows and reading nothing else.
    pub fn writes_before(self, rows: usize) -> usize {
        match self {
            CrashPoint::BeforeCommitPoint => rows,
            CrashPoint::AfterCommitPoint => rows + 1,
            CrashPoint::AfterSecondaries => rows * 2,
        }
    }

    /// Returns true if the transaction committed before the crash.
    pub fn committed(self) -> bool {
        !matches!(self, CrashPoint::BeforeCommitPoint)
    }
}

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// The crash point that was tested.
    pub point: CrashPoint,
    /// Rows expected to hold the transaction's value after recovery.
    pub expected_rows: usize,
    /// Rows that actually hold it.
    pub actual_rows: usize,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    /// Creates a passing result.
    pub fn pass(point: CrashPoint, rows: usize) -> Self {
        Self {
            passed: true,
            point,
            expected_rows: rows,
            actual_rows: rows,
            error: None,
        }
    }

    /// Creates a failing result.
    pub fn fail(point: CrashPoint, expected: usize, actual: usize, error: impl Into<String>) -> Self {
        Self {
            passed: false,
            point,
            expected_rows: expected,
            actual_rows: actual,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Default)]
struct CrashSchedule {
    writes: usize,
    crash_after: Option<usize>,
    crashed: bool,
}

/// A store wrapper that fails every write after a set number of writes.
///
/// Reads always reach the inner store. Once crashed, the store stays
/// crashed until [`reset`](Self::reset).
pub struct CrashableStore {
    inner: Arc<dyn KvStore>,
    schedule: Mutex<CrashSchedule>,
}

impl CrashableStore {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn KvStore>) -> Self {
        Self {
            inner,
            schedule: Mutex::new(CrashSchedule::default()),
        }
    }

    /// Lets `writes` more writes through, then crashes.
    pub fn crash_after(&self, writes: usize) {
        let mut schedule = self.schedule.lock();
        schedule.crash_after = Some(schedule.writes + writes);
    }

    /// Clears the crash and the schedule.
    pub fn reset(&self) {
        *self.schedule.lock() = CrashSchedule::default();
    }

    /// Returns whether the store has crashed.
    pub fn has_crashed(&self) -> bool {
        self.schedule.lock().crashed
    }

    /// Returns the number of writes that reached the inner store.
    pub fn writes(&self) -> usize {
        self.schedule.lock().writes
    }

    fn admit_write(&self) -> StorageResult<()> {
        let mut schedule = self.schedule.lock();
        if schedule.crashed || schedule.crash_after.is_some_and(|limit| schedule.writes >= limit) {
            schedule.crashed = true;
            return Err(StorageError::unavailable("simulated crash"));
        }
        schedule.writes += 1;
        Ok(())
    }
}

impl KvStore for CrashableStore {
    fn get(
        &self,
        table: &str,
        row: &[u8],
        selection: &ColumnSelection,
    ) -> StorageResult<RowSnapshot> {
        self.inner.get(table, row, selection)
    }

    fn scan<'a>(
        &'a self,
        table: &str,
        range: &RowRange,
        selection: &ColumnSelection,
    ) -> StorageResult<RowScanner<'a>> {
        self.inner.scan(table, range, selection)
    }

    fn check_and_mutate(
        &self,
        table: &str,
        row: &[u8],
        column: Column<'_>,
        expected: Option<&[u8]>,
        mutations: &[Cell],
    ) -> StorageResult<bool> {
        self.admit_write()?;
        self.inner
            .check_and_mutate(table, row, column, expected, mutations)
    }

    fn mutate(&self, table: &str, row: &[u8], mutations: &[Cell]) -> StorageResult<()> {
        self.admit_write()?;
        self.inner.mutate(table, row, mutations)
    }
}

/// Harness that crashes a multi-row transaction and checks that another
/// client recovers it.
pub struct CrashRecoveryHarness {
    rows: usize,
    table: String,
}

impl CrashRecoveryHarness {
    /// Creates a harness whose transaction writes `rows` rows (at least one).
    pub fn new(rows: usize) -> Self {
        Self {
            rows: rows.max(1),
            table: "crash".to_string(),
        }
    }

    fn row_key(index: usize) -> String {
        format!("row-{index:04}")
    }

    /// Crashes the writer at `point`, then reads every row from a recovery
    /// client.
    pub fn run(&self, point: CrashPoint) -> CrashRecoveryResult {
        let cluster = TestCluster::new();
        let crashable = Arc::new(CrashableStore::new(cluster.store.clone()));
        // Leases expire at once so the reader may recover right away.
        let writer = TransactionManager::new(
            crashable.clone(),
            Config::new().lock_timeout(Duration::ZERO).read_retry_attempts(0),
        );

        let mut txn = writer.begin();
        for i in 0..self.rows {
            if let Err(e) = txn.put(&self.table, Put::new(Self::row_key(i)).add("f", "q", "new")) {
                return CrashRecoveryResult::fail(point, 0, 0, format!("put failed: {e}"));
            }
        }
        crashable.crash_after(point.writes_before(self.rows));
        let outcome = txn.commit();
        if !crashable.has_crashed() {
            return CrashRecoveryResult::fail(point, 0, 0, "writer finished without crashing");
        }
        if point.committed() != outcome.is_ok() {
            return CrashRecoveryResult::fail(
                point,
                0,
                0,
                format!("unexpected commit outcome {outcome:?}"),
            );
        }

        let reader = cluster.recovery_client();
        let mut txn = reader.begin();
        let mut actual = 0;
        for i in 0..self.rows {
            match txn.get(&self.table, Self::row_key(i).as_bytes(), &ColumnSelection::all()) {
                Ok(row) if row.value(b"f", b"q").is_some() => actual += 1,
                Ok(_) => {}
                Err(e) => {
                    return CrashRecoveryResult::fail(point, 0, actual, format!("read failed: {e}"))
                }
            }
        }

        let expected = if point.committed() { self.rows } else { 0 };
        if actual != expected {
            return CrashRecoveryResult::fail(point, expected, actual, "recovered wrong outcome");
        }
        let unstable = (0..self.rows)
            .filter(|&i| !cluster.is_stable(&self.table, &Self::row_key(i)))
            .count();
        if unstable > 0 {
            return CrashRecoveryResult::fail(
                point,
                expected,
                actual,
                format!("{unstable} rows left locked"),
            );
        }
        CrashRecoveryResult::pass(point, expected)
    }

    /// Runs every crash point.
    pub fn run_all(&self) -> Vec<CrashRecoveryResult> {
        CrashPoint::ALL.iter().map(|&point| self.run(point)).collect()
    }
}
