//! Transaction configuration.

use std::time::Duration;

/// Configuration for a [`crate::TransactionManager`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Lease given to every lock a transaction writes.
    ///
    /// Once a lock outlives its lease any client may resolve it.
    pub lock_timeout: Duration,

    /// How many times a read waits for a live lock before failing with
    /// lock contention.
    pub read_retry_attempts: u32,

    /// Pause between two read attempts on a live lock.
    pub read_retry_backoff: Duration,

    /// Extra attempts for a secondary row's cleanup write after an I/O error.
    pub cleanup_retry_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            read_retry_attempts: 3,
            read_retry_backoff: Duration::from_millis(10),
            cleanup_retry_attempts: 1,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the lock lease.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets how many times a read retries on a live lock.
    #[must_use]
    pub const fn read_retry_attempts(mut self, attempts: u32) -> Self {
        self.read_retry_attempts = attempts;
        self
    }

    /// Sets the pause between read retries.
    #[must_use]
    pub const fn read_retry_backoff(mut self, backoff: Duration) -> Self {
        self.read_retry_backoff = backoff;
        self
    }

    /// Sets the extra attempts for secondary cleanup writes.
    #[must_use]
    pub const fn cleanup_retry_attempts(mut self, attempts: u32) -> Self {
        self.cleanup_retry_attempts = attempts;
        self
    }

    /// Returns the lease in milliseconds.
    #[must_use]
    pub fn lock_timeout_millis(&self) -> u64 {
        u64::try_from(self.lock_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}
