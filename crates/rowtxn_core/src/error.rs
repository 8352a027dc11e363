//! Error types for rowtxn core.

use crate::types::{RowRef, TransactionId};
use thiserror::Error;

/// Result type for transaction operations.
pub type TxnResult<T> = Result<T, TxnError>;

/// Errors that can occur while running a transaction.
#[derive(Debug, Error)]
pub enum TxnError {
    /// The store failed or could not be reached.
    ///
    /// When raised by the commit point, the outcome of the transaction is
    /// unknown until its primary lock is resolved.
    #[error("storage error: {0}")]
    Storage(#[from] rowtxn_storage::StorageError),

    /// A lock record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] rowtxn_codec::CodecError),

    /// Another transaction changed a row this transaction depends on.
    #[error("write conflict on {row}: {reason}")]
    WriteConflict {
        /// The row that conflicted.
        row: RowRef,
        /// What was observed.
        reason: String,
    },

    /// A row is locked by a live transaction whose lease has not expired.
    #[error("{row} is locked by {transaction_id}")]
    LockContention {
        /// The locked row.
        row: RowRef,
        /// The transaction holding the lock.
        transaction_id: TransactionId,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl TxnError {
    /// Creates a write conflict error.
    pub fn write_conflict(row: RowRef, reason: impl Into<String>) -> Self {
        Self::WriteConflict {
            row,
            reason: reason.into(),
        }
    }

    /// Creates a lock contention error.
    pub fn lock_contention(row: RowRef, transaction_id: TransactionId) -> Self {
        Self::LockContention {
            row,
            transaction_id,
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if retrying the whole transaction may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WriteConflict { .. } | Self::LockContention { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_are_retryable() {
        let row = RowRef::new("t", "r");
        assert!(TxnError::write_conflict(row.clone(), "changed").is_retryable());
        assert!(TxnError::lock_contention(row, TransactionId::new(3)).is_retryable());
        assert!(!TxnError::invalid_operation("closed").is_retryable());
    }

    #[test]
    fn display_names_the_row() {
        let err = TxnError::write_conflict(RowRef::new("users", "alice"), "lost race");
        assert_eq!(err.to_string(), "write conflict on users/alice: lost race");
    }
}
