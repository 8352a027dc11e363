//! Transaction state.

use crate::lock::RowLock;
use crate::mutation::Mutation;
use bytes::Bytes;

/// State of a transaction.
///
/// ```text
/// Open ─▶ Prewriting ─▶ Prewritten ─▶ Committing ─▶ Committed
///  │          │              │
///  │          └──▶ Aborted ◀─┤ (commit point lost)
///  └──────▶ RolledBack ◀─────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Reads and writes are buffered; nothing is locked.
    Open,
    /// Locks are being written.
    Prewriting,
    /// Every written row is locked; the transaction may commit.
    Prewritten,
    /// The commit point is being written. A transaction left here after an
    /// error has an unknown outcome until its primary lock is resolved.
    Committing,
    /// The commit point was reached.
    Committed,
    /// A conflict or error ended the transaction.
    Aborted,
    /// The transaction was rolled back by its owner.
    RolledBack,
}

impl TransactionState {
    /// Returns true once the transaction can no longer change.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted | Self::RolledBack)
    }
}

/// What a transaction knows about one row.
#[derive(Debug, Clone)]
pub(crate) struct RowState {
    /// Lock column bytes when the row was first observed (`None` if absent).
    pub(crate) observed: Option<Bytes>,
    /// Decoded `observed`; always stable.
    pub(crate) observed_lock: RowLock,
    /// Buffered writes, if the transaction writes this row.
    pub(crate) mutation: Option<Mutation>,
    /// Lock written at prewrite and its bytes.
    pub(crate) held: Option<(Bytes, RowLock)>,
}

impl RowState {
    pub(crate) fn observed(observed: Option<Bytes>, observed_lock: RowLock) -> Self {
        Self {
            observed,
            observed_lock,
            mutation: None,
            held: None,
        }
    }

    pub(crate) fn buffer(&mut self, mutation: Mutation) {
        match &mut self.mutation {
            Some(existing) => existing.merge(mutation),
            None => self.mutation = Some(mutation),
        }
    }

    pub(crate) fn is_written(&self) -> bool {
        self.mutation.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::Put;

    #[test]
    fn terminal_states() {
        assert!(TransactionState::Committed.is_terminal());
        assert!(TransactionState::Aborted.is_terminal());
        assert!(TransactionState::RolledBack.is_terminal());
        assert!(!TransactionState::Committing.is_terminal());
        assert!(!TransactionState::Open.is_terminal());
    }

    #[test]
    fn buffering_merges_into_one_mutation() {
        let mut state = RowState::observed(None, RowLock::stable_default());
        assert!(!state.is_written());
        state.buffer(Put::new("r").add("f", "a", "1").into());
        state.buffer(Put::new("r").add("f", "b", "2").into());
        assert_eq!(state.mutation.as_ref().unwrap().len(), 2);
    }
}
