//! Transaction statement buffer
//!
//! Guarantees atomic, ordered replay per transaction. Rendered statements
//! accumulate in log order as they are decoded and are released exactly once,
//! only when that transaction's commit record is seen; an abort drops them
//! without executing anything.
//!
//! Single-writer, single-reader: the driving loop processes one record at a
//! time, so entries for the same transaction id are never touched
//! concurrently and no locking is needed.

use std::collections::HashMap;

use crate::wal::TransactionId;

/// In-memory, transaction-keyed queue of rendered statements.
#[derive(Debug, Default)]
pub struct TransactionBuffer {
    pending: HashMap<TransactionId, Vec<String>>,
}

impl TransactionBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a statement to a transaction, creating its entry if absent.
    pub fn append(&mut self, transaction_id: TransactionId, statement: String) {
        self.pending
            .entry(transaction_id)
            .or_default()
            .push(statement);
    }

    /// Release a committed transaction's statements, in append order.
    ///
    /// Returns `None` when the transaction touched no in-scope rows; that is
    /// a no-op commit, not an error. The entry is removed either way, so
    /// statements are handed out at most once.
    pub fn take_committed(&mut self, transaction_id: TransactionId) -> Option<Vec<String>> {
        self.pending.remove(&transaction_id)
    }

    /// Drop an aborted transaction's statements without executing anything.
    pub fn discard(&mut self, transaction_id: TransactionId) -> bool {
        self.pending.remove(&transaction_id).is_some()
    }

    /// Number of statements buffered for a transaction.
    pub fn statement_count(&self, transaction_id: TransactionId) -> usize {
        self.pending.get(&transaction_id).map_or(0, Vec::len)
    }

    /// Number of transactions with buffered statements.
    pub fn pending_transactions(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let mut buffer = TransactionBuffer::new();
        buffer.append(1, "INSERT INTO t VALUES (1)".to_string());
        buffer.append(1, "DELETE FROM t WHERE id = 2".to_string());
        buffer.append(1, "REPLACE INTO t VALUES (3)".to_string());

        let statements = buffer.take_committed(1).unwrap();
        assert_eq!(statements.len(), 3);
        assert!(statements[0].starts_with("INSERT"));
        assert!(statements[1].starts_with("DELETE"));
        assert!(statements[2].starts_with("REPLACE"));
    }

    #[test]
    fn test_take_removes_entry() {
        let mut buffer = TransactionBuffer::new();
        buffer.append(1, "INSERT".to_string());

        assert!(buffer.take_committed(1).is_some());
        // Statements are handed out at most once.
        assert!(buffer.take_committed(1).is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_commit_of_untracked_transaction_is_noop() {
        let mut buffer = TransactionBuffer::new();
        assert!(buffer.take_committed(42).is_none());
    }

    #[test]
    fn test_discard_drops_without_release() {
        let mut buffer = TransactionBuffer::new();
        buffer.append(1, "INSERT".to_string());

        assert!(buffer.discard(1));
        assert!(buffer.take_committed(1).is_none());
        assert!(!buffer.discard(1));
    }

    #[test]
    fn test_transactions_kept_apart() {
        let mut buffer = TransactionBuffer::new();
        buffer.append(1, "a".to_string());
        buffer.append(2, "b".to_string());
        buffer.append(1, "c".to_string());

        assert_eq!(buffer.pending_transactions(), 2);
        assert_eq!(buffer.statement_count(1), 2);
        assert_eq!(buffer.statement_count(2), 1);

        assert_eq!(buffer.take_committed(2).unwrap(), vec!["b".to_string()]);
        assert_eq!(buffer.statement_count(1), 2);
    }
}
