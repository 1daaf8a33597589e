//! Overflow value reassembly
//!
//! A value too large for one page is logged as an overflow-start record
//! followed by redo fragments, all under the owning transaction. The first
//! fragment leads with a sub-header declaring the table, group, and total
//! tuple length; later fragments are raw chunk bytes. Fragments of different
//! transactions interleave freely, so accumulation is keyed by transaction
//! id.
//!
//! A transaction boundary arriving while collection is incomplete discards
//! the partial state. That is a normal outcome of group filtering, not an
//! error: a row belonging to another group can share an overflow's
//! transaction without ever completing within this run's scope.

use std::collections::HashMap;

use crate::wal::{
    GroupId, LogAddress, LogError, LogResult, OverflowSubHeader, TableId, TransactionId,
    OVERFLOW_SUBHEADER_SIZE,
};

/// A fully reassembled overflow tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedOverflow {
    /// Owning table
    pub table_id: TableId,
    /// Shard group of the row
    pub group_id: GroupId,
    /// Reassembled tuple bytes, exactly the declared total length
    pub tuple: Vec<u8>,
}

/// Per-transaction accumulation state.
#[derive(Debug)]
struct OverflowAccumulator {
    table_id: TableId,
    group_id: GroupId,
    total_length: usize,
    buffer: Vec<u8>,
    header_seen: bool,
}

/// Reassembles same-transaction redo fragments into logical tuples.
#[derive(Debug, Default)]
pub struct OverflowReassembler {
    active: HashMap<TransactionId, OverflowAccumulator>,
}

impl OverflowReassembler {
    /// Create an empty reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin collecting for a transaction (overflow-start record seen).
    ///
    /// A second start for the same transaction replaces the previous partial
    /// value; the source never interleaves two overflow values in one
    /// transaction.
    pub fn start(&mut self, transaction_id: TransactionId) {
        self.active.insert(
            transaction_id,
            OverflowAccumulator {
                table_id: 0,
                group_id: 0,
                total_length: 0,
                buffer: Vec::new(),
                header_seen: false,
            },
        );
    }

    /// Whether a transaction is currently collecting.
    pub fn is_collecting(&self, transaction_id: TransactionId) -> bool {
        self.active.contains_key(&transaction_id)
    }

    /// Number of transactions currently collecting.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Feed one redo fragment.
    ///
    /// Returns `Ok(None)` while the value is incomplete, or when the
    /// transaction is not collecting at all (a redo record outside any
    /// overflow sequence is skipped by the caller). Returns the completed
    /// tuple once the collected bytes reach the declared total length. A
    /// fragment that would overflow the declared length is fatal corruption.
    pub fn feed(
        &mut self,
        transaction_id: TransactionId,
        fragment: &[u8],
        at: LogAddress,
    ) -> LogResult<Option<CompletedOverflow>> {
        let acc = match self.active.get_mut(&transaction_id) {
            Some(acc) => acc,
            None => return Ok(None),
        };

        let chunk: &[u8] = if acc.header_seen {
            fragment
        } else {
            if fragment.len() < OVERFLOW_SUBHEADER_SIZE {
                return Err(LogError::truncated_at(
                    at,
                    format!(
                        "first overflow fragment of {} bytes cannot hold its sub-header",
                        fragment.len()
                    ),
                ));
            }
            let header = OverflowSubHeader::from_wire(fragment)?;
            acc.table_id = header.table_id;
            acc.group_id = header.group_id;
            acc.total_length = header.total_length as usize;
            acc.buffer = Vec::with_capacity(acc.total_length);
            acc.header_seen = true;
            &fragment[OVERFLOW_SUBHEADER_SIZE..]
        };

        if acc.buffer.len() + chunk.len() > acc.total_length {
            let err = LogError::corruption_at(
                at,
                format!(
                    "overflow fragment overruns declared length: {} collected, {} incoming, {} declared",
                    acc.buffer.len(),
                    chunk.len(),
                    acc.total_length
                ),
            );
            self.active.remove(&transaction_id);
            return Err(err);
        }
        acc.buffer.extend_from_slice(chunk);

        if acc.buffer.len() == acc.total_length {
            let table_id = acc.table_id;
            let group_id = acc.group_id;
            let tuple = std::mem::take(&mut acc.buffer);
            self.active.remove(&transaction_id);
            return Ok(Some(CompletedOverflow {
                table_id,
                group_id,
                tuple,
            }));
        }
        Ok(None)
    }

    /// Discard a transaction's partial state, if any.
    ///
    /// Called on commit and abort so an uncompleted value never leaks.
    pub fn discard(&mut self, transaction_id: TransactionId) -> bool {
        self.active.remove(&transaction_id).is_some()
    }
}
