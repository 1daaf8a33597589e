//! Row-mutation extraction and group filtering
//!
//! Normalizes a decoded (and, if needed, reassembled) payload into
//! `(table, operation, tuple bytes)`. The shape tag at the front of every
//! mutation image decides the rendering: fresh-slot writes become INSERT,
//! writes into relocated or tombstoned slots become REPLACE, deletes take
//! their tuple bytes from the before image.
//!
//! Group filtering happens here and nowhere else: a record whose group tag
//! differs from the run's target group yields no mutation, but the caller
//! still tracks its transaction so the eventual commit or abort closes out
//! cleanly.

use super::overflow::CompletedOverflow;
use crate::wal::{
    ByteCursor, GroupId, LogAddress, LogError, LogResult, MutationSubHeader, RowShape, TableId,
    MUTATION_SUBHEADER_SIZE,
};

/// The replayable operation a mutation maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOperation {
    /// Fresh-slot insert
    Insert,
    /// Idempotent upsert into a previously occupied slot
    Replace,
    /// Row deletion targeted by primary key
    Delete,
}

/// A normalized, in-scope row mutation ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMutation {
    /// Owning table
    pub table_id: TableId,
    /// Operation to render
    pub operation: RowOperation,
    /// Raw tuple bytes in the table's disk format
    pub tuple: Vec<u8>,
}

/// Extracts row mutations for one target group.
#[derive(Debug, Clone)]
pub struct RowMutationExtractor {
    group_id: GroupId,
}

impl RowMutationExtractor {
    /// Create an extractor filtering for `group_id`.
    pub fn new(group_id: GroupId) -> Self {
        Self { group_id }
    }

    /// Extract from an undo/redo record's materialized images.
    ///
    /// `Ok(None)` means the record belongs to another group. For deletes the
    /// before image carries the valid tuple bytes; the after image holds the
    /// sub-header only.
    pub fn extract(
        &self,
        at: LogAddress,
        undo: &[u8],
        redo: &[u8],
    ) -> LogResult<Option<RowMutation>> {
        // The after image leads for inserts and replaces; a delete may carry
        // an empty after image entirely, so fall back to the before image.
        let lead = if redo.len() >= MUTATION_SUBHEADER_SIZE {
            redo
        } else if undo.len() >= MUTATION_SUBHEADER_SIZE {
            undo
        } else {
            return Err(LogError::truncated_at(
                at,
                format!(
                    "mutation images too short for a sub-header: undo {} bytes, redo {} bytes",
                    undo.len(),
                    redo.len()
                ),
            ));
        };

        let header = MutationSubHeader::from_wire(lead, at)?;
        if header.group_id != self.group_id {
            return Ok(None);
        }

        let mutation = match header.shape {
            RowShape::InsertFresh => RowMutation {
                table_id: header.table_id,
                operation: RowOperation::Insert,
                tuple: image_tuple(redo, at, "after")?,
            },
            RowShape::InsertRelocated => RowMutation {
                table_id: header.table_id,
                operation: RowOperation::Replace,
                tuple: image_tuple(redo, at, "after")?,
            },
            RowShape::Delete => RowMutation {
                table_id: header.table_id,
                operation: RowOperation::Delete,
                tuple: image_tuple(undo, at, "before")?,
            },
        };
        Ok(Some(mutation))
    }

    /// Extract from a completed overflow value.
    ///
    /// The slot state of an overflow-backed row is not carried in the
    /// fragments, so completions replay as REPLACE.
    pub fn extract_overflow(&self, completed: CompletedOverflow) -> Option<RowMutation> {
        if completed.group_id != self.group_id {
            return None;
        }
        Some(RowMutation {
            table_id: completed.table_id,
            operation: RowOperation::Replace,
            tuple: completed.tuple,
        })
    }

    /// Extract from an overflow-delete-whole payload: table id, group id,
    /// then the full before-image tuple.
    pub fn extract_overflow_delete(
        &self,
        at: LogAddress,
        payload: &[u8],
    ) -> LogResult<Option<RowMutation>> {
        if payload.len() < 8 {
            return Err(LogError::truncated_at(
                at,
                format!(
                    "overflow delete payload of {} bytes cannot hold its sub-header",
                    payload.len()
                ),
            ));
        }
        let mut cursor = ByteCursor::new(payload);
        let table_id = cursor.read_u32("overflow delete table id")?;
        let group_id = cursor.read_u32("overflow delete group id")?;
        if group_id != self.group_id {
            return Ok(None);
        }
        Ok(Some(RowMutation {
            table_id,
            operation: RowOperation::Delete,
            tuple: cursor.rest().to_vec(),
        }))
    }
}

fn image_tuple(image: &[u8], at: LogAddress, which: &str) -> LogResult<Vec<u8>> {
    if image.len() < MUTATION_SUBHEADER_SIZE {
        return Err(LogError::truncated_at(
            at,
            format!(
                "{} image of {} bytes cannot hold its sub-header",
                which,
                image.len()
            ),
        ));
    }
    Ok(image[MUTATION_SUBHEADER_SIZE..].to_vec())
}
