//! Shared test tooling: the write side of the wire format plus in-memory
//! collaborator fakes.
//!
//! `LogStreamBuilder` builds page streams the way the source node's writer
//! does: aligned records with correct back/forward/previous-transaction
//! links, optional compression, diff-encoded after images, and checksummed
//! pages. Snapshots append the end-of-log sentinel to a copy, so a test can
//! freeze the log, keep appending, and freeze again to model a growing
//! source.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use shardpump::codec::{self, LengthField};
use shardpump::replication::{
    DestinationExecutor, ExecutionError, PageBatch, PageFetchError, PageSource, StatementRenderer,
    TupleDecodeError, TupleDecoder,
};
use shardpump::wal::{
    align_up, GroupId, LogAddress, LogPage, MigratorId, MutationSubHeader, OverflowSubHeader,
    RebalanceMarker, RecordHeader, RecordKind, RowShape, TableId, TransactionId, PAGE_BODY_SIZE,
};

/// A frozen view of the log: checksummed wire pages plus the end address.
#[derive(Debug, Clone)]
pub struct LogSnapshot {
    pub pages: Vec<Vec<u8>>,
    pub end: LogAddress,
}

/// Builds a log stream record by record, maintaining the link invariants
/// the reader validates.
#[derive(Debug, Clone, Default)]
pub struct LogStreamBuilder {
    stream: Vec<u8>,
    last_record_pos: Option<usize>,
    last_tx_pos: HashMap<TransactionId, usize>,
}

impl LogStreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn addr(pos: usize) -> LogAddress {
        LogAddress::new((pos / PAGE_BODY_SIZE) as u64, (pos % PAGE_BODY_SIZE) as u32)
    }

    fn pad_to_alignment(&mut self) {
        self.stream.resize(align_up(self.stream.len()), 0);
    }

    /// Append a record with the given payload chunks; each chunk is one
    /// structured read unit and gets alignment padding, exactly mirroring
    /// the reader.
    pub fn append_record(
        &mut self,
        kind: RecordKind,
        txn: TransactionId,
        chunks: &[Vec<u8>],
    ) -> LogAddress {
        self.append_record_with_forward(kind, txn, chunks, None)
    }

    /// Append a record, optionally overriding the forward link to fabricate
    /// a corrupted header.
    pub fn append_record_with_forward(
        &mut self,
        kind: RecordKind,
        txn: TransactionId,
        chunks: &[Vec<u8>],
        forward_override: Option<LogAddress>,
    ) -> LogAddress {
        let at_pos = self.stream.len();
        debug_assert_eq!(at_pos, align_up(at_pos));

        let payload_size: usize = chunks.iter().map(|c| align_up(c.len())).sum();
        let forward_pos = at_pos + align_up(shardpump::wal::HEADER_WIRE_SIZE) + payload_size;
        let forward = match forward_override {
            Some(addr) => addr,
            None if kind == RecordKind::EndOfLog => LogAddress::NULL,
            None => Self::addr(forward_pos),
        };

        let header = RecordHeader {
            kind,
            transaction_id: txn,
            previous_tx_address: self
                .last_tx_pos
                .get(&txn)
                .map(|&p| Self::addr(p))
                .unwrap_or(LogAddress::NULL),
            backward_address: self
                .last_record_pos
                .map(Self::addr)
                .unwrap_or(LogAddress::NULL),
            forward_address: forward,
        };

        self.stream.extend_from_slice(&header.to_wire());
        self.pad_to_alignment();
        for chunk in chunks {
            self.stream.extend_from_slice(chunk);
            self.pad_to_alignment();
        }
        assert_eq!(self.stream.len(), forward_pos);

        self.last_record_pos = Some(at_pos);
        self.last_tx_pos.insert(txn, at_pos);
        Self::addr(at_pos)
    }

    fn span_chunk(image: &[u8], compress: bool) -> (u32, Vec<u8>) {
        if compress {
            let stored = codec::compress_payload(image).unwrap();
            let field = LengthField {
                stored_length: stored.len() as u32,
                compressed: true,
            };
            (field.to_wire().unwrap(), stored)
        } else {
            (image.len() as u32, image.to_vec())
        }
    }

    fn mutation_image(
        shape: RowShape,
        table_id: TableId,
        group_id: GroupId,
        tuple: &[u8],
    ) -> Vec<u8> {
        let mut image = MutationSubHeader {
            shape,
            table_id,
            group_id,
        }
        .to_wire();
        image.extend_from_slice(tuple);
        image
    }

    /// Append an undo/redo row mutation.
    ///
    /// `before: None` writes an empty before image (fresh inserts); deletes
    /// pass the victim tuple as `before` and an empty `after`.
    #[allow(clippy::too_many_arguments)]
    pub fn undo_redo(
        &mut self,
        txn: TransactionId,
        shape: RowShape,
        table_id: TableId,
        group_id: GroupId,
        before: Option<&[u8]>,
        after: &[u8],
        compress_after: bool,
    ) -> LogAddress {
        let undo_image =
            before.map_or_else(Vec::new, |b| Self::mutation_image(shape, table_id, group_id, b));
        let redo_image = Self::mutation_image(shape, table_id, group_id, after);

        let (undo_raw, undo_stored) = Self::span_chunk(&undo_image, false);
        let (redo_raw, redo_stored) = Self::span_chunk(&redo_image, compress_after);

        let mut length_pair = Vec::with_capacity(8);
        length_pair.extend_from_slice(&undo_raw.to_le_bytes());
        length_pair.extend_from_slice(&redo_raw.to_le_bytes());

        self.append_record(
            RecordKind::UndoRedo,
            txn,
            &[length_pair, undo_stored, redo_stored],
        )
    }

    /// Append a diff-encoded row mutation: the after image is stored as a
    /// byte diff against the before image.
    pub fn undo_redo_diff(
        &mut self,
        txn: TransactionId,
        shape: RowShape,
        table_id: TableId,
        group_id: GroupId,
        before: &[u8],
        after: &[u8],
        compress_before: bool,
    ) -> LogAddress {
        let undo_image = Self::mutation_image(shape, table_id, group_id, before);
        let redo_image = Self::mutation_image(shape, table_id, group_id, after);
        let diff = codec::build_diff(&undo_image, &redo_image).unwrap();

        let (undo_raw, undo_stored) = Self::span_chunk(&undo_image, compress_before);
        let (redo_raw, redo_stored) = Self::span_chunk(&diff, false);

        let mut length_pair = Vec::with_capacity(8);
        length_pair.extend_from_slice(&undo_raw.to_le_bytes());
        length_pair.extend_from_slice(&redo_raw.to_le_bytes());

        self.append_record(
            RecordKind::UndoRedoDiff,
            txn,
            &[length_pair, undo_stored, redo_stored],
        )
    }

    /// Append an overflow-start control record.
    pub fn overflow_start(&mut self, txn: TransactionId) -> LogAddress {
        self.append_record(RecordKind::OverflowStart, txn, &[])
    }

    fn redo_chunks(bytes: &[u8], compress: bool) -> Vec<Vec<u8>> {
        let (raw, stored) = Self::span_chunk(bytes, compress);
        vec![raw.to_le_bytes().to_vec(), stored]
    }

    /// Append the first fragment of an overflow value: sub-header plus the
    /// initial chunk of the tuple.
    pub fn overflow_first_fragment(
        &mut self,
        txn: TransactionId,
        table_id: TableId,
        group_id: GroupId,
        total_length: u32,
        chunk: &[u8],
    ) -> LogAddress {
        let mut fragment = OverflowSubHeader {
            table_id,
            group_id,
            total_length,
        }
        .to_wire();
        fragment.extend_from_slice(chunk);
        self.append_record(RecordKind::Redo, txn, &Self::redo_chunks(&fragment, false))
    }

    /// Append a continuation fragment of an overflow value.
    pub fn overflow_fragment(&mut self, txn: TransactionId, chunk: &[u8]) -> LogAddress {
        self.append_record(RecordKind::Redo, txn, &Self::redo_chunks(chunk, false))
    }

    /// Append a self-contained overflow-row delete.
    pub fn overflow_delete(
        &mut self,
        txn: TransactionId,
        table_id: TableId,
        group_id: GroupId,
        tuple: &[u8],
    ) -> LogAddress {
        let mut payload = Vec::with_capacity(8 + tuple.len());
        payload.extend_from_slice(&table_id.to_le_bytes());
        payload.extend_from_slice(&group_id.to_le_bytes());
        payload.extend_from_slice(tuple);
        self.append_record(
            RecordKind::OverflowDeleteWhole,
            txn,
            &Self::redo_chunks(&payload, false),
        )
    }

    /// Append a group-rebalance marker.
    pub fn marker(&mut self, group_id: GroupId, migrator_id: MigratorId) -> LogAddress {
        let payload = RebalanceMarker {
            group_id,
            migrator_id,
        }
        .to_wire();
        self.append_record(RecordKind::GroupRebalanceMarker, 0, &[payload])
    }

    /// Append a commit boundary.
    pub fn commit(&mut self, txn: TransactionId, at_time_ms: u64) -> LogAddress {
        self.append_record(
            RecordKind::Commit,
            txn,
            &[at_time_ms.to_le_bytes().to_vec()],
        )
    }

    /// Append an abort boundary.
    pub fn abort(&mut self, txn: TransactionId) -> LogAddress {
        self.append_record(RecordKind::Abort, txn, &[0u64.to_le_bytes().to_vec()])
    }

    /// Freeze the current stream: append the end-of-log sentinel to a copy
    /// and return checksummed wire pages plus the end address.
    pub fn snapshot(&self) -> LogSnapshot {
        let mut sealed = self.clone();
        sealed.append_record(RecordKind::EndOfLog, 0, &[]);

        let end = Self::addr(sealed.stream.len());
        let mut body = sealed.stream;
        let page_count = body.len().div_ceil(PAGE_BODY_SIZE).max(1);
        body.resize(page_count * PAGE_BODY_SIZE, 0);

        let pages = body
            .chunks(PAGE_BODY_SIZE)
            .enumerate()
            .map(|(i, chunk)| {
                LogPage {
                    page_id: i as u64,
                    body: chunk.to_vec(),
                }
                .to_wire()
            })
            .collect();

        LogSnapshot { pages, end }
    }
}

/// Serves a scripted sequence of log snapshots; each fetch advances to the
/// next snapshot and sticks at the last, modeling a source whose log grows
/// between round trips.
pub struct MemoryPageSource {
    snapshots: Vec<LogSnapshot>,
    next: usize,
    pub fetches: usize,
}

impl MemoryPageSource {
    pub fn new(snapshots: Vec<LogSnapshot>) -> Self {
        assert!(!snapshots.is_empty());
        Self {
            snapshots,
            next: 0,
            fetches: 0,
        }
    }

    pub fn single(snapshot: LogSnapshot) -> Self {
        Self::new(vec![snapshot])
    }
}

impl PageSource for MemoryPageSource {
    fn fetch_log_pages(
        &mut self,
        start_page_id: u64,
        max_pages: usize,
    ) -> Result<PageBatch, PageFetchError> {
        self.fetches += 1;
        let snapshot = &self.snapshots[self.next.min(self.snapshots.len() - 1)];
        self.next += 1;

        let pages = snapshot
            .pages
            .iter()
            .skip(start_page_id as usize)
            .take(max_pages)
            .cloned()
            .collect();
        Ok(PageBatch {
            pages,
            source_end_address: snapshot.end,
        })
    }
}

/// Decodes tuples to lowercase hex; table 999 has no destination table.
pub struct HexDecoder;

pub const UNKNOWN_TABLE: TableId = 999;

impl TupleDecoder for HexDecoder {
    type Row = String;

    fn decode_tuple(
        &self,
        table_id: TableId,
        raw: &[u8],
    ) -> Result<Option<String>, TupleDecodeError> {
        if table_id == UNKNOWN_TABLE {
            return Ok(None);
        }
        Ok(Some(raw.iter().map(|b| format!("{:02x}", b)).collect()))
    }
}

/// Renders literal statements naming the table and the hex tuple.
pub struct SqlRenderer;

impl StatementRenderer for SqlRenderer {
    type Row = String;

    fn render_insert(&self, table_id: TableId, row: &String) -> String {
        format!("INSERT INTO t{} VALUES (x'{}')", table_id, row)
    }

    fn render_replace(&self, table_id: TableId, row: &String) -> String {
        format!("REPLACE INTO t{} VALUES (x'{}')", table_id, row)
    }

    fn render_delete(&self, table_id: TableId, row: &String) -> String {
        format!("DELETE FROM t{} WHERE row = x'{}'", table_id, row)
    }
}

/// Records executed batches through a shared handle; optionally fails.
#[derive(Clone, Default)]
pub struct RecordingExecutor {
    log: Arc<Mutex<Vec<(TransactionId, Vec<String>)>>>,
    fail: bool,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            log: Arc::default(),
            fail: true,
        }
    }

    /// All executed batches so far, in execution order.
    pub fn batches(&self) -> Vec<(TransactionId, Vec<String>)> {
        self.log.lock().unwrap().clone()
    }

    /// Total statements across all batches.
    pub fn statement_count(&self) -> usize {
        self.log.lock().unwrap().iter().map(|(_, s)| s.len()).sum()
    }
}

impl DestinationExecutor for RecordingExecutor {
    fn execute_batch(
        &mut self,
        transaction_id: TransactionId,
        statements: &[String],
    ) -> Result<(), ExecutionError> {
        if self.fail {
            return Err(ExecutionError::new("destination rejected the batch"));
        }
        self.log
            .lock()
            .unwrap()
            .push((transaction_id, statements.to_vec()));
        Ok(())
    }
}
