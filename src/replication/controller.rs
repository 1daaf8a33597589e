//! Replication controller
//!
//! The driving loop of one rebalance run: fetch page batches, decode every
//! record in log order through the header / codec / overflow / extraction
//! pipeline, buffer rendered statements per transaction, release them on
//! commit, and pace against the source with the delay governor.
//!
//! The loop is single-threaded by design. The only suspension points are the
//! page fetch and the bounded pacing sleeps; all decode work for a fetched
//! batch runs to completion before the next fetch, which linearizes access
//! to the transaction buffer and the overflow map without locking.
//!
//! A run terminates two ways: the in-band rebalance marker matching this
//! run's identity (success), or a fatal error. There is no out-of-band
//! cancellation.

use std::sync::Arc;
use std::thread;

use uuid::Uuid;

use super::errors::{ReplayError, ReplayResult};
use super::extract::{RowMutation, RowMutationExtractor, RowOperation};
use super::lag::{DelayPolicy, LagStats, ReplicationCursor};
use super::overflow::OverflowReassembler;
use super::traits::{DestinationExecutor, PageSource, StatementRenderer, TupleDecoder};
use super::txn_buffer::TransactionBuffer;
use super::window::PageWindow;
use crate::checkpoint::{Savepoint, SavepointStore};
use crate::codec::{self, LengthField};
use crate::config::RebalanceConfig;
use crate::observability::{Logger, PumpMetrics};
use crate::wal::{
    BoundaryPayload, LogAddress, RebalanceMarker, RecordHeader, RecordKind, TransactionId,
    BOUNDARY_WIRE_SIZE, HEADER_WIRE_SIZE, MARKER_WIRE_SIZE,
};

/// Run loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Decoding records
    Running,
    /// At the end-of-log sentinel, polling for growth
    CaughtUp,
    /// Matching rebalance marker observed; run finished
    Stopped,
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Correlation id of this run
    pub run_id: Uuid,
    /// Address of the rebalance marker that stopped the run
    pub stopped_at: LogAddress,
    /// Durable resume position at stop time
    pub synced_address: LogAddress,
    /// Pages the cursor moved past
    pub pages_processed: u64,
    /// Transactions released to the executor
    pub transactions_committed: u64,
    /// Transactions dropped on abort
    pub transactions_aborted: u64,
}

/// The replay run loop and its owned pipeline state.
pub struct ReplicationController<S, D, R, E>
where
    S: PageSource,
    D: TupleDecoder,
    R: StatementRenderer<Row = D::Row>,
    E: DestinationExecutor,
{
    config: RebalanceConfig,
    window: PageWindow<S>,
    decoder: D,
    renderer: R,
    executor: E,
    extractor: RowMutationExtractor,
    overflow: OverflowReassembler,
    txn_buffer: TransactionBuffer,
    cursor: ReplicationCursor,
    stats: LagStats,
    delay_policy: DelayPolicy,
    metrics: Arc<PumpMetrics>,
    savepoints: Option<SavepointStore>,
    state: RunState,
    run_id: Uuid,
}

impl<S, D, R, E> std::fmt::Debug for ReplicationController<S, D, R, E>
where
    S: PageSource,
    D: TupleDecoder,
    R: StatementRenderer<Row = D::Row>,
    E: DestinationExecutor,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationController")
            .field("run_id", &self.run_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<S, D, R, E> ReplicationController<S, D, R, E>
where
    S: PageSource,
    D: TupleDecoder,
    R: StatementRenderer<Row = D::Row>,
    E: DestinationExecutor,
{
    /// Create a controller over the four collaborators.
    pub fn new(
        config: RebalanceConfig,
        source: S,
        decoder: D,
        renderer: R,
        executor: E,
    ) -> ReplayResult<Self> {
        config.validate()?;
        let metrics = Arc::new(PumpMetrics::new());
        let window = PageWindow::new(source, config.max_window_pages, Arc::clone(&metrics));
        let delay_policy = DelayPolicy {
            max_window_pages: config.max_window_pages as u64,
            max_delay_secs: config.max_delay.as_secs_f64(),
        };
        let extractor = RowMutationExtractor::new(config.group_id);
        Ok(Self {
            config,
            window,
            decoder,
            renderer,
            executor,
            extractor,
            overflow: OverflowReassembler::new(),
            txn_buffer: TransactionBuffer::new(),
            cursor: ReplicationCursor::starting_at(LogAddress::new(0, 0)),
            stats: LagStats::new(),
            delay_policy,
            metrics,
            savepoints: None,
            state: RunState::Running,
            run_id: Uuid::new_v4(),
        })
    }

    /// Attach a savepoint store for durable resume positions.
    pub fn with_savepoints(mut self, store: SavepointStore) -> Self {
        self.savepoints = Some(store);
        self
    }

    /// The run's metrics registry.
    pub fn metrics(&self) -> Arc<PumpMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Current cursor positions.
    pub fn cursor(&self) -> ReplicationCursor {
        self.cursor
    }

    /// Drive the replay loop from `start` until the matching rebalance
    /// marker is observed or a fatal error stops the run.
    ///
    /// A stored savepoint for this run's identity overrides `start` when it
    /// lies further ahead; a restarted run never re-applies a transaction.
    pub fn run(&mut self, start: LogAddress) -> ReplayResult<RunSummary> {
        let start = self.resolve_start(start)?;
        self.cursor = ReplicationCursor::starting_at(start);
        self.state = RunState::Running;

        Logger::info(
            "REPLAY_STARTED",
            &[
                ("run_id", self.run_id.to_string()),
                ("group_id", self.config.group_id.to_string()),
                ("migrator_id", self.config.migrator_id.to_string()),
                ("start", start.to_string()),
            ],
        );

        self.window.open_at(start)?;
        self.cursor.source_known_end = self.window.known_end();
        let mut last_page = start.page_id;

        loop {
            let at = self.window.current_address();
            if at.page_id > last_page {
                self.stats.record_pages_processed(at.page_id - last_page);
                last_page = at.page_id;
                self.check_delay()?;
            }

            let header = self.read_header(at)?;

            if header.kind == RecordKind::EndOfLog {
                self.on_caught_up(at)?;
                continue;
            }
            if self.state == RunState::CaughtUp {
                self.state = RunState::Running;
            }
            self.metrics.incr_records_decoded();

            match header.kind {
                RecordKind::UndoRedo | RecordKind::UndoRedoDiff => {
                    self.process_undo_redo(&header, at)?;
                }
                RecordKind::Redo => {
                    self.process_redo_fragment(&header, at)?;
                }
                RecordKind::OverflowStart => {
                    self.overflow.start(header.transaction_id);
                }
                RecordKind::OverflowDeleteWhole => {
                    self.process_overflow_delete(&header, at)?;
                }
                RecordKind::GroupRebalanceMarker => {
                    if let Some(summary) = self.process_marker(&header, at)? {
                        return Ok(summary);
                    }
                }
                RecordKind::Commit => {
                    self.process_commit(&header)?;
                }
                RecordKind::Abort => {
                    self.process_abort(&header)?;
                }
                // Handled before the match
                RecordKind::EndOfLog => {}
            }

            self.window.seek(header.forward_address)?;
            self.cursor.final_address = header.forward_address;
        }
    }

    fn resolve_start(&self, start: LogAddress) -> ReplayResult<LogAddress> {
        if let Some(store) = &self.savepoints {
            if let Some(savepoint) =
                store.load(self.config.group_id, self.config.migrator_id)?
            {
                let resumed = savepoint.synced_address();
                if resumed > start {
                    Logger::info(
                        "REPLAY_RESUMED",
                        &[
                            ("run_id", self.run_id.to_string()),
                            ("savepoint", resumed.to_string()),
                        ],
                    );
                    return Ok(resumed);
                }
            }
        }
        Ok(start)
    }

    fn read_header(&mut self, at: LogAddress) -> ReplayResult<RecordHeader> {
        let bytes = self.window.read(HEADER_WIRE_SIZE)?;
        self.window.align();
        let header = RecordHeader::from_wire(&bytes, at)?;
        header.validate_links(at)?;
        Ok(header)
    }

    /// Read one length-prefixed, possibly compressed payload span.
    fn read_span(&mut self, field: LengthField) -> ReplayResult<Vec<u8>> {
        let stored = self.window.read(field.stored_length as usize)?;
        self.window.align();
        let raw = codec::materialize(&stored, field)?;
        if field.compressed {
            self.metrics.add_bytes_decompressed(raw.len() as u64);
        }
        Ok(raw)
    }

    fn process_undo_redo(&mut self, header: &RecordHeader, at: LogAddress) -> ReplayResult<()> {
        let lengths = self.window.read(8)?;
        self.window.align();
        let undo_field = LengthField::from_wire(u32::from_le_bytes([
            lengths[0], lengths[1], lengths[2], lengths[3],
        ]));
        let redo_field = LengthField::from_wire(u32::from_le_bytes([
            lengths[4], lengths[5], lengths[6], lengths[7],
        ]));

        let undo = self.read_span(undo_field)?;
        let redo_payload = self.read_span(redo_field)?;
        let redo = if header.kind == RecordKind::UndoRedoDiff {
            codec::apply_diff(&undo, &redo_payload)?
        } else {
            redo_payload
        };

        match self.extractor.extract(at, &undo, &redo)? {
            Some(mutation) => self.buffer_mutation(header.transaction_id, mutation),
            None => {
                self.metrics.incr_records_filtered();
                Ok(())
            }
        }
    }

    fn process_redo_fragment(&mut self, header: &RecordHeader, at: LogAddress) -> ReplayResult<()> {
        let length = self.window.read(4)?;
        self.window.align();
        let field =
            LengthField::from_wire(u32::from_le_bytes([length[0], length[1], length[2], length[3]]));
        let fragment = self.read_span(field)?;

        if let Some(completed) = self.overflow.feed(header.transaction_id, &fragment, at)? {
            self.metrics.incr_overflow_reassembled();
            match self.extractor.extract_overflow(completed) {
                Some(mutation) => self.buffer_mutation(header.transaction_id, mutation)?,
                None => self.metrics.incr_records_filtered(),
            }
        }
        Ok(())
    }

    fn process_overflow_delete(
        &mut self,
        header: &RecordHeader,
        at: LogAddress,
    ) -> ReplayResult<()> {
        let length = self.window.read(4)?;
        self.window.align();
        let field =
            LengthField::from_wire(u32::from_le_bytes([length[0], length[1], length[2], length[3]]));
        let payload = self.read_span(field)?;

        match self.extractor.extract_overflow_delete(at, &payload)? {
            Some(mutation) => self.buffer_mutation(header.transaction_id, mutation),
            None => {
                self.metrics.incr_records_filtered();
                Ok(())
            }
        }
    }

    fn process_marker(
        &mut self,
        header: &RecordHeader,
        at: LogAddress,
    ) -> ReplayResult<Option<RunSummary>> {
        let bytes = self.window.read(MARKER_WIRE_SIZE)?;
        self.window.align();
        let marker = RebalanceMarker::from_wire(&bytes)?;

        if marker.group_id != self.config.group_id
            || marker.migrator_id != self.config.migrator_id
        {
            Logger::trace(
                "FOREIGN_MARKER_SKIPPED",
                &[
                    ("group_id", marker.group_id.to_string()),
                    ("migrator_id", marker.migrator_id.to_string()),
                ],
            );
            return Ok(None);
        }

        self.state = RunState::Stopped;
        self.cursor.final_address = header.forward_address;
        self.cursor.synced_address = header.forward_address;
        self.persist_savepoint()?;

        Logger::info(
            "REPLAY_COMPLETED",
            &[
                ("run_id", self.run_id.to_string()),
                ("marker", at.to_string()),
                (
                    "transactions_committed",
                    self.metrics.transactions_committed().to_string(),
                ),
            ],
        );

        Ok(Some(RunSummary {
            run_id: self.run_id,
            stopped_at: at,
            synced_address: self.cursor.synced_address,
            pages_processed: self.stats.total_pages_processed(),
            transactions_committed: self.metrics.transactions_committed(),
            transactions_aborted: self.metrics.transactions_aborted(),
        }))
    }

    fn process_commit(&mut self, header: &RecordHeader) -> ReplayResult<()> {
        let bytes = self.window.read(BOUNDARY_WIRE_SIZE)?;
        self.window.align();
        let boundary = BoundaryPayload::from_wire(&bytes)?;

        // A commit while an overflow value is still collecting is a normal
        // outcome of group filtering; the partial state is dropped.
        self.overflow.discard(header.transaction_id);

        if let Some(statements) = self.txn_buffer.take_committed(header.transaction_id) {
            self.executor
                .execute_batch(header.transaction_id, &statements)
                .map_err(|e| ReplayError::execution(e.to_string()))?;
            self.metrics
                .incr_transactions_committed(statements.len() as u64);
            Logger::trace(
                "TXN_COMMITTED",
                &[
                    ("txn_id", header.transaction_id.to_string()),
                    ("statements", statements.len().to_string()),
                    ("at_time_ms", boundary.at_time_ms.to_string()),
                ],
            );
        }

        self.cursor.synced_address = header.forward_address;
        self.persist_savepoint()
    }

    fn process_abort(&mut self, header: &RecordHeader) -> ReplayResult<()> {
        let bytes = self.window.read(BOUNDARY_WIRE_SIZE)?;
        self.window.align();
        let _boundary = BoundaryPayload::from_wire(&bytes)?;

        self.overflow.discard(header.transaction_id);
        if self.txn_buffer.discard(header.transaction_id) {
            self.metrics.incr_transactions_aborted();
            Logger::trace(
                "TXN_ABORTED",
                &[("txn_id", header.transaction_id.to_string())],
            );
        }

        self.cursor.synced_address = header.forward_address;
        self.persist_savepoint()
    }

    fn buffer_mutation(
        &mut self,
        transaction_id: TransactionId,
        mutation: RowMutation,
    ) -> ReplayResult<()> {
        let row = match self.decoder.decode_tuple(mutation.table_id, &mutation.tuple) {
            Ok(Some(row)) => row,
            Ok(None) => {
                // Expected for migrator-internal catalogs excluded from
                // replication.
                self.metrics.incr_unknown_table_skips();
                Logger::trace(
                    "TABLE_SKIPPED",
                    &[("table_id", mutation.table_id.to_string())],
                );
                return Ok(());
            }
            Err(e) => return Err(ReplayError::corruption(e.to_string())),
        };

        let statement = match mutation.operation {
            RowOperation::Insert => self.renderer.render_insert(mutation.table_id, &row),
            RowOperation::Replace => self.renderer.render_replace(mutation.table_id, &row),
            RowOperation::Delete => self.renderer.render_delete(mutation.table_id, &row),
        };
        self.txn_buffer.append(transaction_id, statement);
        Ok(())
    }

    fn on_caught_up(&mut self, sentinel: LogAddress) -> ReplayResult<()> {
        if self.state != RunState::CaughtUp {
            self.state = RunState::CaughtUp;
            Logger::info(
                "REPLAY_CAUGHT_UP",
                &[
                    ("run_id", self.run_id.to_string()),
                    ("at", sentinel.to_string()),
                ],
            );
        }
        thread::sleep(self.config.poll_interval);
        self.window.restart_at(sentinel)?;
        self.cursor.source_known_end = self.window.known_end();
        Ok(())
    }

    fn check_delay(&mut self) -> ReplayResult<()> {
        for attempt in 0..self.config.max_retries {
            self.cursor.source_known_end = self.window.known_end();
            let lag = self.window.lag_pages();
            if !self.delay_policy.is_excessive(lag, &self.stats) {
                return Ok(());
            }
            Logger::warn(
                "REPLAY_LAGGING",
                &[
                    ("lag_pages", lag.to_string()),
                    ("attempt", attempt.to_string()),
                ],
            );
            thread::sleep(self.config.poll_interval);
            let at = self.window.current_address();
            self.window.restart_at(at)?;
        }
        Err(ReplayError::delay_exceeded(format!(
            "lag of {} pages still exceeds the delay budget after {} retries",
            self.window.lag_pages(),
            self.config.max_retries
        )))
    }

    fn persist_savepoint(&mut self) -> ReplayResult<()> {
        if let Some(store) = &self.savepoints {
            let savepoint = Savepoint::new(
                self.config.group_id,
                self.config.migrator_id,
                self.cursor.synced_address,
            );
            store.persist(&savepoint)?;
        }
        Ok(())
    }
}
