//! Metrics registry for the replay pump
//!
//! Counters only, monotonic, reset only when a run starts. Thread-safe with
//! Relaxed atomics; exactness across threads is not required for operational
//! counters and the pump itself is single-threaded.

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters of one replication run.
#[derive(Debug, Default)]
pub struct PumpMetrics {
    /// Log pages fetched from the source
    pages_fetched: AtomicU64,
    /// Records decoded from the stream
    records_decoded: AtomicU64,
    /// Records skipped by group filtering
    records_filtered: AtomicU64,
    /// Records skipped because no destination table matched
    unknown_table_skips: AtomicU64,
    /// Overflow values fully reassembled
    overflow_reassembled: AtomicU64,
    /// Bytes produced by payload decompression
    bytes_decompressed: AtomicU64,
    /// Transactions released to the executor
    transactions_committed: AtomicU64,
    /// Transactions dropped on abort
    transactions_aborted: AtomicU64,
    /// Statements handed to the executor
    statements_executed: AtomicU64,
}

impl PumpMetrics {
    /// Create a registry with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record fetched pages.
    pub fn add_pages_fetched(&self, n: u64) {
        self.pages_fetched.fetch_add(n, Ordering::Relaxed);
    }

    /// Record one decoded record.
    pub fn incr_records_decoded(&self) {
        self.records_decoded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one group-filtered record.
    pub fn incr_records_filtered(&self) {
        self.records_filtered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one unknown-table skip.
    pub fn incr_unknown_table_skips(&self) {
        self.unknown_table_skips.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one completed overflow value.
    pub fn incr_overflow_reassembled(&self) {
        self.overflow_reassembled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record decompressed output bytes.
    pub fn add_bytes_decompressed(&self, n: u64) {
        self.bytes_decompressed.fetch_add(n, Ordering::Relaxed);
    }

    /// Record one committed transaction and its statement count.
    pub fn incr_transactions_committed(&self, statements: u64) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
        self.statements_executed
            .fetch_add(statements, Ordering::Relaxed);
    }

    /// Record one aborted transaction.
    pub fn incr_transactions_aborted(&self) {
        self.transactions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Pages fetched so far.
    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched.load(Ordering::Relaxed)
    }

    /// Records decoded so far.
    pub fn records_decoded(&self) -> u64 {
        self.records_decoded.load(Ordering::Relaxed)
    }

    /// Group-filtered records so far.
    pub fn records_filtered(&self) -> u64 {
        self.records_filtered.load(Ordering::Relaxed)
    }

    /// Unknown-table skips so far.
    pub fn unknown_table_skips(&self) -> u64 {
        self.unknown_table_skips.load(Ordering::Relaxed)
    }

    /// Overflow values reassembled so far.
    pub fn overflow_reassembled(&self) -> u64 {
        self.overflow_reassembled.load(Ordering::Relaxed)
    }

    /// Decompressed bytes so far.
    pub fn bytes_decompressed(&self) -> u64 {
        self.bytes_decompressed.load(Ordering::Relaxed)
    }

    /// Committed transactions so far.
    pub fn transactions_committed(&self) -> u64 {
        self.transactions_committed.load(Ordering::Relaxed)
    }

    /// Aborted transactions so far.
    pub fn transactions_aborted(&self) -> u64 {
        self.transactions_aborted.load(Ordering::Relaxed)
    }

    /// Statements executed so far.
    pub fn statements_executed(&self) -> u64 {
        self.statements_executed.load(Ordering::Relaxed)
    }
}
