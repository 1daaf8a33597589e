//! Collaborator seams of the replay engine
//!
//! The core consumes four external collaborators: the page source (network
//! fetch of raw log pages), the tuple decoder (raw disk bytes to column
//! values under the table's current schema), the statement renderer (decoded
//! row to literal DML text for the destination dialect), and the destination
//! executor (one batch, one destination-side transaction). Their internals
//! live outside this crate; everything the core needs from them is here.

use std::fmt;

use crate::wal::{LogAddress, TableId, TransactionId};

/// One fetched batch of raw log pages.
#[derive(Debug, Clone)]
pub struct PageBatch {
    /// Raw page frames in ascending, contiguous page-id order starting at
    /// the requested page id. Each frame is parsed and checksum-verified by
    /// the window before any record on it is interpreted.
    pub pages: Vec<Vec<u8>>,
    /// The source's current log end, refreshed on every fetch; drives the
    /// caught-up check and the delay governor.
    pub source_end_address: LogAddress,
}

/// Failure of a page fetch round trip.
#[derive(Debug, Clone)]
pub struct PageFetchError {
    message: String,
}

impl PageFetchError {
    /// Create a fetch error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PageFetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page fetch failed: {}", self.message)
    }
}

impl std::error::Error for PageFetchError {}

/// Supplier of raw log pages from the source node.
pub trait PageSource {
    /// Fetch up to `max_pages` pages starting at `start_page_id`, in
    /// ascending page-id order, plus the source's current log end address.
    fn fetch_log_pages(
        &mut self,
        start_page_id: u64,
        max_pages: usize,
    ) -> Result<PageBatch, PageFetchError>;
}

/// Failure to decode a tuple under the table's current schema. Fatal.
#[derive(Debug, Clone)]
pub struct TupleDecodeError {
    message: String,
}

impl TupleDecodeError {
    /// Create a decode error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TupleDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tuple decode failed: {}", self.message)
    }
}

impl std::error::Error for TupleDecodeError {}

/// Reconstructs column values from a table's raw disk byte layout.
pub trait TupleDecoder {
    /// The in-memory row representation shared with the renderer.
    type Row;

    /// Decode a raw tuple. `Ok(None)` means the table id has no matching
    /// destination table; the record is recorded as a skip, not an error.
    fn decode_tuple(
        &self,
        table_id: TableId,
        raw: &[u8],
    ) -> Result<Option<Self::Row>, TupleDecodeError>;
}

/// Renders a decoded row as literal DML text for the destination dialect.
///
/// REPLACE and DELETE target the row by its primary key columns.
pub trait StatementRenderer {
    /// The in-memory row representation shared with the decoder.
    type Row;

    /// Literal INSERT text.
    fn render_insert(&self, table_id: TableId, row: &Self::Row) -> String;

    /// Literal REPLACE (idempotent upsert) text.
    fn render_replace(&self, table_id: TableId, row: &Self::Row) -> String;

    /// Literal DELETE text.
    fn render_delete(&self, table_id: TableId, row: &Self::Row) -> String;
}

/// Failure reported by the destination executor. Terminal for the run.
#[derive(Debug, Clone)]
pub struct ExecutionError {
    message: String,
}

impl ExecutionError {
    /// Create an execution error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "destination execution failed: {}", self.message)
    }
}

impl std::error::Error for ExecutionError {}

/// Applies one committed transaction's statements to the destination.
pub trait DestinationExecutor {
    /// Run the batch as one destination-side transaction, in order.
    fn execute_batch(
        &mut self,
        transaction_id: TransactionId,
        statements: &[String],
    ) -> Result<(), ExecutionError>;
}
