//! Shard log wire format
//!
//! The on-disk/on-wire shape of the source node's write-ahead log as seen by
//! the replay engine: fixed-size pages with verified checksums, record
//! headers linked by log sequence addresses, and the payload sub-headers of
//! every record kind the rebalancer interprets.
//!
//! # Design Principles
//!
//! - Every read is length-checked; no field can read past a buffer
//! - Explicit failure over silent recovery: malformed bytes halt the run
//! - The wire contract (alignment, flag bits, link ordering) lives here and
//!   nowhere else

mod address;
mod checksum;
mod cursor;
mod errors;
mod page;
mod record;

pub use address::{LogAddress, ADDRESS_WIRE_SIZE};
pub use checksum::compute_page_checksum;
pub use cursor::ByteCursor;
pub use errors::{LogError, LogErrorCode, LogResult, Severity};
pub use page::{
    align_up, LogPage, LOG_ALIGN, PAGE_BODY_SIZE, PAGE_HEADER_SIZE, PAGE_MAGIC, PAGE_SIZE,
};
pub use record::{
    BoundaryPayload, GroupId, MigratorId, MutationSubHeader, OverflowSubHeader, RebalanceMarker,
    RecordHeader, RecordKind, RowShape, TableId, TransactionId, BOUNDARY_WIRE_SIZE,
    HEADER_WIRE_SIZE, MARKER_WIRE_SIZE, MUTATION_SUBHEADER_SIZE, OVERFLOW_SUBHEADER_SIZE,
};
