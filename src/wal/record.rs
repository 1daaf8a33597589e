//! Log record headers and payload sub-headers
//!
//! Each record begins with a fixed 45-byte header:
//! - Kind (u8)
//! - Transaction ID (u64 LE)
//! - Previous-transaction address (12 bytes)
//! - Backward address (12 bytes)
//! - Forward address (12 bytes)
//!
//! The writer pads the header to the alignment quantum; readers consume the
//! header then align. The three address links exist to validate stream
//! integrity and to advance the cursor: previous-transaction and backward
//! links must point strictly before the record, the forward link strictly
//! after it. The only record without a forward link is the end-of-log
//! sentinel.

use super::address::{LogAddress, ADDRESS_WIRE_SIZE};
use super::cursor::ByteCursor;
use super::errors::{LogError, LogResult};

/// Owning transaction identifier.
pub type TransactionId = u64;
/// Source table identifier.
pub type TableId = u32;
/// Shard group tag carried by every replicated row.
pub type GroupId = u32;
/// Identity of one migrator process.
pub type MigratorId = u32;

/// Serialized size of a record header, before alignment padding.
pub const HEADER_WIRE_SIZE: usize = 1 + 8 + 3 * ADDRESS_WIRE_SIZE;

/// Record kinds of the shard log wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// Row mutation carrying both a before and an after image
    UndoRedo = 1,
    /// Row mutation whose after image is a diff against the before image
    UndoRedoDiff = 2,
    /// After-image-only record; used for overflow value fragments
    Redo = 3,
    /// The following Redo records of this transaction are fragments of one
    /// oversized value
    OverflowStart = 4,
    /// Delete of an overflow-backed row, carried as one self-contained record
    OverflowDeleteWhole = 5,
    /// Control record: a migrator finished moving a group
    GroupRebalanceMarker = 6,
    /// Transaction commit boundary
    Commit = 7,
    /// Transaction abort boundary
    Abort = 8,
    /// No more records past this point yet
    EndOfLog = 9,
}

impl RecordKind {
    /// Convert from the wire byte, `None` for unknown kinds.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(RecordKind::UndoRedo),
            2 => Some(RecordKind::UndoRedoDiff),
            3 => Some(RecordKind::Redo),
            4 => Some(RecordKind::OverflowStart),
            5 => Some(RecordKind::OverflowDeleteWhole),
            6 => Some(RecordKind::GroupRebalanceMarker),
            7 => Some(RecordKind::Commit),
            8 => Some(RecordKind::Abort),
            9 => Some(RecordKind::EndOfLog),
            _ => None,
        }
    }

    /// Convert to the wire byte.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether this kind marks a transaction boundary.
    pub fn is_boundary(self) -> bool {
        matches!(self, RecordKind::Commit | RecordKind::Abort)
    }
}

/// Fixed record prefix, read once per record, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Record kind
    pub kind: RecordKind,
    /// Owning transaction
    pub transaction_id: TransactionId,
    /// Address of this transaction's previous record, or null
    pub previous_tx_address: LogAddress,
    /// Address of the previous record in the log, or null
    pub backward_address: LogAddress,
    /// Address of the next record in the log; null only for EndOfLog
    pub forward_address: LogAddress,
}

impl RecordHeader {
    /// Decode a header from its wire bytes.
    ///
    /// `at` is the address of the header itself, used for error context.
    pub fn from_wire(buf: &[u8], at: LogAddress) -> LogResult<Self> {
        let mut cursor = ByteCursor::new(buf);
        let kind_byte = cursor.read_u8("record kind")?;
        let kind = RecordKind::from_u8(kind_byte).ok_or_else(|| {
            LogError::corruption_at(at, format!("unknown record kind: {}", kind_byte))
        })?;
        let transaction_id = cursor.read_u64("transaction id")?;

        let read_address = |cursor: &mut ByteCursor<'_>, what| -> LogResult<LogAddress> {
            let bytes = cursor.read_bytes(ADDRESS_WIRE_SIZE, what)?;
            let mut wire = [0u8; ADDRESS_WIRE_SIZE];
            wire.copy_from_slice(bytes);
            Ok(LogAddress::from_wire(&wire))
        };

        let previous_tx_address = read_address(&mut cursor, "previous-transaction address")?;
        let backward_address = read_address(&mut cursor, "backward address")?;
        let forward_address = read_address(&mut cursor, "forward address")?;

        Ok(Self {
            kind,
            transaction_id,
            previous_tx_address,
            backward_address,
            forward_address,
        })
    }

    /// Serialize to wire bytes. Kept symmetric with `from_wire` for the
    /// stream-building test fakes.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_WIRE_SIZE);
        buf.push(self.kind.as_u8());
        buf.extend_from_slice(&self.transaction_id.to_le_bytes());
        buf.extend_from_slice(&self.previous_tx_address.to_wire());
        buf.extend_from_slice(&self.backward_address.to_wire());
        buf.extend_from_slice(&self.forward_address.to_wire());
        buf
    }

    /// Validate the address links against this record's own address.
    ///
    /// Any violation means the page is corrupt and the run must stop.
    pub fn validate_links(&self, own_address: LogAddress) -> LogResult<()> {
        if !self.previous_tx_address.is_null() && self.previous_tx_address >= own_address {
            return Err(LogError::bad_link(
                own_address,
                format!(
                    "previous-transaction address {} does not precede record",
                    self.previous_tx_address
                ),
            ));
        }
        if !self.backward_address.is_null() && self.backward_address >= own_address {
            return Err(LogError::bad_link(
                own_address,
                format!(
                    "backward address {} does not precede record",
                    self.backward_address
                ),
            ));
        }
        if self.kind == RecordKind::EndOfLog {
            if !self.forward_address.is_null() {
                return Err(LogError::bad_link(
                    own_address,
                    "end-of-log record carries a forward address".to_string(),
                ));
            }
            return Ok(());
        }
        if self.forward_address.is_null() || self.forward_address <= own_address {
            return Err(LogError::bad_link(
                own_address,
                format!(
                    "forward address {} does not follow record",
                    self.forward_address
                ),
            ));
        }
        Ok(())
    }
}

/// Physical shape of a row mutation, the first field of every mutation image.
///
/// The discriminant decides rendering: a fresh-slot write becomes INSERT, a
/// write into a slot that previously held a relocated or tombstoned row
/// becomes REPLACE, a delete consumes the before image. Values outside the
/// known set are corruption, so an undocumented shape surfaces immediately
/// instead of being replayed wrongly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum RowShape {
    /// Insert into a fresh slot
    InsertFresh = 1,
    /// Insert into a relocated or tombstoned slot
    InsertRelocated = 2,
    /// Row deletion; valid tuple bytes live in the before image
    Delete = 3,
}

impl RowShape {
    /// Convert from the wire value, `None` for unknown shapes.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(RowShape::InsertFresh),
            2 => Some(RowShape::InsertRelocated),
            3 => Some(RowShape::Delete),
            _ => None,
        }
    }

    /// Convert to the wire value.
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Size of the sub-header at the front of every mutation image.
pub const MUTATION_SUBHEADER_SIZE: usize = 12;

/// Sub-header of a mutation image: shape, owning table, shard group tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationSubHeader {
    /// Physical record shape
    pub shape: RowShape,
    /// Owning table
    pub table_id: TableId,
    /// Shard group the row belongs to
    pub group_id: GroupId,
}

impl MutationSubHeader {
    /// Decode from the front of an image buffer.
    pub fn from_wire(buf: &[u8], at: LogAddress) -> LogResult<Self> {
        let mut cursor = ByteCursor::new(buf);
        let shape_raw = cursor.read_u16("mutation shape")?;
        let shape = RowShape::from_u16(shape_raw).ok_or_else(|| {
            LogError::corruption_at(at, format!("unknown mutation shape: {}", shape_raw))
        })?;
        let _reserved = cursor.read_u16("mutation reserved")?;
        let table_id = cursor.read_u32("table id")?;
        let group_id = cursor.read_u32("group id")?;
        Ok(Self {
            shape,
            table_id,
            group_id,
        })
    }

    /// Serialize to wire bytes.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MUTATION_SUBHEADER_SIZE);
        buf.extend_from_slice(&self.shape.as_u16().to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&self.table_id.to_le_bytes());
        buf.extend_from_slice(&self.group_id.to_le_bytes());
        buf
    }
}

/// Size of the sub-header at the front of the first overflow fragment.
pub const OVERFLOW_SUBHEADER_SIZE: usize = 12;

/// Sub-header of the first fragment of an overflow value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverflowSubHeader {
    /// Owning table
    pub table_id: TableId,
    /// Shard group the row belongs to
    pub group_id: GroupId,
    /// Declared total length of the reassembled tuple
    pub total_length: u32,
}

impl OverflowSubHeader {
    /// Decode from the front of the first fragment.
    pub fn from_wire(buf: &[u8]) -> LogResult<Self> {
        let mut cursor = ByteCursor::new(buf);
        Ok(Self {
            table_id: cursor.read_u32("overflow table id")?,
            group_id: cursor.read_u32("overflow group id")?,
            total_length: cursor.read_u32("overflow total length")?,
        })
    }

    /// Serialize to wire bytes.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(OVERFLOW_SUBHEADER_SIZE);
        buf.extend_from_slice(&self.table_id.to_le_bytes());
        buf.extend_from_slice(&self.group_id.to_le_bytes());
        buf.extend_from_slice(&self.total_length.to_le_bytes());
        buf
    }
}

/// Payload of a group-rebalance marker record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebalanceMarker {
    /// Group whose migration finished
    pub group_id: GroupId,
    /// Migrator announcing completion
    pub migrator_id: MigratorId,
}

/// Wire size of a rebalance marker payload.
pub const MARKER_WIRE_SIZE: usize = 8;

impl RebalanceMarker {
    /// Decode the marker payload.
    pub fn from_wire(buf: &[u8]) -> LogResult<Self> {
        let mut cursor = ByteCursor::new(buf);
        Ok(Self {
            group_id: cursor.read_u32("marker group id")?,
            migrator_id: cursor.read_u32("marker migrator id")?,
        })
    }

    /// Serialize to wire bytes.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MARKER_WIRE_SIZE);
        buf.extend_from_slice(&self.group_id.to_le_bytes());
        buf.extend_from_slice(&self.migrator_id.to_le_bytes());
        buf
    }
}

/// Payload of a commit or abort boundary record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryPayload {
    /// Wall-clock time of the boundary on the source, milliseconds
    pub at_time_ms: u64,
}

/// Wire size of a boundary payload.
pub const BOUNDARY_WIRE_SIZE: usize = 8;

impl BoundaryPayload {
    /// Decode the boundary payload.
    pub fn from_wire(buf: &[u8]) -> LogResult<Self> {
        let mut cursor = ByteCursor::new(buf);
        Ok(Self {
            at_time_ms: cursor.read_u64("boundary time")?,
        })
    }

    /// Serialize to wire bytes.
    pub fn to_wire(&self) -> Vec<u8> {
        self.at_time_ms.to_le_bytes().to_vec()
    }
}
