//! Log sequence addresses
//!
//! A `LogAddress` identifies a byte position in the source node's log as a
//! `(page_id, offset)` pair, where `offset` is relative to the page body.
//! Addresses are totally ordered and, within one replay session, only ever
//! advance. Header links that contradict that ordering are corruption.

use std::fmt;

/// A position in the write-ahead log: page id plus offset into the page body.
///
/// The null address (`LogAddress::NULL`) marks absent links: the
/// previous-transaction link of a transaction's first record, the backward
/// link of the first record in the log, and the forward link of the
/// end-of-log sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogAddress {
    /// Log page identifier
    pub page_id: u64,
    /// Byte offset into the page body
    pub offset: u32,
}

/// Serialized size of an address on the wire: page id (u64) + offset (u32)
pub const ADDRESS_WIRE_SIZE: usize = 12;

impl LogAddress {
    /// The null address, used for absent links.
    pub const NULL: LogAddress = LogAddress {
        page_id: u64::MAX,
        offset: u32::MAX,
    };

    /// Create an address.
    pub fn new(page_id: u64, offset: u32) -> Self {
        Self { page_id, offset }
    }

    /// Whether this is the null address.
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// Serialize to the 12-byte wire form (little-endian).
    pub fn to_wire(&self) -> [u8; ADDRESS_WIRE_SIZE] {
        let mut buf = [0u8; ADDRESS_WIRE_SIZE];
        buf[0..8].copy_from_slice(&self.page_id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.offset.to_le_bytes());
        buf
    }

    /// Deserialize from the 12-byte wire form.
    pub fn from_wire(buf: &[u8; ADDRESS_WIRE_SIZE]) -> Self {
        let page_id = u64::from_le_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ]);
        let offset = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
        Self { page_id, offset }
    }
}

impl fmt::Display for LogAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}|{}", self.page_id, self.offset)
        }
    }
}
