//! Log page layout
//!
//! A log page is a fixed 4096-byte unit fetched from the source node.
//! Layout:
//! - Magic (u32 LE)
//! - Checksum (u32 LE) over page id + body
//! - Page ID (u64 LE)
//! - Reserved (u64 LE)
//! - Body (4072 bytes)
//!
//! Pages are immutable once fetched. Record payloads flow across page body
//! boundaries; the page header is never part of a record.

use super::checksum::compute_page_checksum;
use super::errors::{LogError, LogResult};

/// Total on-wire size of one log page.
pub const PAGE_SIZE: usize = 4096;

/// Size of the fixed page header.
pub const PAGE_HEADER_SIZE: usize = 24;

/// Usable bytes per page body.
pub const PAGE_BODY_SIZE: usize = PAGE_SIZE - PAGE_HEADER_SIZE;

/// Magic value identifying a shard log page ("SPLG").
pub const PAGE_MAGIC: u32 = 0x53_50_4C_47;

/// Alignment quantum of the wire format. Records are alignment-padded on
/// write; every structured read is followed by an alignment step.
pub const LOG_ALIGN: usize = 8;

/// One fetched, verified log page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPage {
    /// Log page identifier
    pub page_id: u64,
    /// Page body (record bytes only, header stripped)
    pub body: Vec<u8>,
}

impl LogPage {
    /// Parse and verify a raw on-wire page.
    ///
    /// Checks, in order: length, magic, page id against `expected_page_id`,
    /// checksum. Any failure is fatal corruption.
    pub fn parse(raw: &[u8], expected_page_id: u64) -> LogResult<Self> {
        if raw.len() != PAGE_SIZE {
            return Err(LogError::truncated(format!(
                "log page must be {} bytes, got {}",
                PAGE_SIZE,
                raw.len()
            )));
        }

        let magic = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        if magic != PAGE_MAGIC {
            return Err(LogError::corruption(format!(
                "bad page magic: {:08x}, expected {:08x}",
                magic, PAGE_MAGIC
            )));
        }

        let stored_checksum = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
        let page_id = u64::from_le_bytes([
            raw[8], raw[9], raw[10], raw[11], raw[12], raw[13], raw[14], raw[15],
        ]);

        if page_id != expected_page_id {
            return Err(LogError::corruption(format!(
                "page id mismatch: fetched page claims {}, expected {}",
                page_id, expected_page_id
            )));
        }

        let body = &raw[PAGE_HEADER_SIZE..];
        let computed = compute_page_checksum(page_id, body);
        if computed != stored_checksum {
            return Err(LogError::corruption(format!(
                "page {} checksum mismatch: computed {:08x}, stored {:08x}",
                page_id, computed, stored_checksum
            )));
        }

        Ok(Self {
            page_id,
            body: body.to_vec(),
        })
    }

    /// Serialize this page to its on-wire form, computing the checksum.
    ///
    /// The write side lives in the source node; this is kept for the fetch
    /// fakes used by the test suite and must stay symmetric with `parse`.
    pub fn to_wire(&self) -> Vec<u8> {
        assert_eq!(self.body.len(), PAGE_BODY_SIZE, "page body size is fixed");
        let mut raw = Vec::with_capacity(PAGE_SIZE);
        raw.extend_from_slice(&PAGE_MAGIC.to_le_bytes());
        raw.extend_from_slice(&compute_page_checksum(self.page_id, &self.body).to_le_bytes());
        raw.extend_from_slice(&self.page_id.to_le_bytes());
        raw.extend_from_slice(&0u64.to_le_bytes());
        raw.extend_from_slice(&self.body);
        raw
    }
}

/// Round `offset` up to the next alignment boundary.
pub fn align_up(offset: usize) -> usize {
    (offset + LOG_ALIGN - 1) & !(LOG_ALIGN - 1)
}
