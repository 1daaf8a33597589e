//! Page checksum computation
//!
//! Every fetched log page is verified before any record on it is
//! interpreted. The checksum covers the page id and the page body so a page
//! served under the wrong id is caught as well as a corrupted one.

/// Compute the CRC32 checksum binding a page id to its body bytes.
pub fn compute_page_checksum(page_id: u64, body: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&page_id.to_le_bytes());
    hasher.update(body);
    hasher.finalize()
}
