//! Length-checked reads over a byte buffer
//!
//! Fixed-size sub-headers inside record payloads are decoded with a
//! `ByteCursor` instead of pointer arithmetic, so a malformed length field
//! can never read past the end of a buffer. A short read is reported as
//! truncation, which the pipeline treats as fatal corruption.

use super::errors::{LogError, LogResult};

/// Sequential, bounds-checked reader over a byte slice.
#[derive(Debug)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    /// Create a cursor at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize, what: &str) -> LogResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(LogError::truncated(format!(
                "short read of {}: need {} bytes at offset {}, {} remain",
                what,
                len,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Read a u8.
    pub fn read_u8(&mut self, what: &str) -> LogResult<u8> {
        Ok(self.take(1, what)?[0])
    }

    /// Read a little-endian u16.
    pub fn read_u16(&mut self, what: &str) -> LogResult<u16> {
        let b = self.take(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a little-endian u32.
    pub fn read_u32(&mut self, what: &str) -> LogResult<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a little-endian u64.
    pub fn read_u64(&mut self, what: &str) -> LogResult<u64> {
        let b = self.take(8, what)?;
        Ok(u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    /// Read `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize, what: &str) -> LogResult<&'a [u8]> {
        self.take(len, what)
    }

    /// All bytes from the current position to the end of the buffer.
    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_reads() {
        let mut buf = Vec::new();
        buf.push(0x07u8);
        buf.extend_from_slice(&0x1234u16.to_le_bytes());
        buf.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        buf.extend_from_slice(&0x0102_0304_0506_0708u64.to_le_bytes());
        buf.extend_from_slice(b"tail");

        let mut cursor = ByteCursor::new(&buf);
        assert_eq!(cursor.read_u8("a").unwrap(), 0x07);
        assert_eq!(cursor.read_u16("b").unwrap(), 0x1234);
        assert_eq!(cursor.read_u32("c").unwrap(), 0xDEAD_BEEF);
        assert_eq!(cursor.read_u64("d").unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(cursor.rest(), b"tail");
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn test_short_read_reports_truncation() {
        let buf = [0u8; 3];
        let mut cursor = ByteCursor::new(&buf);
        let err = cursor.read_u32("field").unwrap_err();
        assert_eq!(err.code().code(), "PUMP_WAL_TRUNCATED");
        assert!(err.message().contains("field"));
    }

    #[test]
    fn test_short_read_does_not_advance() {
        let buf = [1u8, 2];
        let mut cursor = ByteCursor::new(&buf);
        assert!(cursor.read_u64("x").is_err());
        // Failed read leaves the cursor where it was.
        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.read_u16("y").unwrap(), 0x0201);
    }

    #[test]
    fn test_read_bytes_exact() {
        let buf = b"abcdef";
        let mut cursor = ByteCursor::new(buf);
        assert_eq!(cursor.read_bytes(3, "head").unwrap(), b"abc");
        assert_eq!(cursor.remaining(), 3);
        assert!(cursor.read_bytes(4, "over").is_err());
    }
}
