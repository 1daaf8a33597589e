//! Payload codec: length flags, compression, diff reconstruction
//!
//! Record payload lengths are stored as a u32 whose top bit flags a
//! zstd-compressed payload; the true stored length is the low 31 bits. This
//! masking is a wire contract shared with the source node's writer.
//!
//! A compressed payload is self-describing: a u32 raw length followed by the
//! zstd frame. Diff-encoded after images are a small op stream replayed
//! against the decompressed before image. Both transforms keep their encode
//! side here so the decode side can be round-trip tested.

mod errors;

pub use errors::{CodecError, CodecResult};

/// Flag bit marking a compressed payload in a length field.
pub const COMPRESSED_FLAG: u32 = 0x8000_0000;

/// Mask selecting the true stored length from a length field.
pub const LENGTH_MASK: u32 = COMPRESSED_FLAG - 1;

/// zstd compression level used by the write side.
const COMPRESSION_LEVEL: i32 = 3;

/// Diff opcode: copy bytes from the before image at the current offset.
const DIFF_OP_COPY: u8 = 0;
/// Diff opcode: append literal bytes from the diff stream.
const DIFF_OP_LITERAL: u8 = 1;
/// Diff opcode: advance the before-image offset without emitting.
const DIFF_OP_SKIP: u8 = 2;

/// A length field split into its true length and compression flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthField {
    /// Stored byte count of the payload as written
    pub stored_length: u32,
    /// Whether the stored bytes are a compressed frame
    pub compressed: bool,
}

impl LengthField {
    /// Split a raw wire length field.
    pub fn from_wire(raw: u32) -> Self {
        Self {
            stored_length: raw & LENGTH_MASK,
            compressed: raw & COMPRESSED_FLAG != 0,
        }
    }

    /// Combine into the raw wire form.
    pub fn to_wire(&self) -> CodecResult<u32> {
        if self.stored_length > LENGTH_MASK {
            return Err(CodecError::EncodedLengthOverflow(self.stored_length as usize));
        }
        Ok(if self.compressed {
            self.stored_length | COMPRESSED_FLAG
        } else {
            self.stored_length
        })
    }
}

/// Materialize the logical payload from its stored bytes.
///
/// For uncompressed payloads this is a copy; for compressed payloads the
/// bytes are a raw-length prefix plus a zstd frame.
pub fn materialize(stored: &[u8], field: LengthField) -> CodecResult<Vec<u8>> {
    if !field.compressed {
        return Ok(stored.to_vec());
    }
    decompress_payload(stored)
}

/// Compress a payload into its self-describing stored form.
pub fn compress_payload(raw: &[u8]) -> CodecResult<Vec<u8>> {
    if raw.len() > LENGTH_MASK as usize {
        return Err(CodecError::EncodedLengthOverflow(raw.len()));
    }
    let frame = zstd::bulk::compress(raw, COMPRESSION_LEVEL)
        .map_err(|e| CodecError::CompressFailed(e.to_string()))?;
    let mut stored = Vec::with_capacity(4 + frame.len());
    stored.extend_from_slice(&(raw.len() as u32).to_le_bytes());
    stored.extend_from_slice(&frame);
    Ok(stored)
}

/// Decompress a self-describing stored payload.
pub fn decompress_payload(stored: &[u8]) -> CodecResult<Vec<u8>> {
    if stored.len() < 4 {
        return Err(CodecError::DecompressFailed(format!(
            "compressed payload of {} bytes has no length prefix",
            stored.len()
        )));
    }
    let declared =
        u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]) as usize;
    let raw = zstd::bulk::decompress(&stored[4..], declared)
        .map_err(|e| CodecError::DecompressFailed(e.to_string()))?;
    if raw.len() != declared {
        return Err(CodecError::DecompressedLengthMismatch {
            declared,
            actual: raw.len(),
        });
    }
    Ok(raw)
}

/// Reconstruct an after image by replaying a diff stream against the before
/// image.
///
/// The stream is `{target_len: u32}` followed by ops until exhausted:
/// opcode (u8), length (u32), and for literal ops the literal bytes.
pub fn apply_diff(before: &[u8], diff: &[u8]) -> CodecResult<Vec<u8>> {
    if diff.len() < 4 {
        return Err(CodecError::DiffTruncated);
    }
    let target_len = u32::from_le_bytes([diff[0], diff[1], diff[2], diff[3]]) as usize;

    let mut after = Vec::with_capacity(target_len);
    let mut before_pos = 0usize;
    let mut pos = 4usize;

    while pos < diff.len() {
        if diff.len() - pos < 5 {
            return Err(CodecError::DiffTruncated);
        }
        let op = diff[pos];
        let len = u32::from_le_bytes([diff[pos + 1], diff[pos + 2], diff[pos + 3], diff[pos + 4]])
            as usize;
        pos += 5;

        match op {
            DIFF_OP_COPY => {
                if before_pos + len > before.len() {
                    return Err(CodecError::DiffOutOfRange {
                        offset: before_pos,
                        len,
                        image_len: before.len(),
                    });
                }
                after.extend_from_slice(&before[before_pos..before_pos + len]);
                before_pos += len;
            }
            DIFF_OP_LITERAL => {
                if diff.len() - pos < len {
                    return Err(CodecError::DiffTruncated);
                }
                after.extend_from_slice(&diff[pos..pos + len]);
                pos += len;
            }
            DIFF_OP_SKIP => {
                if before_pos + len > before.len() {
                    return Err(CodecError::DiffOutOfRange {
                        offset: before_pos,
                        len,
                        image_len: before.len(),
                    });
                }
                before_pos += len;
            }
            other => return Err(CodecError::DiffBadOpcode(other)),
        }
    }

    if after.len() != target_len {
        return Err(CodecError::DiffLengthMismatch {
            declared: target_len,
            actual: after.len(),
        });
    }
    Ok(after)
}

/// Build a diff stream turning `before` into `after`.
///
/// Prefix/suffix matching only; the write side favors simplicity over
/// minimal diff size, and `apply_diff` accepts any well-formed stream.
pub fn build_diff(before: &[u8], after: &[u8]) -> CodecResult<Vec<u8>> {
    if after.len() > LENGTH_MASK as usize {
        return Err(CodecError::EncodedLengthOverflow(after.len()));
    }

    let prefix = before
        .iter()
        .zip(after.iter())
        .take_while(|(b, a)| b == a)
        .count();
    let max_suffix = before.len().min(after.len()) - prefix;
    let suffix = before
        .iter()
        .rev()
        .zip(after.iter().rev())
        .take_while(|(b, a)| b == a)
        .take(max_suffix)
        .count();

    let mut diff = Vec::new();
    diff.extend_from_slice(&(after.len() as u32).to_le_bytes());

    let mut push_op = |op: u8, len: usize, bytes: Option<&[u8]>| {
        if len == 0 {
            return;
        }
        diff.push(op);
        diff.extend_from_slice(&(len as u32).to_le_bytes());
        if let Some(bytes) = bytes {
            diff.extend_from_slice(bytes);
        }
    };

    push_op(DIFF_OP_COPY, prefix, None);
    push_op(DIFF_OP_SKIP, before.len() - prefix - suffix, None);
    push_op(
        DIFF_OP_LITERAL,
        after.len() - prefix - suffix,
        Some(&after[prefix..after.len() - suffix]),
    );
    push_op(DIFF_OP_COPY, suffix, None);

    Ok(diff)
}
