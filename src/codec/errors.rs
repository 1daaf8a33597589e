//! # Codec Errors

use thiserror::Error;

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Payload codec errors
///
/// Decompression and diff-reconstruction failures are treated by the replay
/// pipeline exactly like corruption: they most often indicate a version
/// mismatch or a corrupted page.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    // Compression errors
    #[error("Decompression failed: {0}")]
    DecompressFailed(String),

    #[error("Compression failed: {0}")]
    CompressFailed(String),

    #[error("Decompressed length mismatch: declared {declared}, got {actual}")]
    DecompressedLengthMismatch { declared: usize, actual: usize },

    #[error("Payload of {0} bytes exceeds the 31-bit length field")]
    EncodedLengthOverflow(usize),

    // Diff-reconstruction errors
    #[error("Diff stream truncated")]
    DiffTruncated,

    #[error("Unknown diff opcode: {0}")]
    DiffBadOpcode(u8),

    #[error("Diff reads past the before image: offset {offset}, len {len}, image {image_len}")]
    DiffOutOfRange {
        offset: usize,
        len: usize,
        image_len: usize,
    },

    #[error("Diff target length mismatch: declared {declared}, reconstructed {actual}")]
    DiffLengthMismatch { declared: usize, actual: usize },
}
