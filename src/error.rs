// Error type shared by the codec, bytecode and segment layers.
//
// Two kinds of failure exist: format/logic errors (bad references, band
// length mismatches, size mismatches, unrepresentable values) and transport
// errors from the underlying stream. Neither is retried; either one aborts
// the segment being processed and the operation as a whole.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    /// Underlying stream failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A decoded index points outside the table it references.
    #[error("band {band}: reference index {index} outside 0..{len}")]
    InvalidReference {
        band: String,
        index: i64,
        len: usize,
    },

    /// Band contents disagree with the lengths computed while sizing.
    #[error("band {band}: {detail}")]
    CodecMismatch { band: String, detail: String },

    /// Entry payload length differs from its declared size.
    #[error("entry {name}: declared {declared} bytes but read {actual}")]
    SizeMismatch {
        name: String,
        declared: u64,
        actual: u64,
    },

    /// Entry too large to be represented in a segment.
    #[error("entry {name}: {size} bytes exceeds the {max} byte limit")]
    EntryTooLarge { name: String, size: u64, max: u64 },

    /// A coding specifier in the band headers is invalid.
    #[error("invalid coding: {0}")]
    InvalidCoding(String),

    /// A value cannot be written with the band's coding.
    #[error("band {band}: value {value} not representable by {coding}")]
    Unrepresentable {
        band: String,
        value: i64,
        coding: String,
    },

    /// Structurally invalid input (class file, segment header, bytecode).
    #[error("malformed input: {0}")]
    Malformed(String),

    /// Packed opcode with no known operand layout (strict policy only).
    #[error("unrecognized opcode {opcode} at packed byte {position}")]
    UnknownOpcode { opcode: u8, position: usize },

    /// Valid input using a feature this implementation does not provide.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl PackError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub(crate) fn mismatch(band: &str, detail: impl Into<String>) -> Self {
        Self::CodecMismatch {
            band: band.to_string(),
            detail: detail.into(),
        }
    }

    /// True for transport failures, false for format/logic failures.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, PackError>;
