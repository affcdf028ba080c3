//! Error types for the frame store, the binary codec, and the text notation.

use thiserror::Error;

use crate::model::FrameId;

/// Broad error categories shared by all error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Malformed bytes or text.
    Malformed,
    /// A reference that does not point at anything usable.
    Reference,
    /// A length or depth limit was exceeded.
    Limit,
    /// The caller asked for something the store cannot do.
    Misuse,
}

impl ErrorCode {
    /// Returns a short stable name for the category.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::Malformed => "malformed",
            ErrorCode::Reference => "reference",
            ErrorCode::Limit => "limit",
            ErrorCode::Misuse => "misuse",
        }
    }
}

/// Error during binary decoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("unexpected end of input while reading {context}")]
    UnexpectedEof { context: &'static str },

    #[error("varint exceeds maximum length (10 bytes)")]
    VarintTooLong,

    #[error("varint overflow (value exceeds u64)")]
    VarintOverflow,

    #[error("invalid UTF-8 in {field}")]
    InvalidUtf8 { field: &'static str },

    #[error("{field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("invalid reference {index}")]
    InvalidReference { index: u64 },

    #[error("invalid replacement reference {index}")]
    InvalidReplacement { index: u64 },

    #[error("invalid special code {code}")]
    InvalidSpecial { code: u64 },

    #[error("float tag argument {bits:#x} does not fit in 30 bits")]
    InvalidFloat { bits: u64 },

    #[error("legacy index {index} does not fit in the index payload")]
    InvalidIndex { index: u64 },

    #[error("id slot value must be a symbol or string")]
    InvalidIdValue,

    #[error("nesting depth exceeds maximum {max}")]
    DepthExceeded { max: usize },

    #[error("invalid magic bytes: expected FRMZ, found {found:?}")]
    InvalidMagic { found: Vec<u8> },

    #[error("zstd decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("decompressed size {actual} doesn't match declared {declared}")]
    UncompressedSizeMismatch { declared: usize, actual: usize },
}

impl DecodeError {
    /// Returns the error category.
    pub fn code(&self) -> ErrorCode {
        match self {
            DecodeError::InvalidReference { .. } | DecodeError::InvalidReplacement { .. } => {
                ErrorCode::Reference
            }
            DecodeError::LengthExceedsLimit { .. } | DecodeError::DepthExceeded { .. } => {
                ErrorCode::Limit
            }
            _ => ErrorCode::Malformed,
        }
    }
}

/// Error during binary encoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("integer {value} does not fit in a 61-bit wire integer")]
    IntegerOutOfRange { value: i64 },

    #[error("frame {handle:?} is not owned by this store or its parents")]
    UnknownFrame { handle: FrameId },

    #[error("id slot value must be a string, found {kind}")]
    InvalidId { kind: &'static str },

    #[error("nesting depth exceeds maximum {max}")]
    DepthExceeded { max: usize },

    #[error("zstd compression failed: {0}")]
    CompressionFailed(String),
}

impl EncodeError {
    /// Returns the error category.
    pub fn code(&self) -> ErrorCode {
        match self {
            EncodeError::UnknownFrame { .. } => ErrorCode::Reference,
            EncodeError::DepthExceeded { .. } => ErrorCode::Limit,
            EncodeError::IntegerOutOfRange { .. }
            | EncodeError::InvalidId { .. }
            | EncodeError::CompressionFailed(_) => ErrorCode::Misuse,
        }
    }
}

/// Error while reading the text notation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unterminated string at {line}:{column}")]
    UnterminatedString { line: usize, column: usize },

    #[error("invalid string literal at {line}:{column}: {message}")]
    InvalidString {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("unexpected {found} at {line}:{column}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
        line: usize,
        column: usize,
    },

    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: &'static str },

    #[error("invalid number {text:?} at {line}:{column}")]
    InvalidNumber {
        text: String,
        line: usize,
        column: usize,
    },

    #[error("local reference #{index} is never defined")]
    UndefinedLocal { index: u64 },

    #[error("local #{index} declared twice at {line}:{column}")]
    DuplicateLocal {
        index: u64,
        line: usize,
        column: usize,
    },

    #[error("nesting depth exceeds maximum {max} at {line}:{column}")]
    DepthExceeded {
        max: usize,
        line: usize,
        column: usize,
    },
}

impl ParseError {
    /// Returns the error category.
    pub fn code(&self) -> ErrorCode {
        match self {
            ParseError::UndefinedLocal { .. } | ParseError::DuplicateLocal { .. } => {
                ErrorCode::Reference
            }
            ParseError::DepthExceeded { .. } => ErrorCode::Limit,
            _ => ErrorCode::Malformed,
        }
    }
}

/// Error from a store operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("qualifier chain through {handle:?} is cyclic")]
    QualifierCycle { handle: FrameId },

    #[error("frame {handle:?} is not owned by this store or its parents")]
    UnknownFrame { handle: FrameId },

    #[error("frame {handle:?} belongs to a parent store and cannot be modified")]
    ImmutableFrame { handle: FrameId },
}

impl StoreError {
    /// Returns the error category.
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::QualifierCycle { .. } => ErrorCode::Malformed,
            StoreError::UnknownFrame { .. } => ErrorCode::Reference,
            StoreError::ImmutableFrame { .. } => ErrorCode::Misuse,
        }
    }
}

/// Any error the frame store can report.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    /// Returns the error category.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Decode(e) => e.code(),
            Error::Encode(e) => e.code(),
            Error::Parse(e) => e.code(),
            Error::Store(e) => e.code(),
        }
    }
}
