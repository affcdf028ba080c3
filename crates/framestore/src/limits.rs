//! Security limits for decoding and parsing.
//!
//! Encoded graphs and text may come from untrusted sources. Every length read
//! from the wire is checked against these bounds before anything is allocated,
//! and recursive descent stops at [`MAX_DEPTH`].

/// Maximum bytes in a varint (ceil(64 / 7)).
pub const MAX_VARINT_BYTES: usize = 10;

/// Maximum byte length of a string, symbol, or link name.
pub const MAX_STRING_LEN: usize = 16 * 1024 * 1024;

/// Maximum number of slots in a single frame.
pub const MAX_SLOTS: usize = 1 << 20;

/// Maximum number of elements in a single array.
pub const MAX_ARRAY_LEN: usize = 1 << 22;

/// Maximum nesting depth of inline frames, arrays, and qualified strings.
pub const MAX_DEPTH: usize = 512;

/// Maximum size of a decompressed stream.
pub const MAX_STREAM_SIZE: usize = 256 * 1024 * 1024;

/// Number of bits available for the argument of a wire tag.
pub const TAG_ARG_BITS: u32 = 61;

/// Smallest integer that fits in an INTEGER tag.
pub const MIN_WIRE_INT: i64 = -(1 << (TAG_ARG_BITS - 1));

/// Largest integer that fits in an INTEGER tag.
pub const MAX_WIRE_INT: i64 = (1 << (TAG_ARG_BITS - 1)) - 1;

/// Marker byte that may open a binary stream.
pub const STREAM_MARKER: u8 = 0x00;

/// Magic bytes for zstd-compressed streams.
pub const MAGIC_COMPRESSED: &[u8; 4] = b"FRMZ";
