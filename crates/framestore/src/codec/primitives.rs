//! Primitive encoding/decoding for the binary frame format.
//!
//! Implements LEB128 varints, wire tags, and length-prefixed strings.

use crate::error::DecodeError;
use crate::limits::{MAX_VARINT_BYTES, TAG_ARG_BITS};

/// Mask selecting the argument bits of a wire tag.
const ARG_MASK: u64 = (1 << TAG_ARG_BITS) - 1;

// =============================================================================
// DECODING
// =============================================================================

/// Reader for decoding binary data.
///
/// Wraps a byte slice and provides methods for reading primitives
/// with bounds checking and error handling.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Creates a new reader from a byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the current position in the data.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the remaining bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Returns true if all data has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Returns the next byte without consuming it.
    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_byte(&mut self, context: &'static str) -> Result<u8, DecodeError> {
        let byte = self
            .peek()
            .ok_or(DecodeError::UnexpectedEof { context })?;
        self.pos += 1;
        Ok(byte)
    }

    /// Reads exactly n bytes.
    #[inline]
    pub fn read_bytes(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], DecodeError> {
        if n > self.data.len() - self.pos {
            return Err(DecodeError::UnexpectedEof { context });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Reads an unsigned varint (LEB128).
    #[inline]
    pub fn read_varint(&mut self, context: &'static str) -> Result<u64, DecodeError> {
        let mut result: u64 = 0;
        let mut shift = 0;

        for _ in 0..MAX_VARINT_BYTES {
            let byte = self.read_byte(context)?;
            let value = (byte & 0x7F) as u64;

            if shift == 63 && value > 1 {
                return Err(DecodeError::VarintOverflow);
            }

            result |= value << shift;

            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }

        Err(DecodeError::VarintTooLong)
    }

    /// Reads a wire tag, returning `(op, argument)`.
    #[inline]
    pub fn read_tag(&mut self) -> Result<(u8, u64), DecodeError> {
        let tag = self.read_varint("tag")?;
        Ok(((tag & 7) as u8, tag >> 3))
    }

    /// Reads `len` bytes of UTF-8 text.
    ///
    /// The length comes from a tag argument, so it is checked against
    /// `max_len` before anything is read.
    pub fn read_str(
        &mut self,
        len: u64,
        max_len: usize,
        field: &'static str,
    ) -> Result<&'a str, DecodeError> {
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        if len > max_len {
            return Err(DecodeError::LengthExceedsLimit {
                field,
                len,
                max: max_len,
            });
        }
        let bytes = self.read_bytes(len, field)?;
        std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8 { field })
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(
        &mut self,
        max_len: usize,
        field: &'static str,
    ) -> Result<String, DecodeError> {
        let len = self.read_varint(field)?;
        self.read_str(len, max_len, field).map(str::to_string)
    }

    /// Reads a varint count and checks it against `max`.
    pub fn read_count(&mut self, max: usize, field: &'static str) -> Result<usize, DecodeError> {
        let count = self.read_varint(field)?;
        check_count(count, max, field)
    }
}

/// Checks a count taken from the wire against a limit.
pub fn check_count(count: u64, max: usize, field: &'static str) -> Result<usize, DecodeError> {
    let len = usize::try_from(count).unwrap_or(usize::MAX);
    if len > max {
        return Err(DecodeError::LengthExceedsLimit { field, len, max });
    }
    Ok(len)
}

// =============================================================================
// ENCODING
// =============================================================================

/// Writer for encoding binary data.
#[derive(Debug, Clone, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Creates a new writer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Creates a new writer with capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Returns the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Returns a reference to the written bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Returns the number of bytes written.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_byte(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    /// Writes raw bytes.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes an unsigned varint (LEB128).
    #[inline]
    pub fn write_varint(&mut self, mut value: u64) {
        // Use stack buffer to batch writes (faster than multiple push calls)
        let mut buf = [0u8; MAX_VARINT_BYTES];
        let mut len = 0;
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            buf[len] = byte;
            len += 1;
            if value == 0 {
                break;
            }
        }
        self.buf.extend_from_slice(&buf[..len]);
    }

    /// Writes a wire tag. Arguments wider than 61 bits are truncated.
    #[inline]
    pub fn write_tag(&mut self, op: u8, arg: u64) {
        self.write_varint(((arg & ARG_MASK) << 3) | (op & 7) as u64);
    }

    /// Writes a tag whose argument is the byte length of `s`, then `s`.
    pub fn write_tagged_str(&mut self, op: u8, s: &str) {
        self.write_tag(op, s.len() as u64);
        self.buf.extend_from_slice(s.as_bytes());
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, s: &str) {
        self.write_varint(s.len() as u64);
        self.buf.extend_from_slice(s.as_bytes());
    }
}

// =============================================================================
// INTEGERS
// =============================================================================

/// Truncates an integer to the 61-bit two's complement tag argument.
#[inline]
pub fn int_to_arg(value: i64) -> u64 {
    (value as u64) & ARG_MASK
}

/// Sign-extends a 61-bit tag argument.
#[inline]
pub fn arg_to_int(arg: u64) -> i64 {
    let shift = 64 - TAG_ARG_BITS;
    ((arg << shift) as i64) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::{MAX_WIRE_INT, MIN_WIRE_INT};

    #[test]
    fn test_varint_roundtrip() {
        let test_values = [0u64, 1, 127, 128, 255, 256, 16383, 16384, u64::MAX];

        for v in test_values {
            let mut writer = Writer::new();
            writer.write_varint(v);

            let mut reader = Reader::new(writer.as_bytes());
            let decoded = reader.read_varint("test").unwrap();
            assert_eq!(v, decoded, "failed for {}", v);
            assert!(reader.is_empty());
        }
    }

    #[test]
    fn test_tag_layout() {
        let mut writer = Writer::new();
        writer.write_tag(2, 5);
        assert_eq!(writer.as_bytes(), &[(5 << 3) | 2]);

        let mut reader = Reader::new(writer.as_bytes());
        assert_eq!(reader.read_tag().unwrap(), (2, 5));
    }

    #[test]
    fn test_tag_max_argument() {
        let arg = (1u64 << TAG_ARG_BITS) - 1;
        let mut writer = Writer::new();
        writer.write_tag(7, arg);
        let mut reader = Reader::new(writer.as_bytes());
        assert_eq!(reader.read_tag().unwrap(), (7, arg));
    }

    #[test]
    fn test_int_sign_extension() {
        for v in [0i64, 1, -1, 42, -42, MAX_WIRE_INT, MIN_WIRE_INT] {
            assert_eq!(arg_to_int(int_to_arg(v)), v, "failed for {}", v);
        }
        assert_eq!(int_to_arg(-1), (1 << TAG_ARG_BITS) - 1);
    }

    #[test]
    fn test_string_roundtrip() {
        let test_strings = ["", "hello", "hello world", "unicode: \u{1F600}"];

        for s in test_strings {
            let mut writer = Writer::new();
            writer.write_string(s);

            let mut reader = Reader::new(writer.as_bytes());
            let decoded = reader.read_string(1000, "test").unwrap();
            assert_eq!(s, decoded);
        }
    }

    #[test]
    fn test_tagged_str() {
        let mut writer = Writer::new();
        writer.write_tagged_str(3, "abc");
        let mut reader = Reader::new(writer.as_bytes());
        let (op, len) = reader.read_tag().unwrap();
        assert_eq!(op, 3);
        assert_eq!(reader.read_str(len, 10, "test").unwrap(), "abc");
    }

    #[test]
    fn test_varint_too_long() {
        // 11 continuation bytes should fail
        let data = [0x80u8; 11];
        let mut reader = Reader::new(&data);
        let result = reader.read_varint("test");
        assert!(matches!(result, Err(DecodeError::VarintTooLong)));
    }

    #[test]
    fn test_varint_overflow() {
        let mut data = [0xFFu8; 10];
        data[9] = 0x02;
        let mut reader = Reader::new(&data);
        let result = reader.read_varint("test");
        assert!(matches!(result, Err(DecodeError::VarintOverflow)));
    }

    #[test]
    fn test_string_too_long() {
        let mut writer = Writer::new();
        writer.write_varint(1000); // length
        writer.write_bytes(&[0u8; 1000]);

        let mut reader = Reader::new(writer.as_bytes());
        let result = reader.read_string(100, "test"); // max 100
        assert!(matches!(
            result,
            Err(DecodeError::LengthExceedsLimit { max: 100, .. })
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let data = [0xFFu8, 0xFE];
        let mut reader = Reader::new(&data);
        let result = reader.read_str(2, 10, "test");
        assert!(matches!(result, Err(DecodeError::InvalidUtf8 { field: "test" })));
    }

    #[test]
    fn test_unexpected_eof() {
        let data = [0u8; 5];
        let mut reader = Reader::new(&data);
        let result = reader.read_bytes(10, "test");
        assert!(matches!(result, Err(DecodeError::UnexpectedEof { .. })));
    }
}
