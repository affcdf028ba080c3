//! zstd-compressed streams.
//!
//! A compressed stream is the `FRMZ` magic, the uncompressed size as a varint,
//! then a single zstd frame holding an ordinary binary stream.

use std::io::Read;

use tracing::debug;

use crate::codec::primitives::{Reader, Writer};
use crate::codec::{EncodeOptions, Encoder};
use crate::error::{DecodeError, EncodeError};
use crate::limits::{MAGIC_COMPRESSED, MAX_STREAM_SIZE};
use crate::model::Value;
use crate::store::Store;

/// Returns true if `input` starts with the compressed-stream magic.
pub fn is_compressed(input: &[u8]) -> bool {
    input.starts_with(MAGIC_COMPRESSED)
}

/// Encodes `value` and compresses the stream with zstd at `level`.
pub fn encode_compressed(store: &Store, value: &Value, level: i32) -> Result<Vec<u8>, EncodeError> {
    let mut encoder = Encoder::with_options(store, EncodeOptions::default());
    encoder.encode(value)?;
    compress(&encoder.finish(), level)
}

/// Wraps an already encoded stream in the compressed framing.
pub fn compress(uncompressed: &[u8], level: i32) -> Result<Vec<u8>, EncodeError> {
    let compressed = zstd::encode_all(uncompressed, level)
        .map_err(|e| EncodeError::CompressionFailed(e.to_string()))?;

    let mut writer = Writer::with_capacity(MAGIC_COMPRESSED.len() + 10 + compressed.len());
    writer.write_bytes(MAGIC_COMPRESSED);
    writer.write_varint(uncompressed.len() as u64);
    writer.write_bytes(&compressed);

    debug!(
        raw = uncompressed.len(),
        compressed = writer.len(),
        level,
        "compressed stream"
    );
    Ok(writer.into_bytes())
}

/// Decompresses a compressed stream, returning the binary stream inside.
pub fn decompress(input: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if !is_compressed(input) {
        let found = input[..input.len().min(MAGIC_COMPRESSED.len())].to_vec();
        return Err(DecodeError::InvalidMagic { found });
    }

    let mut reader = Reader::new(&input[MAGIC_COMPRESSED.len()..]);
    let declared = reader.read_varint("uncompressed_size")?;
    let declared = usize::try_from(declared).unwrap_or(usize::MAX);
    if declared > MAX_STREAM_SIZE {
        return Err(DecodeError::LengthExceedsLimit {
            field: "uncompressed_size",
            len: declared,
            max: MAX_STREAM_SIZE,
        });
    }

    let decoder = zstd::Decoder::new(reader.remaining())
        .map_err(|e| DecodeError::DecompressionFailed(e.to_string()))?;

    // Read one byte past the declared size so oversized payloads are caught
    // without inflating them completely.
    let mut decompressed = Vec::with_capacity(declared);
    decoder
        .take(declared as u64 + 1)
        .read_to_end(&mut decompressed)
        .map_err(|e| DecodeError::DecompressionFailed(e.to_string()))?;

    if decompressed.len() != declared {
        return Err(DecodeError::UncompressedSizeMismatch {
            declared,
            actual: decompressed.len(),
        });
    }

    Ok(decompressed)
}
