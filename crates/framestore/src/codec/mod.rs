//! Binary encoding/decoding for frame graphs.
//!
//! Every item on the wire starts with a varint tag: the low 3 bits select an
//! opcode and the remaining 61 bits carry its argument. Strings, links, inline
//! frames, arrays and qualified strings register an entry in a reference table
//! shared by encoder and decoder, so later occurrences are written as a short
//! back-reference.

pub mod compress;
pub mod decoder;
pub mod encoder;
pub mod primitives;

pub use compress::{decompress, encode_compressed, is_compressed};
pub use decoder::Decoder;
pub use encoder::{EncodeOptions, Encoder};
pub use primitives::{Reader, Writer};

use tracing::debug;

use crate::error::{DecodeError, EncodeError};
use crate::model::Value;
use crate::store::Store;

// Opcodes
pub(crate) const OP_REF: u8 = 0;
pub(crate) const OP_FRAME: u8 = 1;
pub(crate) const OP_STRING: u8 = 2;
pub(crate) const OP_SYMBOL: u8 = 3;
pub(crate) const OP_LINK: u8 = 4;
pub(crate) const OP_INTEGER: u8 = 5;
pub(crate) const OP_FLOAT: u8 = 6;
pub(crate) const OP_SPECIAL: u8 = 7;

// SPECIAL sub-codes
pub(crate) const SPECIAL_NULL: u64 = 1;
pub(crate) const SPECIAL_ID: u64 = 2;
pub(crate) const SPECIAL_ISA: u64 = 3;
pub(crate) const SPECIAL_IS: u64 = 4;
pub(crate) const SPECIAL_ARRAY: u64 = 5;
pub(crate) const SPECIAL_INDEX: u64 = 6;
pub(crate) const SPECIAL_RESOLVE: u64 = 7;
pub(crate) const SPECIAL_QSTRING: u64 = 8;
pub(crate) const SPECIAL_NAME: u64 = 9;
pub(crate) const SPECIAL_FALSE: u64 = 10;
pub(crate) const SPECIAL_TRUE: u64 = 11;

/// Encodes a single value with default options.
pub fn encode(store: &Store, value: &Value) -> Result<Vec<u8>, EncodeError> {
    let mut encoder = Encoder::new(store);
    encoder.encode(value)?;
    let bytes = encoder.finish();
    debug!(bytes = bytes.len(), kind = value.kind(), "encoded value");
    Ok(bytes)
}

/// Decodes every value in `input` into `store`, returning the last one.
///
/// An empty stream decodes to [`Value::Null`].
pub fn decode(store: &mut Store, input: &[u8]) -> Result<Value, DecodeError> {
    Decoder::new(store, input).read_all()
}
