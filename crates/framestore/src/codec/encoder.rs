//! Binary encoder.
//!
//! The encoder walks a value graph and assigns a reference index to every
//! item that the decoder will register, in the same order the decoder sees
//! them. An encoder instance keeps its tables across [`Encoder::encode`]
//! calls, so several top-level values written to one stream share references.

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::codec::primitives::{int_to_arg, Writer};
use crate::codec::{
    OP_FLOAT, OP_FRAME, OP_INTEGER, OP_LINK, OP_REF, OP_SPECIAL, OP_STRING, OP_SYMBOL,
    SPECIAL_ARRAY, SPECIAL_FALSE, SPECIAL_ID, SPECIAL_IS, SPECIAL_ISA, SPECIAL_NAME,
    SPECIAL_NULL, SPECIAL_QSTRING, SPECIAL_RESOLVE, SPECIAL_TRUE,
};
use crate::error::EncodeError;
use crate::limits::{MAX_DEPTH, MAX_WIRE_INT, MIN_WIRE_INT, STREAM_MARKER};
use crate::model::{Frame, FrameId, QString, Slot, Value};
use crate::store::Store;

/// Options for encoding.
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    /// Write the `0x00` marker that opens a binary stream.
    ///
    /// Streams without the marker decode the same way, but cannot be told
    /// apart from text by [`Store::parse`].
    pub marker: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self { marker: true }
    }
}

impl EncodeOptions {
    /// Creates default encoding options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for embedding values in a stream that has its own framing.
    pub fn bare() -> Self {
        Self { marker: false }
    }
}

/// Key of an entry in the encoder's reference table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RefKey {
    Frame(FrameId),
    Text(String),
    Qualified(QString),
}

/// Encoding state of a tracked item. Items not in the table are unresolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    /// Written by name only; content may still follow as a RESOLVE.
    Linked(u64),
    /// Written with full content.
    Encoded(u64),
    /// A string or qualified string.
    String(u64),
}

/// Streaming encoder for one store.
#[derive(Debug)]
pub struct Encoder<'s> {
    store: &'s Store,
    writer: Writer,
    refs: FxHashMap<RefKey, Status>,
    next: u64,
    depth: usize,
}

impl<'s> Encoder<'s> {
    /// Creates an encoder with default options.
    pub fn new(store: &'s Store) -> Self {
        Self::with_options(store, EncodeOptions::default())
    }

    pub fn with_options(store: &'s Store, options: EncodeOptions) -> Self {
        let mut writer = Writer::with_capacity(256);
        if options.marker {
            writer.write_byte(STREAM_MARKER);
        }
        Self {
            store,
            writer,
            refs: FxHashMap::default(),
            next: 0,
            depth: 0,
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.writer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writer.is_empty()
    }

    /// Returns the encoded stream.
    pub fn finish(self) -> Vec<u8> {
        self.writer.into_bytes()
    }

    /// Appends a top-level value to the stream.
    ///
    /// A top-level frame is written with its content even when it is named;
    /// frames nested inside it are linked by name where they have one.
    pub fn encode(&mut self, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Frame(handle) if !handle.is_reserved() => self.encode_frame(*handle),
            _ => self.encode_value(value),
        }
    }

    fn register(&mut self, key: RefKey, status: impl FnOnce(u64) -> Status) -> u64 {
        let index = self.next;
        self.next += 1;
        self.refs.insert(key, status(index));
        index
    }

    fn frame(&self, handle: FrameId) -> Result<&'s Frame, EncodeError> {
        self.store
            .get(handle)
            .ok_or(EncodeError::UnknownFrame { handle })
    }

    /// Writes a frame with its content, or a reference if that already
    /// happened.
    fn encode_frame(&mut self, handle: FrameId) -> Result<(), EncodeError> {
        let frame = self.frame(handle)?;
        match self.refs.get(&RefKey::Frame(handle)).copied() {
            Some(Status::Encoded(index)) => {
                self.writer.write_tag(OP_REF, index);
                Ok(())
            }
            Some(Status::Linked(index)) if frame.is_proxy() => {
                self.writer.write_tag(OP_REF, index);
                Ok(())
            }
            Some(Status::Linked(index)) => {
                trace!(?handle, index, "resolving linked frame");
                self.refs.insert(RefKey::Frame(handle), Status::Encoded(index));
                self.writer.write_tag(OP_SPECIAL, SPECIAL_RESOLVE);
                self.writer.write_varint(frame.len() as u64);
                self.writer.write_varint(index);
                self.encode_slots(frame.slots())
            }
            _ => {
                self.register(RefKey::Frame(handle), Status::Encoded);
                self.writer.write_tag(OP_FRAME, frame.len() as u64);
                self.encode_slots(frame.slots())
            }
        }
    }

    fn encode_slots(&mut self, slots: &[Slot]) -> Result<(), EncodeError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EncodeError::DepthExceeded { max: MAX_DEPTH });
        }
        for slot in slots {
            self.encode_value(&slot.name)?;
            match (&slot.name, &slot.value) {
                (Value::Frame(FrameId::ID), Value::Str(id)) => {
                    self.writer.write_tagged_str(OP_SYMBOL, id);
                }
                (Value::Frame(FrameId::ID), other) => {
                    return Err(EncodeError::InvalidId { kind: other.kind() });
                }
                (_, value) => self.encode_value(value)?,
            }
        }
        self.depth -= 1;
        Ok(())
    }

    /// Writes a nested value: named frames by link, everything else inline.
    fn encode_value(&mut self, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Null => self.writer.write_tag(OP_SPECIAL, SPECIAL_NULL),
            Value::Bool(false) => self.writer.write_tag(OP_SPECIAL, SPECIAL_FALSE),
            Value::Bool(true) => self.writer.write_tag(OP_SPECIAL, SPECIAL_TRUE),
            Value::Int(v) => {
                if !(MIN_WIRE_INT..=MAX_WIRE_INT).contains(v) {
                    return Err(EncodeError::IntegerOutOfRange { value: *v });
                }
                self.writer.write_tag(OP_INTEGER, int_to_arg(*v));
            }
            Value::Float(f) => self.writer.write_tag(OP_FLOAT, u64::from(f.to_bits() >> 2)),
            Value::Str(s) => self.encode_str(s),
            Value::Qualified(q) => return self.encode_qualified(q),
            Value::Frame(handle) => return self.encode_link(*handle),
            Value::Array(items) => {
                self.next += 1;
                self.writer.write_tag(OP_SPECIAL, SPECIAL_ARRAY);
                self.writer.write_varint(items.len() as u64);
                self.depth += 1;
                if self.depth > MAX_DEPTH {
                    return Err(EncodeError::DepthExceeded { max: MAX_DEPTH });
                }
                for item in items {
                    self.encode_value(item)?;
                }
                self.depth -= 1;
            }
        }
        Ok(())
    }

    fn encode_str(&mut self, s: &str) {
        let key = RefKey::Text(s.to_string());
        if let Some(Status::String(index)) = self.refs.get(&key) {
            self.writer.write_tag(OP_REF, *index);
            return;
        }
        self.register(key, Status::String);
        self.writer.write_tagged_str(OP_STRING, s);
    }

    fn encode_qualified(&mut self, q: &QString) -> Result<(), EncodeError> {
        let key = RefKey::Qualified(q.clone());
        if let Some(Status::String(index)) = self.refs.get(&key) {
            self.writer.write_tag(OP_REF, *index);
            return Ok(());
        }
        // Registered before the qualifier, matching the decoder.
        self.register(key, Status::String);
        self.writer.write_tag(OP_SPECIAL, SPECIAL_QSTRING);
        self.writer.write_string(&q.text);
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EncodeError::DepthExceeded { max: MAX_DEPTH });
        }
        self.encode_value(&q.qualifier)?;
        self.depth -= 1;
        Ok(())
    }

    fn encode_link(&mut self, handle: FrameId) -> Result<(), EncodeError> {
        let special = match handle {
            FrameId::ID => Some(SPECIAL_ID),
            FrameId::ISA => Some(SPECIAL_ISA),
            FrameId::IS => Some(SPECIAL_IS),
            FrameId::NAME => Some(SPECIAL_NAME),
            _ => None,
        };
        if let Some(code) = special {
            self.writer.write_tag(OP_SPECIAL, code);
            return Ok(());
        }

        match self.refs.get(&RefKey::Frame(handle)) {
            Some(Status::Linked(index) | Status::Encoded(index)) => {
                self.writer.write_tag(OP_REF, *index);
                return Ok(());
            }
            _ => {}
        }

        let store = self.store;
        let frame = self.frame(handle)?;
        let name = if frame.is_anonymous() {
            None
        } else {
            store.id_of(handle)
        };
        match name {
            Some(name) => {
                self.register(RefKey::Frame(handle), Status::Linked);
                self.writer.write_tagged_str(OP_LINK, name);
                Ok(())
            }
            None => self.encode_frame(handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FrameBuilder;

    #[test]
    fn test_marker_option() {
        let store = Store::new();
        let mut with = Encoder::new(&store);
        with.encode(&Value::Null).unwrap();
        assert_eq!(with.finish(), vec![0x00, (SPECIAL_NULL << 3) as u8 | OP_SPECIAL]);

        let mut without = Encoder::with_options(&store, EncodeOptions::bare());
        without.encode(&Value::Bool(true)).unwrap();
        assert_eq!(without.finish(), vec![(SPECIAL_TRUE << 3) as u8 | OP_SPECIAL]);
    }

    #[test]
    fn test_id_slot_written_as_symbol() {
        let mut store = Store::new();
        let f = FrameBuilder::new().id("ab").build(&mut store);
        let mut encoder = Encoder::with_options(&store, EncodeOptions::bare());
        encoder.encode(&Value::Frame(f)).unwrap();
        assert_eq!(
            encoder.finish(),
            vec![
                (1 << 3) | OP_FRAME,
                ((SPECIAL_ID << 3) as u8) | OP_SPECIAL,
                (2 << 3) | OP_SYMBOL,
                b'a',
                b'b',
            ]
        );
    }

    #[test]
    fn test_nested_named_frame_is_linked() {
        let mut store = Store::new();
        let child = FrameBuilder::new().id("c").slot("v", 1i64).build(&mut store);
        let parent = FrameBuilder::new().is(child).build(&mut store);

        let mut encoder = Encoder::with_options(&store, EncodeOptions::bare());
        encoder.encode(&Value::Frame(parent)).unwrap();
        assert_eq!(
            encoder.finish(),
            vec![
                (1 << 3) | OP_FRAME,
                ((SPECIAL_IS << 3) as u8) | OP_SPECIAL,
                (1 << 3) | OP_LINK,
                b'c',
            ]
        );
    }

    #[test]
    fn test_linked_frame_resolved_later() {
        let mut store = Store::new();
        let child = FrameBuilder::new().id("c").build(&mut store);
        let parent = FrameBuilder::new().is(child).build(&mut store);

        let mut encoder = Encoder::with_options(&store, EncodeOptions::bare());
        encoder.encode(&Value::Frame(parent)).unwrap();
        let before = encoder.len();
        encoder.encode(&Value::Frame(child)).unwrap();
        let bytes = encoder.finish();
        // Parent took reference 0, the link to `c` reference 1.
        assert_eq!(
            &bytes[before..],
            &[
                ((SPECIAL_RESOLVE << 3) as u8) | OP_SPECIAL,
                1,
                1,
                ((SPECIAL_ID << 3) as u8) | OP_SPECIAL,
                (1 << 3) | OP_SYMBOL,
                b'c',
            ]
        );
    }

    #[test]
    fn test_linked_proxy_stays_reference() {
        let mut store = Store::new();
        let proxy = store.lookup("elsewhere");
        let parent = FrameBuilder::new().is(proxy).build(&mut store);

        let mut encoder = Encoder::with_options(&store, EncodeOptions::bare());
        encoder.encode(&Value::Frame(parent)).unwrap();
        let before = encoder.len();
        encoder.encode(&Value::Frame(proxy)).unwrap();
        let bytes = encoder.finish();
        assert_eq!(&bytes[before..], &[(1 << 3) | OP_REF]);
    }

    #[test]
    fn test_non_string_id_rejected() {
        let mut store = Store::new();
        let en = store.lookup("/lang/en");
        let cases = [
            (Value::Int(5), "int"),
            (Value::Frame(en), "frame"),
            (Value::from(QString::new("q", en)), "qstring"),
        ];
        for (id, kind) in cases {
            let f = store.frame(vec![Slot::new(FrameId::ID, id), Slot::new(FrameId::NAME, "n")]);
            let err = Encoder::new(&store).encode(&Value::Frame(f)).unwrap_err();
            assert_eq!(err, EncodeError::InvalidId { kind });
        }
    }

    #[test]
    fn test_depth_limit() {
        let mut value = Value::Null;
        for _ in 0..=MAX_DEPTH {
            value = Value::Array(vec![value]);
        }
        let store = Store::new();
        let mut encoder = Encoder::new(&store);
        assert_eq!(
            encoder.encode(&value).unwrap_err(),
            EncodeError::DepthExceeded { max: MAX_DEPTH }
        );
    }
}
