//! Binary decoder.
//!
//! Decoding builds frames directly in a [`Store`]. Each call to
//! [`Decoder::read`] is atomic: if it fails, every frame, binding, and
//! reference-table entry it created is discarded and overwritten frames get
//! their old content back.

use tracing::{debug, trace};

use crate::codec::primitives::{arg_to_int, check_count, Reader};
use crate::codec::{
    OP_FLOAT, OP_FRAME, OP_INTEGER, OP_LINK, OP_REF, OP_SPECIAL, OP_STRING, OP_SYMBOL,
    SPECIAL_ARRAY, SPECIAL_FALSE, SPECIAL_ID, SPECIAL_INDEX, SPECIAL_IS, SPECIAL_ISA,
    SPECIAL_NAME, SPECIAL_NULL, SPECIAL_QSTRING, SPECIAL_RESOLVE, SPECIAL_TRUE,
};
use crate::error::DecodeError;
use crate::limits::{MAX_ARRAY_LEN, MAX_DEPTH, MAX_SLOTS, MAX_STRING_LEN, STREAM_MARKER};
use crate::model::{Frame, FrameId, QString, Slot, Value};
use crate::store::Store;

/// Streaming decoder writing into a store.
#[derive(Debug)]
pub struct Decoder<'s, 'a> {
    store: &'s mut Store,
    reader: Reader<'a>,
    /// Reference table. `None` marks an entry whose value is still being read.
    refs: Vec<Option<Value>>,
    /// First handle this decoder can allocate.
    first: FrameId,
    /// Parent frames replaced by local ones during the current read.
    shadowed: Vec<(FrameId, FrameId)>,
    depth: usize,
}

impl<'s, 'a> Decoder<'s, 'a> {
    /// Creates a decoder for `input`, skipping the stream marker if present.
    pub fn new(store: &'s mut Store, input: &'a [u8]) -> Self {
        let input = input.strip_prefix(&[STREAM_MARKER]).unwrap_or(input);
        let first = store.next_handle();
        Self {
            store,
            reader: Reader::new(input),
            refs: Vec::new(),
            first,
            shadowed: Vec::new(),
            depth: 0,
        }
    }

    /// Returns true once the whole input has been consumed.
    pub fn is_done(&self) -> bool {
        self.reader.is_empty()
    }

    /// Reads the next top-level value.
    pub fn read(&mut self) -> Result<Value, DecodeError> {
        let refs = self.refs.len();
        let owned = self.store.begin();
        self.depth = 0;
        self.shadowed.clear();
        match self.read_value() {
            Ok(value) => {
                if owned {
                    self.store.commit();
                }
                Ok(value)
            }
            Err(err) => {
                debug!(position = self.reader.position(), error = %err, "decode failed");
                if owned {
                    self.store.rollback();
                }
                self.refs.truncate(refs);
                for (global, local) in self.shadowed.drain(..).rev() {
                    for entry in self.refs.iter_mut().flatten() {
                        entry.replace_frame(local, global);
                    }
                }
                Err(err)
            }
        }
    }

    /// Reads every remaining value and returns the last one.
    ///
    /// Returns [`Value::Null`] for an empty stream.
    pub fn read_all(&mut self) -> Result<Value, DecodeError> {
        let mut last = Value::Null;
        let mut count = 0usize;
        while !self.is_done() {
            last = self.read()?;
            count += 1;
        }
        debug!(values = count, refs = self.refs.len(), "decoded stream");
        Ok(last)
    }

    fn push(&mut self, value: Option<Value>) -> usize {
        self.refs.push(value);
        self.refs.len() - 1
    }

    fn enter(&mut self) -> Result<(), DecodeError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(DecodeError::DepthExceeded { max: MAX_DEPTH });
        }
        Ok(())
    }

    fn read_value(&mut self) -> Result<Value, DecodeError> {
        let (op, arg) = self.reader.read_tag()?;
        match op {
            OP_REF => self.lookup_ref(arg),
            OP_FRAME => {
                let count = check_count(arg, MAX_SLOTS, "slots")?;
                self.read_frame(None, count)
            }
            OP_STRING => {
                let s = self.reader.read_str(arg, MAX_STRING_LEN, "string")?;
                let value = Value::Str(s.to_string());
                self.push(Some(value.clone()));
                Ok(value)
            }
            OP_SYMBOL => {
                let name = self.reader.read_str(arg, MAX_STRING_LEN, "symbol")?;
                Ok(Value::Frame(self.store.lookup(name)))
            }
            OP_LINK => {
                let name = self.reader.read_str(arg, MAX_STRING_LEN, "link")?;
                let value = Value::Frame(self.store.lookup(name));
                self.push(Some(value.clone()));
                Ok(value)
            }
            OP_INTEGER => Ok(Value::Int(arg_to_int(arg))),
            OP_FLOAT => {
                // The tag carries the top 30 bits of the pattern.
                if arg >= 1 << 30 {
                    return Err(DecodeError::InvalidFloat { bits: arg });
                }
                Ok(Value::Float(f32::from_bits((arg as u32) << 2)))
            }
            OP_SPECIAL => self.read_special(arg),
            _ => unreachable!("opcode is three bits"),
        }
    }

    fn lookup_ref(&self, index: u64) -> Result<Value, DecodeError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.refs.get(i))
            .and_then(|entry| entry.clone())
            .ok_or(DecodeError::InvalidReference { index })
    }

    fn read_special(&mut self, code: u64) -> Result<Value, DecodeError> {
        match code {
            SPECIAL_NULL => Ok(Value::Null),
            SPECIAL_ID => Ok(Value::Frame(FrameId::ID)),
            SPECIAL_ISA => Ok(Value::Frame(FrameId::ISA)),
            SPECIAL_IS => Ok(Value::Frame(FrameId::IS)),
            SPECIAL_NAME => Ok(Value::Frame(FrameId::NAME)),
            SPECIAL_FALSE => Ok(Value::Bool(false)),
            SPECIAL_TRUE => Ok(Value::Bool(true)),
            SPECIAL_ARRAY => {
                let len = self.reader.read_count(MAX_ARRAY_LEN, "array")?;
                let index = self.push(None);
                self.enter()?;
                let mut items = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    items.push(self.read_value()?);
                }
                self.depth -= 1;
                let value = Value::Array(items);
                self.refs[index] = Some(value.clone());
                Ok(value)
            }
            SPECIAL_INDEX => {
                let index = self.reader.read_varint("index")?;
                u32::try_from(index)
                    .ok()
                    .and_then(Value::index)
                    .ok_or(DecodeError::InvalidIndex { index })
            }
            SPECIAL_RESOLVE => {
                let count = self.reader.read_count(MAX_SLOTS, "slots")?;
                let index = self.reader.read_varint("resolve")?;
                let handle = usize::try_from(index)
                    .ok()
                    .and_then(|i| self.refs.get(i))
                    .and_then(|v| v.as_ref()?.as_frame())
                    .filter(|h| !h.is_reserved() && self.store.contains(*h))
                    .ok_or(DecodeError::InvalidReplacement { index })?;
                let target = if self.store.owns(handle) {
                    handle
                } else {
                    self.shadow(handle)
                };
                self.read_frame(Some(target), count)
            }
            SPECIAL_QSTRING => {
                let text = self.reader.read_string(MAX_STRING_LEN, "qstring")?;
                let index = self.push(None);
                self.enter()?;
                let qualifier = self.read_value()?;
                self.depth -= 1;
                let value = Value::from(QString { text, qualifier });
                self.refs[index] = Some(value.clone());
                Ok(value)
            }
            _ => Err(DecodeError::InvalidSpecial { code }),
        }
    }

    /// Reads `count` slots into a frame.
    ///
    /// With no target a new frame is allocated and registered in the
    /// reference table before its slots are read, so they can refer back to
    /// it. If one of its `id` slots names a frame this store already owns,
    /// the new frame is merged into that one and every reference read so far
    /// is redirected.
    fn read_frame(&mut self, target: Option<FrameId>, count: usize) -> Result<Value, DecodeError> {
        self.enter()?;
        let (mut handle, start) = match target {
            Some(handle) => (handle, None),
            None => {
                let handle = self.store.alloc(Frame::new());
                let index = self.push(Some(Value::Frame(handle)));
                (handle, Some(index))
            }
        };
        let placeholder = handle;

        let mut slots = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let name = self.read_value()?;
            let value = if name == Value::Frame(FrameId::ID) {
                let id = self.read_id()?;
                if let Some(start) = start.filter(|_| handle == placeholder) {
                    if let Some(existing) = self.store.local_binding(&id) {
                        trace!(id = id.as_str(), ?placeholder, ?existing, "unified frame");
                        handle = existing;
                        self.redirect(placeholder, existing, start, &mut slots);
                        self.store.release(placeholder);
                    }
                }
                Value::Str(id)
            } else {
                self.read_value()?
            };
            slots.push(Slot { name, value });
        }

        self.store.install(handle, slots);
        self.depth -= 1;
        Ok(Value::Frame(handle))
    }

    /// Reads the value of an `id` slot.
    fn read_id(&mut self) -> Result<String, DecodeError> {
        let (op, arg) = self.reader.read_tag()?;
        let id = match op {
            OP_SYMBOL => self.reader.read_str(arg, MAX_STRING_LEN, "id")?.to_string(),
            OP_STRING => {
                let id = self.reader.read_str(arg, MAX_STRING_LEN, "id")?.to_string();
                self.push(Some(Value::Str(id.clone())));
                id
            }
            OP_REF => match self.lookup_ref(arg)? {
                Value::Str(id) => id,
                _ => return Err(DecodeError::InvalidIdValue),
            },
            _ => return Err(DecodeError::InvalidIdValue),
        };
        Ok(id)
    }

    /// Replaces a parent store's frame with a new local one everywhere this
    /// decoder has put it, so a RESOLVE can fill in content that shadows it.
    fn shadow(&mut self, global: FrameId) -> FrameId {
        let local = self.store.alloc(Frame::new());
        trace!(?global, ?local, "shadowing global frame");
        for entry in self.refs.iter_mut().flatten() {
            entry.replace_frame(global, local);
        }
        self.store.redirect(self.first, global, local);
        self.shadowed.push((global, local));
        local
    }

    /// Rewrites every reference to `from` made since reference `start` so it
    /// points at `to`.
    fn redirect(&mut self, from: FrameId, to: FrameId, start: usize, slots: &mut [Slot]) {
        for slot in slots.iter_mut() {
            slot.name.replace_frame(from, to);
            slot.value.replace_frame(from, to);
        }
        for entry in self.refs[start..].iter_mut().flatten() {
            entry.replace_frame(from, to);
        }
        self.store.redirect(FrameId(from.0 + 1), from, to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::primitives::Writer;
    use crate::error::ErrorCode;
    use crate::model::FrameBuilder;

    fn special(code: u64) -> u8 {
        ((code << 3) as u8) | OP_SPECIAL
    }

    #[test]
    fn test_specials() {
        let input = [
            special(SPECIAL_NULL),
            special(SPECIAL_TRUE),
            special(SPECIAL_FALSE),
            special(SPECIAL_NAME),
        ];
        let mut store = Store::new();
        let mut decoder = Decoder::new(&mut store, &input);
        assert_eq!(decoder.read().unwrap(), Value::Null);
        assert_eq!(decoder.read().unwrap(), Value::Bool(true));
        assert_eq!(decoder.read().unwrap(), Value::Bool(false));
        assert_eq!(decoder.read().unwrap(), Value::Frame(FrameId::NAME));
        assert!(decoder.is_done());
    }

    #[test]
    fn test_integer_sign_extension() {
        let mut writer = Writer::new();
        writer.write_tag(OP_INTEGER, (1 << 61) - 1);
        let mut store = Store::new();
        assert_eq!(store.decode(writer.as_bytes()).unwrap(), Value::Int(-1));
    }

    #[test]
    fn test_legacy_index() {
        let mut writer = Writer::new();
        writer.write_tag(OP_SPECIAL, SPECIAL_INDEX);
        writer.write_varint(12);
        let mut store = Store::new();
        let value = store.decode(writer.as_bytes()).unwrap();
        assert_eq!(value.as_index(), Some(12));

        let mut writer = Writer::new();
        writer.write_tag(OP_SPECIAL, SPECIAL_INDEX);
        writer.write_varint(1 << 30);
        assert_eq!(
            store.decode(writer.as_bytes()).unwrap_err(),
            DecodeError::InvalidIndex { index: 1 << 30 }
        );
    }

    #[test]
    fn test_invalid_reference() {
        let mut store = Store::new();
        let err = store.decode(&[(3 << 3) | OP_REF]).unwrap_err();
        assert_eq!(err, DecodeError::InvalidReference { index: 3 });
        assert_eq!(err.code(), ErrorCode::Reference);
    }

    #[test]
    fn test_reference_into_open_array() {
        // ARRAY [REF 0]: the array refers to itself while still being read.
        let input = [special(SPECIAL_ARRAY), 1, OP_REF];
        let mut store = Store::new();
        let err = store.decode(&input).unwrap_err();
        assert_eq!(err, DecodeError::InvalidReference { index: 0 });
    }

    #[test]
    fn test_invalid_replacement() {
        // String at reference 0, then RESOLVE of reference 0.
        let mut writer = Writer::new();
        writer.write_tagged_str(OP_STRING, "s");
        writer.write_tag(OP_SPECIAL, SPECIAL_RESOLVE);
        writer.write_varint(0);
        writer.write_varint(0);
        let mut store = Store::new();
        let err = store.decode(writer.as_bytes()).unwrap_err();
        assert_eq!(err, DecodeError::InvalidReplacement { index: 0 });
    }

    #[test]
    fn test_invalid_special() {
        let mut store = Store::new();
        let err = store.decode(&[special(12)]).unwrap_err();
        assert_eq!(err, DecodeError::InvalidSpecial { code: 12 });
    }

    #[test]
    fn test_invalid_float() {
        let mut writer = Writer::new();
        writer.write_tag(OP_FLOAT, 1 << 40);
        let mut store = Store::new();
        let err = store.decode(writer.as_bytes()).unwrap_err();
        assert_eq!(err, DecodeError::InvalidFloat { bits: 1 << 40 });
    }

    #[test]
    fn test_truncated_input() {
        let mut store = Store::new();
        let bytes = {
            let f = FrameBuilder::new().id("x").name("X").build(&mut store);
            store.encode(&Value::Frame(f)).unwrap()
        };
        let mut other = Store::new();
        let err = other.decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_failed_read_rolls_back() {
        let mut store = Store::new();
        let existing = FrameBuilder::new().id("x").name("old").build(&mut store);
        let before = store.len();

        // FRAME {id: x, name: "new", link: unknown, <bad special>}
        let mut writer = Writer::new();
        writer.write_tag(OP_FRAME, 3);
        writer.write_tag(OP_SPECIAL, SPECIAL_ID);
        writer.write_tagged_str(OP_SYMBOL, "x");
        writer.write_tag(OP_SPECIAL, SPECIAL_NAME);
        writer.write_tagged_str(OP_STRING, "new");
        writer.write_tagged_str(OP_LINK, "unknown");
        writer.write_tag(OP_SPECIAL, 99);

        assert!(store.decode(writer.as_bytes()).is_err());
        assert_eq!(store.len(), before);
        assert_eq!(store.find("unknown"), None);
        assert_eq!(store.find("x"), Some(existing));
        let frame = store.get(existing).unwrap();
        assert_eq!(frame.get(FrameId::NAME), Some(&Value::from("old")));
    }

    #[test]
    fn test_failed_read_keeps_earlier_values() {
        let mut writer = Writer::new();
        writer.write_tagged_str(OP_LINK, "kept");
        writer.write_tagged_str(OP_LINK, "dropped");
        writer.write_tag(OP_REF, 7);

        let mut store = Store::new();
        let mut decoder = Decoder::new(&mut store, writer.as_bytes());
        assert!(decoder.read().is_ok());
        assert!(decoder.read().is_ok());
        assert!(decoder.read().is_err());
        assert_eq!(decoder.refs.len(), 2);
        drop(decoder);
        assert!(store.find("kept").is_some());
        assert!(store.find("dropped").is_some());
    }

    #[test]
    fn test_id_unifies_with_existing_frame() {
        let mut store = Store::new();
        let proxy = store.lookup("x");

        // FRAME {self: REF 0, id: x}: the self reference precedes the id.
        let mut writer = Writer::new();
        writer.write_tag(OP_FRAME, 2);
        writer.write_tagged_str(OP_LINK, "self");
        writer.write_tag(OP_REF, 0);
        writer.write_tag(OP_SPECIAL, SPECIAL_ID);
        writer.write_tagged_str(OP_SYMBOL, "x");

        let value = store.decode(writer.as_bytes()).unwrap();
        assert_eq!(value, Value::Frame(proxy));
        let frame = store.get(proxy).unwrap();
        assert!(frame.is_public());
        let me = store.find("self").unwrap();
        assert_eq!(frame.get(me), Some(&Value::Frame(proxy)));
    }

    #[test]
    fn test_latest_definition_wins() {
        let mut store = Store::new();
        let first = store.parse_text("{=x name: \"one\"}").unwrap();
        let second = store.parse_text("{=x name: \"two\"}").unwrap();
        assert_eq!(first, second);
        let frame = store.get(first.as_frame().unwrap()).unwrap();
        assert_eq!(frame.get(FrameId::NAME), Some(&Value::from("two")));
    }

    #[test]
    fn test_id_from_string_and_ref() {
        // FRAME {id: "a"}, FRAME {id: REF 1}
        let mut writer = Writer::new();
        writer.write_tag(OP_FRAME, 1);
        writer.write_tag(OP_SPECIAL, SPECIAL_ID);
        writer.write_tagged_str(OP_STRING, "a");
        writer.write_tag(OP_FRAME, 1);
        writer.write_tag(OP_SPECIAL, SPECIAL_ID);
        writer.write_tag(OP_REF, 1);

        let mut store = Store::new();
        let mut decoder = Decoder::new(&mut store, writer.as_bytes());
        let a = decoder.read().unwrap();
        let b = decoder.read().unwrap();
        drop(decoder);
        assert_eq!(a, b);
        assert_eq!(store.find("a"), a.as_frame());
    }

    #[test]
    fn test_redecoding_reuses_frames() {
        let mut source = Store::new();
        let f = FrameBuilder::new().id("x").name("X").build(&mut source);
        let bytes = source.encode(&Value::Frame(f)).unwrap();

        let mut store = Store::new();
        let first = store.decode(&bytes).unwrap();
        let len = store.len();
        for _ in 0..100 {
            assert_eq!(store.decode(&bytes).unwrap(), first);
        }
        assert_eq!(store.len(), len);
    }

    #[test]
    fn test_unified_placeholder_released_mid_arena() {
        // FRAME {v: FRAME {}, id: x}: the nested frame sits above the
        // placeholder when the id unifies it with `x`.
        let mut writer = Writer::new();
        writer.write_tag(OP_FRAME, 2);
        writer.write_tagged_str(OP_LINK, "v");
        writer.write_tag(OP_FRAME, 0);
        writer.write_tag(OP_SPECIAL, SPECIAL_ID);
        writer.write_tagged_str(OP_SYMBOL, "x");

        let mut store = Store::new();
        let x = store.lookup("x");
        store.lookup("v");
        let before = store.len();
        assert_eq!(store.decode(writer.as_bytes()).unwrap(), Value::Frame(x));
        // Only the nested frame is new.
        assert_eq!(store.len(), before + 1);
        store.decode(writer.as_bytes()).unwrap();
        assert_eq!(store.len(), before + 2);
    }

    #[test]
    fn test_invalid_id_value() {
        let mut writer = Writer::new();
        writer.write_tag(OP_FRAME, 1);
        writer.write_tag(OP_SPECIAL, SPECIAL_ID);
        writer.write_tag(OP_INTEGER, 5);
        let mut store = Store::new();
        assert_eq!(
            store.decode(writer.as_bytes()).unwrap_err(),
            DecodeError::InvalidIdValue
        );
    }

    #[test]
    fn test_symbol_registers_no_reference() {
        // SYMBOL a, then REF 0 must fail.
        let mut writer = Writer::new();
        writer.write_tagged_str(OP_SYMBOL, "a");
        writer.write_tag(OP_REF, 0);
        let mut store = Store::new();
        let mut decoder = Decoder::new(&mut store, writer.as_bytes());
        assert!(decoder.read().unwrap().as_frame().is_some());
        assert_eq!(
            decoder.read().unwrap_err(),
            DecodeError::InvalidReference { index: 0 }
        );
    }

    #[test]
    fn test_depth_limit() {
        let mut input = vec![special(SPECIAL_ARRAY), 1];
        for _ in 0..MAX_DEPTH {
            input.extend_from_slice(&[special(SPECIAL_ARRAY), 1]);
        }
        input.push(special(SPECIAL_NULL));
        let mut store = Store::new();
        assert_eq!(
            store.decode(&input).unwrap_err(),
            DecodeError::DepthExceeded { max: MAX_DEPTH }
        );
    }

    #[test]
    fn test_length_limit() {
        let mut writer = Writer::new();
        writer.write_tag(OP_STRING, (MAX_STRING_LEN + 1) as u64);
        let mut store = Store::new();
        let err = store.decode(writer.as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::LengthExceedsLimit { field: "string", .. }));
    }
}
