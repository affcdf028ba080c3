//! Slot values.
//!
//! A [`Value`] is anything that can be stored as a slot name or slot value:
//! primitives, strings, qualified strings, frame handles, and arrays.

use std::hash::{Hash, Hasher};

use crate::model::FrameId;

/// Bit pattern marking a NaN-boxed legacy index.
pub const INDEX_TAG: u32 = 0x7FC0_0000;

/// Mask of the payload bits of a NaN-boxed legacy index.
pub const INDEX_MASK: u32 = 0x000F_FFFF;

/// A text value carrying a qualifier (typically a language or unit frame).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QString {
    /// The text used for display and comparison.
    pub text: String,
    /// The qualifier carried alongside the text.
    pub qualifier: Value,
}

impl QString {
    /// Creates a qualified string.
    pub fn new(text: impl Into<String>, qualifier: impl Into<Value>) -> Self {
        Self {
            text: text.into(),
            qualifier: qualifier.into(),
        }
    }
}

/// A value held in a frame slot.
///
/// Equality and hashing treat floats by bit pattern, so `Value` can key hash
/// maps and a value is always equal to itself.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The absent value.
    #[default]
    Null,

    /// Boolean.
    Bool(bool),

    /// Signed integer.
    Int(i64),

    /// 32-bit IEEE 754 float.
    Float(f32),

    /// UTF-8 string.
    Str(String),

    /// String with a qualifier.
    Qualified(Box<QString>),

    /// Reference to a frame.
    Frame(FrameId),

    /// Ordered sequence of values.
    Array(Vec<Value>),
}

impl Value {
    /// Returns a short name of the value kind, used in messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Qualified(_) => "qstring",
            Value::Frame(_) => "frame",
            Value::Array(_) => "array",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_frame(&self) -> Option<FrameId> {
        match self {
            Value::Frame(handle) => Some(*handle),
            _ => None,
        }
    }

    /// Returns the text of a string or qualified string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Qualified(q) => Some(&q.text),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Creates the NaN-boxed float used by the legacy INDEX wire value.
    ///
    /// The payload sits above the two low mantissa bits, which the FLOAT wire
    /// form drops. Returns `None` if `index` does not fit in 20 bits.
    pub fn index(index: u32) -> Option<Value> {
        if index > INDEX_MASK {
            return None;
        }
        Some(Value::Float(f32::from_bits(INDEX_TAG | (index << 2))))
    }

    /// Returns the payload of a legacy INDEX value.
    pub fn as_index(&self) -> Option<u32> {
        match self {
            Value::Float(f) => {
                let bits = f.to_bits();
                if bits & !(INDEX_MASK << 2) == INDEX_TAG {
                    Some((bits >> 2) & INDEX_MASK)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Replaces every reference to frame `from` with `to`, recursively through
    /// arrays and qualifiers.
    pub(crate) fn replace_frame(&mut self, from: FrameId, to: FrameId) {
        match self {
            Value::Frame(handle) if *handle == from => *handle = to,
            Value::Qualified(q) => q.qualifier.replace_frame(from, to),
            Value::Array(items) => {
                for item in items {
                    item.replace_frame(from, to);
                }
            }
            _ => {}
        }
    }

    /// Returns true if frame `handle` occurs in this value.
    pub(crate) fn mentions(&self, handle: FrameId) -> bool {
        match self {
            Value::Frame(h) => *h == handle,
            Value::Qualified(q) => q.qualifier.mentions(handle),
            Value::Array(items) => items.iter().any(|item| item.mentions(handle)),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Qualified(a), Value::Qualified(b)) => a == b,
            (Value::Frame(a), Value::Frame(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Qualified(q) => q.hash(state),
            Value::Frame(handle) => handle.hash(state),
            Value::Array(items) => items.hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<QString> for Value {
    fn from(q: QString) -> Self {
        Value::Qualified(Box::new(q))
    }
}

impl From<FrameId> for Value {
    fn from(handle: FrameId) -> Self {
        Value::Frame(handle)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}
