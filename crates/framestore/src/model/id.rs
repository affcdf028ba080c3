//! Frame handles and the reserved names.
//!
//! Frames live in a per-store arena and are addressed by [`FrameId`]. A store
//! chained to a parent continues the parent's index space, so a handle is
//! valid in the store that allocated it and in every store below it.

use std::fmt;

/// A stable handle to a frame in a store arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub(crate) u32);

impl FrameId {
    /// Handle of the reserved `id` frame.
    pub const ID: FrameId = FrameId(0);
    /// Handle of the reserved `isa` frame.
    pub const ISA: FrameId = FrameId(1);
    /// Handle of the reserved `is` frame.
    pub const IS: FrameId = FrameId(2);
    /// Handle of the reserved `name` frame.
    pub const NAME: FrameId = FrameId(3);

    /// Returns the arena index of this handle.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns true for the four reserved name frames.
    pub fn is_reserved(self) -> bool {
        self.0 < RESERVED.len() as u32
    }
}

impl fmt::Debug for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameId({})", self.0)
    }
}

/// The reserved names, in arena order.
pub const RESERVED: [(&str, FrameId); 4] = [
    ("id", FrameId::ID),
    ("isa", FrameId::ISA),
    ("is", FrameId::IS),
    ("name", FrameId::NAME),
];

/// Returns true if `name` can be written as a bare symbol in the text notation.
///
/// Symbols start with a letter, `_` or `/`, continue with letters, digits, and
/// `_ / - .`, and are not one of the keywords `nil`, `true`, `false`, `nan`,
/// `inf`.
pub fn is_symbol_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_' || first == '/') {
        return false;
    }
    if !chars.all(is_symbol_char) {
        return false;
    }
    !is_keyword(name)
}

/// Returns true for the words the text notation reserves for literals.
pub fn is_keyword(word: &str) -> bool {
    matches!(word, "nil" | "true" | "false" | "nan" | "inf")
}

/// Returns true if `c` may appear after the first character of a bare symbol.
pub fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '/' | '-' | '.')
}
