//! Human-readable text notation for frame graphs.
//!
//! ```text
//! ; a comment
//! {
//!   =alice                 ; id slot
//!   :person                ; isa slot
//!   name: "Alice"
//!   label: "colour"@/lang/en
//!   friends: [bob, {=#1 name: "Self" is: #1}]
//! }
//! ```
//!
//! Bare words are symbols resolved through the store; names that are not
//! valid symbols are written `$"..."`. `+v` is shorthand for an `is` slot.
//! `#N` refers to the anonymous frame declared with `=#N` in the same
//! top-level value, before or after the reference.

mod lexer;
mod printer;
mod reader;

pub use printer::Printer;
pub use reader::TextReader;

use crate::error::ParseError;
use crate::limits::MAX_DEPTH;
use crate::model::Value;
use crate::store::Store;

/// Options for printing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintOptions {
    /// Spaces per nesting level. Zero prints everything on one line.
    pub indent: usize,
    /// Frames nested deeper than this print as `nil`.
    pub max_depth: usize,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            indent: 0,
            max_depth: MAX_DEPTH,
        }
    }
}

impl PrintOptions {
    /// Compact single-line output.
    pub fn compact() -> Self {
        Self::default()
    }

    /// Multi-line output with two-space indentation.
    pub fn pretty() -> Self {
        Self {
            indent: 2,
            ..Self::default()
        }
    }
}

/// Prints `value` in text notation.
pub fn print(store: &Store, value: &Value, options: &PrintOptions) -> String {
    let mut printer = Printer::new(store, *options);
    printer.print(value);
    printer.finish()
}

/// Reads every value in `input` into `store`, returning the last one.
pub fn parse(store: &mut Store, input: &str) -> Result<Value, ParseError> {
    TextReader::new(store, input).read_all()
}
