//! Frame store: a semantic graph of frames with a compact binary codec and a
//! human-readable text notation.
//!
//! # Overview
//!
//! A frame is an ordered list of `(name, value)` slots. Slot names are usually
//! frames themselves, so schema and data live in the same graph. Frames are
//! kept in a [`Store`], which hands out [`FrameId`] handles and maps names
//! (the values of `id` slots) to frames.
//!
//! - **Identity**: named frames are shared by name across encoded streams;
//!   anonymous frames are local substructure
//! - **Compact**: the binary codec writes every string, link and frame once
//!   and back-references it afterwards
//! - **Layered**: a store can be chained to a shared parent store holding
//!   common schema
//!
//! # Quick Start
//!
//! ```rust
//! use framestore::{FrameBuilder, Store, Value};
//!
//! let mut store = Store::new();
//! let person = store.lookup("person");
//! let age = store.lookup("age");
//! let alice = FrameBuilder::new()
//!     .id("alice")
//!     .isa(person)
//!     .name("Alice")
//!     .slot(age, 42i64)
//!     .build(&mut store);
//!
//! // Binary round trip into a fresh store.
//! let bytes = store.encode(&Value::Frame(alice)).unwrap();
//! let mut other = Store::new();
//! let decoded = other.decode(&bytes).unwrap();
//! assert_eq!(other.find("alice"), decoded.as_frame());
//!
//! // Text notation.
//! assert_eq!(
//!     store.text(&Value::Frame(alice)),
//!     r#"{=alice :person name: "Alice" age: 42}"#
//! );
//! ```
//!
//! # Modules
//!
//! - [`model`]: Core data types (FrameId, Value, Frame, FrameBuilder)
//! - [`store`]: The frame arena and name registry
//! - [`codec`]: Binary encoding/decoding with compression support
//! - [`text`]: Text notation reader and printer
//! - [`error`]: Error types
//! - [`limits`]: Security limits for decoding
//!
//! # Security
//!
//! The decoder and the text reader are designed to safely handle untrusted
//! input:
//! - Lengths and counts are checked against [`limits`] before allocating
//! - Nesting depth is bounded
//! - A failed read leaves the store exactly as it was before
//!
//! # Wire Format
//!
//! A binary stream is an optional `0x00` marker followed by concatenated
//! top-level values. Compressed streams carry the `FRMZ` magic, the
//! uncompressed size, and a zstd frame. [`Store::parse`] detects binary,
//! compressed and text input automatically.

pub mod codec;
pub mod error;
pub mod limits;
pub mod model;
pub mod store;
pub mod text;

// Re-export commonly used types at crate root
pub use codec::{decompress, Decoder, EncodeOptions, Encoder};
pub use error::{DecodeError, EncodeError, Error, ErrorCode, ParseError, StoreError};
pub use model::{Frame, FrameBuilder, FrameId, FrameState, QString, Slot, Value};
pub use store::Store;
pub use text::{PrintOptions, Printer, TextReader};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
