//! Data model types for the frame store.
//!
//! This module contains the core graph types:
//! - Handles and reserved names
//! - Values (slot contents)
//! - Frames (ordered slot lists)
//! - Builders (ergonomic construction)

pub mod builder;
pub mod frame;
pub mod id;
pub mod value;

pub use builder::FrameBuilder;
pub use frame::{All, Frame, FrameState, Iter, Slot};
pub use id::{is_keyword, is_symbol_char, is_symbol_name, FrameId, RESERVED};
pub use value::{QString, Value};
