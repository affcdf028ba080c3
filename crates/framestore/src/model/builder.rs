//! Builder API for ergonomic frame construction.
//!
//! # Example
//!
//! ```rust
//! use framestore::{FrameBuilder, Store, Value};
//!
//! let mut store = Store::new();
//! let person = store.lookup("person");
//! let alice = FrameBuilder::new()
//!     .id("alice")
//!     .isa(person)
//!     .name("Alice")
//!     .slot("age", 42i64)
//!     .build(&mut store);
//!
//! assert_eq!(store.find("alice"), Some(alice));
//! assert_eq!(store.get(alice).unwrap().get("age"), Some(&Value::Int(42)));
//! ```

use crate::model::{FrameId, Slot, Value};
use crate::store::Store;

/// Builder for a frame's slot list.
#[derive(Debug, Clone, Default)]
pub struct FrameBuilder {
    slots: Vec<Slot>,
}

impl FrameBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an `id` slot.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.slots.push(Slot::new(FrameId::ID, id.into()));
        self
    }

    /// Adds an `isa` slot.
    pub fn isa(mut self, value: impl Into<Value>) -> Self {
        self.slots.push(Slot::new(FrameId::ISA, value));
        self
    }

    /// Adds an `is` slot.
    pub fn is(mut self, value: impl Into<Value>) -> Self {
        self.slots.push(Slot::new(FrameId::IS, value));
        self
    }

    /// Adds a `name` slot.
    pub fn name(mut self, value: impl Into<Value>) -> Self {
        self.slots.push(Slot::new(FrameId::NAME, value));
        self
    }

    /// Adds an arbitrary slot.
    pub fn slot(mut self, name: impl Into<Value>, value: impl Into<Value>) -> Self {
        self.slots.push(Slot::new(name, value));
        self
    }

    /// Adds several slots at once.
    pub fn slots(mut self, slots: impl IntoIterator<Item = Slot>) -> Self {
        self.slots.extend(slots);
        self
    }

    /// Returns the collected slots without creating a frame.
    pub fn into_slots(self) -> Vec<Slot> {
        self.slots
    }

    /// Creates the frame in `store`, registering its ids.
    pub fn build(self, store: &mut Store) -> FrameId {
        store.frame(self.slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FrameState;

    #[test]
    fn test_builder_anonymous() {
        let mut store = Store::new();
        let f = FrameBuilder::new().is(5i64).build(&mut store);
        let frame = store.get(f).unwrap();
        assert_eq!(frame.state(), FrameState::Anonymous);
        assert_eq!(frame.get(FrameId::IS), Some(&Value::Int(5)));
    }

    #[test]
    fn test_builder_slot_order() {
        let slots = FrameBuilder::new()
            .id("x")
            .slot("a", 1i64)
            .name("X")
            .into_slots();
        assert_eq!(
            slots,
            vec![
                Slot::new(FrameId::ID, "x"),
                Slot::new("a", 1i64),
                Slot::new(FrameId::NAME, "X"),
            ]
        );
    }
}
