//! Frames: ordered sequences of `(name, value)` slots.
//!
//! Slot names may repeat, which models multi-valued properties. All mutation
//! keeps the relative order of untouched slots stable.

use std::slice;

use crate::model::{FrameId, Value};

/// Identity state of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameState {
    /// No identifying name. Used for qualifiers and local substructure.
    #[default]
    Anonymous,
    /// Placeholder created by a lookup of an unknown name.
    Proxy,
    /// Known by id, content deliberately left incomplete.
    Stub,
    /// Fully known and registered under one or more names.
    Public,
}

impl FrameState {
    /// Returns true for every state except [`FrameState::Anonymous`].
    pub fn is_named(self) -> bool {
        self != FrameState::Anonymous
    }
}

/// One `(name, value)` pair of a frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Slot {
    pub name: Value,
    pub value: Value,
}

impl Slot {
    pub fn new(name: impl Into<Value>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Returns the id this slot declares: an `id` name with a plain string
    /// value. Qualified strings are never ids.
    pub fn id(&self) -> Option<&str> {
        match (&self.name, &self.value) {
            (Value::Frame(FrameId::ID), Value::Str(id)) => Some(id),
            _ => None,
        }
    }
}

/// A graph node.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    pub(crate) slots: Vec<Slot>,
    pub(crate) state: FrameState,
}

impl Frame {
    /// Creates an empty anonymous frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an anonymous frame from slots.
    pub fn with_slots(slots: Vec<Slot>) -> Self {
        Self {
            slots,
            state: FrameState::Anonymous,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn is_anonymous(&self) -> bool {
        self.state == FrameState::Anonymous
    }

    pub fn is_proxy(&self) -> bool {
        self.state == FrameState::Proxy
    }

    pub fn is_stub(&self) -> bool {
        self.state == FrameState::Stub
    }

    pub fn is_public(&self) -> bool {
        self.state == FrameState::Public
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the slots in order.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Returns the slot at `index`.
    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    /// Returns the value of the first `id` slot holding a string.
    pub fn id(&self) -> Option<&str> {
        self.ids().next()
    }

    /// Iterates the string values of all `id` slots.
    pub fn ids(&self) -> impl Iterator<Item = &str> + Clone {
        self.slots.iter().filter_map(Slot::id)
    }

    /// Returns true if the frame has at least one `id` slot.
    pub fn has_id(&self) -> bool {
        self.slots.iter().any(|s| s.name == Value::Frame(FrameId::ID))
    }

    /// Iterates `(name, value)` pairs in slot order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            slots: self.slots.iter(),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Returns the first value stored under `name`.
    ///
    /// Names compare as values: `get("name")` matches a string slot name,
    /// not the `name` frame. Frames that were parsed or decoded use frame
    /// names, so query them with a handle or through [`Store::get_named`].
    ///
    /// [`Store::get_named`]: crate::Store::get_named
    pub fn get(&self, name: impl Into<Value>) -> Option<&Value> {
        let name = name.into();
        self.slots.iter().find(|s| s.name == name).map(|s| &s.value)
    }

    /// Iterates all values stored under `name`, in slot order.
    ///
    /// The iterator is lazy and can be restarted by cloning it.
    pub fn all(&self, name: impl Into<Value>) -> All<'_> {
        All {
            slots: self.slots.iter(),
            name: name.into(),
        }
    }

    /// Returns true if some slot has exactly this name and value.
    pub fn contains(&self, name: &Value, value: &Value) -> bool {
        self.slots.iter().any(|s| &s.name == name && &s.value == value)
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Appends a slot.
    pub fn add(&mut self, name: impl Into<Value>, value: impl Into<Value>) {
        self.slots.push(Slot::new(name, value));
    }

    /// Inserts a slot at `pos`, clamped to the end of the frame.
    pub fn insert(&mut self, pos: usize, name: impl Into<Value>, value: impl Into<Value>) {
        let pos = pos.min(self.slots.len());
        self.slots.insert(pos, Slot::new(name, value));
    }

    /// Adds a value under `name` unless that exact slot already exists.
    ///
    /// A new value for an existing name is inserted right after the last slot
    /// with that name, keeping multi-valued groups contiguous. `None` is a
    /// no-op. Returns true if a slot was added.
    pub fn put(&mut self, name: impl Into<Value>, value: impl Into<Option<Value>>) -> bool {
        let Some(value) = value.into() else {
            return false;
        };
        let name = name.into();
        let mut last = None;
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.name == name {
                if slot.value == value {
                    return false;
                }
                last = Some(i);
            }
        }
        let slot = Slot { name, value };
        match last {
            Some(i) => self.slots.insert(i + 1, slot),
            None => self.slots.push(slot),
        }
        true
    }

    /// Replaces the value of the first slot named `name`, or appends one.
    ///
    /// Setting `None` removes that first slot instead.
    pub fn set(&mut self, name: impl Into<Value>, value: impl Into<Option<Value>>) {
        let name = name.into();
        let pos = self.slots.iter().position(|s| s.name == name);
        match (pos, value.into()) {
            (Some(i), Some(value)) => self.slots[i].value = value,
            (Some(i), None) => {
                self.slots.remove(i);
            }
            (None, Some(value)) => self.slots.push(Slot { name, value }),
            (None, None) => {}
        }
    }

    /// Removes every slot named `name`. Returns the number removed.
    pub fn remove(&mut self, name: impl Into<Value>) -> usize {
        let name = name.into();
        let before = self.slots.len();
        self.slots.retain(|s| s.name != name);
        before - self.slots.len()
    }

    /// Removes the slot at `index`.
    pub fn remove_at(&mut self, index: usize) -> Option<Slot> {
        if index < self.slots.len() {
            Some(self.slots.remove(index))
        } else {
            None
        }
    }

    /// Renames every slot named `from` to `to`. Returns the number renamed.
    pub fn rename(&mut self, from: impl Into<Value>, to: impl Into<Value>) -> usize {
        let from = from.into();
        let to = to.into();
        let mut count = 0;
        for slot in self.slots.iter_mut().filter(|s| s.name == from) {
            slot.name = to.clone();
            count += 1;
        }
        count
    }

    /// Replaces `from` with `to` in every slot named `name`. Returns the
    /// number of slots changed.
    pub fn replace(
        &mut self,
        name: impl Into<Value>,
        from: impl Into<Value>,
        to: impl Into<Value>,
    ) -> usize {
        let name = name.into();
        let from = from.into();
        let to = to.into();
        let mut count = 0;
        for slot in self
            .slots
            .iter_mut()
            .filter(|s| s.name == name && s.value == from)
        {
            slot.value = to.clone();
            count += 1;
        }
        count
    }

    /// Calls `f` on every slot; it may rewrite both name and value.
    pub fn apply<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Value, &mut Value),
    {
        for slot in &mut self.slots {
            f(&mut slot.name, &mut slot.value);
        }
    }

    /// Removes every slot for which `f` returns true. Returns the number removed.
    pub fn purge<F>(&mut self, mut f: F) -> usize
    where
        F: FnMut(&Value, &Value) -> bool,
    {
        let before = self.slots.len();
        self.slots.retain(|s| !f(&s.name, &s.value));
        before - self.slots.len()
    }

    /// Removes all slots.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

/// Iterator over the `(name, value)` pairs of a frame.
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    slots: slice::Iter<'a, Slot>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a Value, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        self.slots.next().map(|s| (&s.name, &s.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.slots.size_hint()
    }
}

impl<'a> IntoIterator for &'a Frame {
    type Item = (&'a Value, &'a Value);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the values stored under one name.
#[derive(Debug, Clone)]
pub struct All<'a> {
    slots: slice::Iter<'a, Slot>,
    name: Value,
}

impl<'a> Iterator for All<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        let name = &self.name;
        self.slots.find(|s| &s.name == name).map(|s| &s.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frame {
        let mut f = Frame::new();
        f.add("p", 1i64);
        f.add("q", 2i64);
        f.add("p", 3i64);
        f
    }

    fn pairs(f: &Frame) -> Vec<(Value, Value)> {
        f.iter().map(|(n, v)| (n.clone(), v.clone())).collect()
    }

    #[test]
    fn test_put_keeps_groups_contiguous() {
        let mut f = sample();
        assert!(f.put("p", Value::from(4i64)));
        assert_eq!(
            pairs(&f),
            vec![
                ("p".into(), 1i64.into()),
                ("q".into(), 2i64.into()),
                ("p".into(), 3i64.into()),
                ("p".into(), 4i64.into()),
            ]
        );

        // Insert after the last `q`, not at the end.
        assert!(f.put("q", Value::from(5i64)));
        assert_eq!(f.slot(2), Some(&Slot::new("q", 5i64)));
    }

    #[test]
    fn test_put_skips_duplicates_and_none() {
        let mut f = sample();
        assert!(!f.put("p", Value::from(3i64)));
        assert!(!f.put("p", None));
        assert_eq!(f.len(), 3);

        assert!(f.put("r", Value::from(9i64)));
        assert_eq!(f.slot(3), Some(&Slot::new("r", 9i64)));
    }

    #[test]
    fn test_set_replaces_first_or_appends() {
        let mut f = sample();
        f.set("p", Value::from(10i64));
        assert_eq!(f.get("p"), Some(&Value::Int(10)));
        assert_eq!(f.all("p").count(), 2);

        f.set("z", Value::from("new"));
        assert_eq!(f.slot(3), Some(&Slot::new("z", "new")));

        f.set("p", None);
        assert_eq!(f.get("p"), Some(&Value::Int(3)));
        assert_eq!(f.len(), 3);
    }

    #[test]
    fn test_remove_all_and_at() {
        let mut f = sample();
        assert_eq!(f.remove("p"), 2);
        assert_eq!(pairs(&f), vec![("q".into(), 2i64.into())]);

        let mut f = sample();
        assert_eq!(f.remove_at(1), Some(Slot::new("q", 2i64)));
        assert_eq!(f.remove_at(5), None);
        assert_eq!(f.len(), 2);
    }

    #[test]
    fn test_rename_and_replace() {
        let mut f = sample();
        assert_eq!(f.rename("p", "x"), 2);
        assert_eq!(f.all("x").count(), 2);
        assert_eq!(f.get("p"), None);

        f.add("x", 1i64);
        assert_eq!(f.replace("x", 1i64, 100i64), 2);
        let values: Vec<_> = f.all("x").cloned().collect();
        assert_eq!(values, vec![Value::Int(100), Value::Int(3), Value::Int(100)]);
    }

    #[test]
    fn test_apply_and_purge() {
        let mut f = sample();
        f.apply(|_, value| {
            if let Value::Int(i) = value {
                *i *= 10;
            }
        });
        assert_eq!(f.get("q"), Some(&Value::Int(20)));

        let removed = f.purge(|_, value| value.as_int().is_some_and(|i| i > 15));
        assert_eq!(removed, 2);
        assert_eq!(pairs(&f), vec![("p".into(), 10i64.into())]);
    }

    #[test]
    fn test_all_is_restartable() {
        let f = sample();
        let all = f.all("p");
        let first: Vec<_> = all.clone().collect();
        let second: Vec<_> = all.collect();
        assert_eq!(first, second);
        assert_eq!(first, vec![&Value::Int(1), &Value::Int(3)]);
    }

    #[test]
    fn test_insert_clamps_position() {
        let mut f = sample();
        f.insert(0, "first", true);
        f.insert(100, "last", false);
        assert_eq!(f.slot(0), Some(&Slot::new("first", true)));
        assert_eq!(f.slot(4), Some(&Slot::new("last", false)));
    }

    #[test]
    fn test_ids() {
        let mut f = Frame::new();
        assert_eq!(f.id(), None);
        assert!(!f.has_id());
        f.add(FrameId::ID, "a");
        f.add(FrameId::ID, "b");
        assert_eq!(f.id(), Some("a"));
        assert_eq!(f.ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
