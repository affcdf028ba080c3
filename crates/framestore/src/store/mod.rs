//! The frame store: an arena of frames plus a name registry.
//!
//! A store owns its frames and hands out [`FrameId`] handles. It may be chained
//! to a parent store (the "globals"), shared through an [`Arc`]; lookups that
//! miss locally fall through to the parent, and the local arena continues the
//! parent's index space so handles from both can be mixed freely. Frames owned
//! by the parent are read-only from the child.
//!
//! The store is a single-owner structure: every mutation takes `&mut self`.
//! Code that needs to share a store between threads wraps the whole store in
//! a mutex at the call site.

mod journal;

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::codec::{self, Decoder, EncodeOptions, Encoder};
use crate::error::{DecodeError, EncodeError, Error, ParseError, StoreError};
use crate::limits::{MAGIC_COMPRESSED, STREAM_MARKER};
use crate::model::{Frame, FrameId, FrameState, QString, Slot, Value, RESERVED};
use crate::text::{self, PrintOptions};

pub(crate) use journal::Journal;

/// An arena of frames with a name registry.
#[derive(Debug)]
pub struct Store {
    /// Local arena. `frames[i]` has handle `base + i`.
    frames: Vec<Frame>,
    /// First handle of the local arena.
    base: u32,
    /// Local name bindings.
    names: FxHashMap<String, FrameId>,
    /// Parent store consulted on lookup misses.
    globals: Option<Arc<Store>>,
    /// Released arena slots, reused by allocations outside a journal.
    free: Vec<FrameId>,
    /// Open undo journal, if a decode or parse is in progress.
    journal: Option<Journal>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Creates an empty root store holding the reserved names.
    pub fn new() -> Self {
        let mut store = Self {
            frames: Vec::with_capacity(RESERVED.len()),
            base: 0,
            names: FxHashMap::default(),
            globals: None,
            free: Vec::new(),
            journal: None,
        };
        for (name, handle) in RESERVED {
            let frame = Frame {
                slots: vec![Slot::new(FrameId::ID, name)],
                state: FrameState::Public,
            };
            let allocated = store.alloc(frame);
            debug_assert_eq!(allocated, handle);
            store.names.insert(name.to_string(), handle);
        }
        store
    }

    /// Creates an empty store chained to `globals`.
    ///
    /// The reserved names are shared with the parent.
    pub fn with_globals(globals: Arc<Store>) -> Self {
        let base = globals.end();
        Self {
            frames: Vec::new(),
            base,
            names: FxHashMap::default(),
            globals: Some(globals),
            free: Vec::new(),
            journal: None,
        }
    }

    /// Returns the parent store.
    pub fn globals(&self) -> Option<&Arc<Store>> {
        self.globals.as_ref()
    }

    /// Number of live frames in the local arena.
    pub fn len(&self) -> usize {
        self.frames.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One past the last handle allocated by this store.
    fn end(&self) -> u32 {
        self.base + self.frames.len() as u32
    }

    /// Returns the local arena index of `handle`, if this store owns it.
    fn local(&self, handle: FrameId) -> Option<usize> {
        let index = handle.0.checked_sub(self.base)? as usize;
        (index < self.frames.len()).then_some(index)
    }

    /// Returns true if this store (not a parent) owns `handle`.
    pub fn owns(&self, handle: FrameId) -> bool {
        self.local(handle).is_some()
    }

    /// Returns true if `handle` is valid in this store or a parent.
    pub fn contains(&self, handle: FrameId) -> bool {
        self.get(handle).is_some()
    }

    /// Returns the frame for `handle`, searching parent stores.
    pub fn get(&self, handle: FrameId) -> Option<&Frame> {
        match self.local(handle) {
            Some(index) => self.frames.get(index),
            None if handle.0 < self.base => self.globals.as_ref()?.get(handle),
            None => None,
        }
    }

    /// Returns the first value of the slot of `handle` whose name is the
    /// frame registered under `name`.
    pub fn get_named(&self, handle: FrameId, name: &str) -> Option<&Value> {
        let key = self.find(name)?;
        self.get(handle)?.get(key)
    }

    /// Returns a mutable frame owned by this store.
    pub fn get_mut(&mut self, handle: FrameId) -> Option<&mut Frame> {
        let index = self.local(handle)?;
        self.frames.get_mut(index)
    }

    /// Returns a mutable frame, explaining why it is unavailable.
    pub fn frame_mut(&mut self, handle: FrameId) -> Result<&mut Frame, StoreError> {
        match self.local(handle) {
            Some(index) => Ok(&mut self.frames[index]),
            None if self.get(handle).is_some() => Err(StoreError::ImmutableFrame { handle }),
            None => Err(StoreError::UnknownFrame { handle }),
        }
    }

    /// Iterates the local `(name, frame)` bindings.
    pub fn names(&self) -> impl Iterator<Item = (&str, FrameId)> {
        self.names.iter().map(|(name, handle)| (name.as_str(), *handle))
    }

    // =========================================================================
    // Registry
    // =========================================================================

    /// Returns the frame registered under `name`, without creating anything.
    pub fn find(&self, name: &str) -> Option<FrameId> {
        match self.names.get(name) {
            Some(handle) => Some(*handle),
            None => self.globals.as_ref()?.find(name),
        }
    }

    /// Returns the frame registered under `name`, creating a proxy if no store
    /// in the chain knows it. Never fails.
    pub fn lookup(&mut self, name: &str) -> FrameId {
        if let Some(handle) = self.find(name) {
            return handle;
        }
        let handle = self.alloc(Frame {
            slots: vec![Slot::new(FrameId::ID, name)],
            state: FrameState::Proxy,
        });
        self.bind(name, handle);
        trace!(name, ?handle, "created proxy");
        handle
    }

    /// Alias of [`Store::lookup`], for call sites that want a placeholder.
    pub fn proxy(&mut self, name: &str) -> FrameId {
        self.lookup(name)
    }

    /// Returns the frame for `name`, marking it as a stub if it is still a
    /// bare proxy.
    pub fn stub(&mut self, name: &str) -> FrameId {
        let handle = self.lookup(name);
        if let Some(frame) = self.get_mut(handle) {
            if frame.state == FrameState::Proxy {
                frame.state = FrameState::Stub;
            }
        }
        handle
    }

    /// Binds `id` to `handle` and makes the frame public.
    ///
    /// Frames owned by a parent store are bound locally but keep their state.
    pub fn register(&mut self, id: &str, handle: FrameId) -> Result<(), StoreError> {
        if !self.contains(handle) {
            return Err(StoreError::UnknownFrame { handle });
        }
        self.bind(id, handle);
        if let Some(index) = self.local(handle) {
            self.touch(handle);
            self.frames[index].state = FrameState::Public;
        }
        Ok(())
    }

    /// Removes every local binding of `handle` and demotes it to anonymous.
    ///
    /// The frame's `id` slots are left in place. Returns false if there was
    /// nothing to do.
    pub fn unregister(&mut self, handle: FrameId) -> bool {
        let names: Vec<String> = self
            .names
            .iter()
            .filter(|(_, h)| **h == handle)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &names {
            self.names.remove(name);
            if let Some(journal) = &mut self.journal {
                journal.bound(name, Some(handle));
            }
        }
        let demoted = match self.local(handle) {
            Some(index) if self.frames[index].state != FrameState::Anonymous => {
                self.touch(handle);
                self.frames[index].state = FrameState::Anonymous;
                true
            }
            _ => false,
        };
        demoted || !names.is_empty()
    }

    /// Prepends an `id` slot to `handle` and registers it under `id`.
    pub fn assign(&mut self, handle: FrameId, id: &str) -> Result<(), StoreError> {
        let frame = self.frame_mut(handle)?;
        frame.insert(0, FrameId::ID, id);
        self.register(id, handle)
    }

    /// Returns a name for `handle`: its first `id` slot, or else any name it
    /// is registered under.
    pub fn id_of(&self, handle: FrameId) -> Option<&str> {
        if let Some(id) = self.get(handle).and_then(Frame::id) {
            return Some(id);
        }
        self.names
            .iter()
            .find(|(_, h)| **h == handle)
            .map(|(name, _)| name.as_str())
            .or_else(|| self.globals.as_ref()?.id_of(handle))
    }

    // =========================================================================
    // Frame creation
    // =========================================================================

    /// Creates a frame from `slots`, registering every `id` slot it carries.
    ///
    /// If one of the ids already names a frame of this store, that frame is
    /// reused: its content is replaced by `slots` and its handle returned, so
    /// earlier references observe the new content.
    pub fn frame(&mut self, slots: impl IntoIterator<Item = Slot>) -> FrameId {
        let slots: Vec<Slot> = slots.into_iter().collect();
        let existing = slots
            .iter()
            .filter_map(Slot::id)
            .find_map(|id| self.local_binding(id));
        let handle = match existing {
            Some(handle) => handle,
            None => self.alloc(Frame::new()),
        };
        self.install(handle, slots);
        handle
    }

    /// Returns the local frame bound to `id`, if any.
    pub(crate) fn local_binding(&self, id: &str) -> Option<FrameId> {
        self.names.get(id).copied().filter(|h| self.owns(*h))
    }

    /// Replaces the content of a local frame and registers its ids.
    pub(crate) fn install(&mut self, handle: FrameId, slots: Vec<Slot>) {
        let Some(index) = self.local(handle) else {
            return;
        };
        let ids: Vec<String> = slots.iter().filter_map(Slot::id).map(str::to_string).collect();
        // A bare `{=x}` adds nothing to a proxy or stub.
        let bare = !slots.is_empty() && slots.iter().all(|s| s.id().is_some());
        self.touch(handle);
        let frame = &mut self.frames[index];
        frame.slots = slots;
        let placeholder = matches!(frame.state, FrameState::Proxy | FrameState::Stub);
        if !(bare && placeholder) && (!ids.is_empty() || frame.state.is_named()) {
            frame.state = FrameState::Public;
        }
        for id in &ids {
            if self.names.get(id.as_str()) != Some(&handle) {
                if let Some(shadowed) = self.globals.as_ref().and_then(|g| g.find(id)) {
                    trace!(id = id.as_str(), ?shadowed, ?handle, "shadowing global frame");
                }
                self.bind(id, handle);
            }
        }
    }

    /// Allocates a frame in the local arena.
    ///
    /// Inside a journal frames are always appended, so everything a decode or
    /// parse allocates lies above the handles it started with.
    pub(crate) fn alloc(&mut self, frame: Frame) -> FrameId {
        if self.journal.is_none() {
            if let Some(handle) = self.free.pop() {
                if let Some(index) = self.local(handle) {
                    self.frames[index] = frame;
                    return handle;
                }
            }
        }
        let handle = FrameId(self.end());
        self.frames.push(frame);
        handle
    }

    /// Returns an unreferenced local frame to the arena.
    ///
    /// The arena tail is truncated; other frames are emptied and put on the
    /// free list.
    pub(crate) fn release(&mut self, handle: FrameId) {
        let Some(index) = self.local(handle) else {
            return;
        };
        let fresh = self.journal.as_ref().is_none_or(|j| index >= j.frames);
        if fresh && index + 1 == self.frames.len() {
            self.frames.pop();
        } else {
            self.touch(handle);
            self.frames[index] = Frame::new();
            self.free.push(handle);
        }
        trace!(?handle, "released frame");
    }

    /// Binds `name` to `handle` locally, recording the change.
    pub(crate) fn bind(&mut self, name: &str, handle: FrameId) {
        let previous = self.names.insert(name.to_string(), handle);
        if let Some(journal) = &mut self.journal {
            journal.bound(name, previous);
        }
    }

    /// Saves a frame's content before modification while a journal is open.
    fn touch(&mut self, handle: FrameId) {
        let Some(index) = self.local(handle) else {
            return;
        };
        if let Some(journal) = &mut self.journal {
            journal.touch(handle, index, &self.frames[index]);
        }
    }

    /// Overwrites a local frame's slots without touching the registry.
    pub(crate) fn set_slots(&mut self, handle: FrameId, slots: Vec<Slot>) {
        if let Some(index) = self.local(handle) {
            self.touch(handle);
            self.frames[index].slots = slots;
        }
    }

    /// Handle the next allocated frame will get.
    pub(crate) fn next_handle(&self) -> FrameId {
        FrameId(self.end())
    }

    /// Replaces `from` with `to` in the slots of every local frame allocated
    /// at or after `since`.
    pub(crate) fn redirect(&mut self, since: FrameId, from: FrameId, to: FrameId) {
        let start = since.0.saturating_sub(self.base) as usize;
        for index in start..self.frames.len() {
            self.rewrite(FrameId(self.base + index as u32), from, to);
        }
    }

    /// Replaces `from` with `to` in the slots of one local frame.
    pub(crate) fn rewrite(&mut self, handle: FrameId, from: FrameId, to: FrameId) {
        let Some(index) = self.local(handle) else {
            return;
        };
        let slots = &self.frames[index].slots;
        if !slots.iter().any(|s| s.name.mentions(from) || s.value.mentions(from)) {
            return;
        }
        self.touch(handle);
        for slot in &mut self.frames[index].slots {
            slot.name.replace_frame(from, to);
            slot.value.replace_frame(from, to);
        }
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Opens an undo journal. Returns false if one is already open.
    pub(crate) fn begin(&mut self) -> bool {
        if self.journal.is_some() {
            return false;
        }
        self.journal = Some(Journal::new(self.frames.len(), self.free.len()));
        true
    }

    /// Closes the journal, keeping all changes.
    pub(crate) fn commit(&mut self) {
        self.journal = None;
    }

    /// Closes the journal, undoing every change recorded in it.
    pub(crate) fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        debug!(
            frames = self.frames.len() - journal.frames,
            bindings = journal.bindings.len(),
            saved = journal.saved.len(),
            "rolling back store changes"
        );
        for (name, previous) in journal.bindings.into_iter().rev() {
            match previous {
                Some(handle) => {
                    self.names.insert(name, handle);
                }
                None => {
                    self.names.remove(&name);
                }
            }
        }
        for (handle, frame) in journal.saved {
            if let Some(index) = self.local(handle) {
                self.frames[index] = frame;
            }
        }
        self.frames.truncate(journal.frames);
        self.free.truncate(journal.free);
    }

    // =========================================================================
    // Graph operations
    // =========================================================================

    /// Follows `is` slots through anonymous frames to the value they qualify.
    ///
    /// Stops at the first non-frame value, named frame, or frame without an
    /// `is` slot. A chain that revisits a frame is an error.
    pub fn resolve<'a>(&'a self, value: &'a Value) -> Result<&'a Value, StoreError> {
        let mut current = value;
        let mut seen = FxHashSet::default();
        loop {
            let Value::Frame(handle) = current else {
                return Ok(current);
            };
            let frame = self
                .get(*handle)
                .ok_or(StoreError::UnknownFrame { handle: *handle })?;
            if !frame.is_anonymous() {
                return Ok(current);
            }
            let Some(next) = frame.get(FrameId::IS) else {
                return Ok(current);
            };
            if !seen.insert(*handle) {
                return Err(StoreError::QualifierCycle { handle: *handle });
            }
            current = next;
        }
    }

    /// Copies `value` from a foreign store into this one.
    ///
    /// Anonymous frames and arrays are cloned (sharing and cycles preserved);
    /// named frames are looked up by id here, never copied.
    pub fn transfer(&mut self, from: &Store, value: &Value) -> Result<Value, StoreError> {
        let mut copies = FxHashMap::default();
        self.transfer_value(from, value, &mut copies)
    }

    fn transfer_value(
        &mut self,
        from: &Store,
        value: &Value,
        copies: &mut FxHashMap<FrameId, FrameId>,
    ) -> Result<Value, StoreError> {
        Ok(match value {
            Value::Frame(handle) => Value::Frame(self.transfer_frame(from, *handle, copies)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.transfer_value(from, item, copies))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Qualified(q) => Value::from(QString {
                text: q.text.clone(),
                qualifier: self.transfer_value(from, &q.qualifier, copies)?,
            }),
            other => other.clone(),
        })
    }

    fn transfer_frame(
        &mut self,
        from: &Store,
        handle: FrameId,
        copies: &mut FxHashMap<FrameId, FrameId>,
    ) -> Result<FrameId, StoreError> {
        if handle.is_reserved() {
            return Ok(handle);
        }
        if let Some(copy) = copies.get(&handle) {
            return Ok(*copy);
        }
        let source = from.get(handle).ok_or(StoreError::UnknownFrame { handle })?;
        if source.state.is_named() {
            if let Some(id) = from.id_of(handle) {
                return Ok(self.lookup(id));
            }
        }
        let copy = self.alloc(Frame::new());
        copies.insert(handle, copy);
        let mut slots = Vec::with_capacity(source.slots.len());
        for slot in &source.slots {
            slots.push(Slot {
                name: self.transfer_value(from, &slot.name, copies)?,
                value: self.transfer_value(from, &slot.value, copies)?,
            });
        }
        self.set_slots(copy, slots);
        Ok(copy)
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Encodes `value` to the binary format.
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        codec::encode(self, value)
    }

    /// Encodes several top-level values into one stream.
    pub fn encode_all<'v>(
        &self,
        values: impl IntoIterator<Item = &'v Value>,
    ) -> Result<Vec<u8>, EncodeError> {
        let mut encoder = Encoder::with_options(self, EncodeOptions::default());
        for value in values {
            encoder.encode(value)?;
        }
        Ok(encoder.finish())
    }

    /// Encodes `value` and compresses it with zstd.
    pub fn encode_compressed(&self, value: &Value, level: i32) -> Result<Vec<u8>, EncodeError> {
        codec::encode_compressed(self, value, level)
    }

    /// Decodes a binary stream into this store, returning its last value.
    pub fn decode(&mut self, input: &[u8]) -> Result<Value, DecodeError> {
        Decoder::new(self, input).read_all()
    }

    /// Reads the text notation into this store, returning its last value.
    pub fn parse_text(&mut self, input: &str) -> Result<Value, ParseError> {
        text::parse(self, input)
    }

    /// Reads binary, compressed, or text input into this store.
    ///
    /// Input starting with the `0x00` marker is binary, input starting with
    /// the compression magic is decompressed first, and anything else is
    /// read as text.
    pub fn parse(&mut self, input: &[u8]) -> Result<Value, Error> {
        if input.first() == Some(&STREAM_MARKER) {
            return Ok(self.decode(input)?);
        }
        if input.starts_with(MAGIC_COMPRESSED) {
            let raw = codec::decompress(input)?;
            return Ok(self.decode(&raw)?);
        }
        let text = std::str::from_utf8(input)
            .map_err(|_| DecodeError::InvalidUtf8 { field: "text" })?;
        Ok(self.parse_text(text)?)
    }

    /// Prints `value` in compact text notation.
    pub fn text(&self, value: &Value) -> String {
        text::print(self, value, &PrintOptions::default())
    }

    /// Prints `value` in text notation with options.
    pub fn text_with(&self, value: &Value, options: &PrintOptions) -> String {
        text::print(self, value, options)
    }
}
