//! Undo journal for store mutations made by a decode or parse call.
//!
//! While a journal is open, the store records the arena length, every name
//! binding it changes, and the original content of every pre-existing frame
//! it overwrites. Rolling back restores exactly that state, so a failed call
//! leaves no half-built graph behind.

use rustc_hash::FxHashMap;

use crate::model::{Frame, FrameId};

#[derive(Debug, Default)]
pub(crate) struct Journal {
    /// Local arena length when the journal was opened.
    pub(crate) frames: usize,
    /// Free list length when the journal was opened. Allocations inside a
    /// journal never pop the free list, so it only grows.
    pub(crate) free: usize,
    /// Names whose binding changed, with the binding they had before.
    pub(crate) bindings: Vec<(String, Option<FrameId>)>,
    /// Original content of pre-existing frames that were modified.
    pub(crate) saved: FxHashMap<FrameId, Frame>,
}

impl Journal {
    pub(crate) fn new(frames: usize, free: usize) -> Self {
        Self {
            frames,
            free,
            ..Self::default()
        }
    }

    /// Records a binding change.
    pub(crate) fn bound(&mut self, name: &str, previous: Option<FrameId>) {
        self.bindings.push((name.to_string(), previous));
    }

    /// Records the content of a pre-existing frame before it is modified.
    ///
    /// `local` is the frame's index in the local arena. Frames allocated after
    /// the journal was opened are discarded wholesale on rollback and need no
    /// saving.
    pub(crate) fn touch(&mut self, handle: FrameId, local: usize, frame: &Frame) {
        if local < self.frames && !self.saved.contains_key(&handle) {
            self.saved.insert(handle, frame.clone());
        }
    }
}
