//! Bounded undo/redo history over shared document snapshots.

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;

/// A point-in-time document value. Snapshots are shared by reference;
/// callers can test identity with `Arc::ptr_eq`.
pub type Snapshot = Arc<Value>;

/// Past snapshots retained before the oldest is evicted.
pub const DEFAULT_CAPACITY: usize = 50;

/// Past/present/future snapshot stacks.
///
/// `commit` is the only operation that clears the redo stack; undo and redo
/// move snapshots between stacks without cloning them.
#[derive(Debug, Clone)]
pub struct DocumentHistory {
    past: VecDeque<Snapshot>,
    present: Snapshot,
    future: Vec<Snapshot>,
    capacity: usize,
}

impl DocumentHistory {
    #[must_use]
    pub fn new(initial: Value) -> DocumentHistory {
        DocumentHistory::with_capacity(initial, DEFAULT_CAPACITY)
    }

    /// `capacity` bounds the past stack; it is clamped to at least 1.
    #[must_use]
    pub fn with_capacity(initial: Value, capacity: usize) -> DocumentHistory {
        DocumentHistory {
            past: VecDeque::new(),
            present: Arc::new(initial),
            future: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Makes `next` the present. The old present moves onto the past stack
    /// (evicting the oldest entry at capacity) and the future is cleared.
    pub fn commit(&mut self, next: Snapshot) {
        if self.past.len() == self.capacity {
            self.past.pop_front();
        }
        let previous = std::mem::replace(&mut self.present, next);
        self.past.push_back(previous);
        self.future.clear();
    }

    /// Steps back one snapshot. Returns the new present, or `None` when
    /// there is nothing to undo.
    pub fn undo(&mut self) -> Option<Snapshot> {
        let restored = self.past.pop_back()?;
        let current = std::mem::replace(&mut self.present, restored);
        self.future.push(current);
        Some(Arc::clone(&self.present))
    }

    /// Steps forward one snapshot. Returns the new present, or `None` when
    /// there is nothing to redo.
    pub fn redo(&mut self) -> Option<Snapshot> {
        let restored = self.future.pop()?;
        let current = std::mem::replace(&mut self.present, restored);
        self.past.push_back(current);
        Some(Arc::clone(&self.present))
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    #[must_use]
    pub fn present(&self) -> &Snapshot {
        &self.present
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn past_len(&self) -> usize {
        self.past.len()
    }
}
