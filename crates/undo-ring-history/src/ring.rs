/// Fixed-capacity circular undo/redo buffer.
///
/// A single cursor marks the boundary between the undoable entries behind
/// it and the redoable entries at and after it. Once the ring is full, each
/// push overwrites the oldest undoable entry; the buffer never grows.
///
/// ```text
///   capacity = 4, pushed A B C, undone once
///
///   slots   = [A, B, C, _]
///   cursor  =        ^        (next write; C is redoable)
///   undoable = 2, redoable = 1
/// ```
use crate::error::{HistoryError, Result};

#[derive(Debug, Clone)]
pub struct RingBuffer<E> {
    slots: Box<[Option<E>]>,
    /// Next slot to be written by a push or produced by a redo.
    cursor: usize,
    redoable: usize,
    /// Valid entries currently held, undoable and redoable together.
    total: usize,
}

impl<E> RingBuffer<E> {
    /// Creates an empty ring. A capacity of zero is clamped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let slots = std::iter::repeat_with(|| None).take(capacity).collect();

        Self {
            slots,
            cursor: 0,
            redoable: 0,
            total: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn undoable_count(&self) -> usize {
        self.total - self.redoable
    }

    pub fn redoable_count(&self) -> usize {
        self.redoable
    }

    pub fn can_undo(&self) -> bool {
        self.undoable_count() > 0
    }

    pub fn can_redo(&self) -> bool {
        self.redoable > 0
    }

    /// Records `value` as the newest undoable entry.
    ///
    /// Every redoable entry is discarded: a new change starts a new branch
    /// of history. When the ring is full the oldest undoable entry is
    /// overwritten.
    pub fn push(&mut self, value: E) {
        let undoable = self.undoable_count();
        self.slots[self.cursor] = Some(value);
        self.cursor = self.step_forward(self.cursor);
        self.total = (undoable + 1).min(self.capacity());
        self.redoable = 0;
    }

    /// Steps the cursor back and returns the entry to reverse.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if there is nothing to undo.
    pub fn undo(&mut self) -> Result<&E> {
        if !self.can_undo() {
            return Err(HistoryError::invalid_state("ring buffer has nothing to undo"));
        }
        let index = self.step_back(self.cursor);
        self.slot(index)?;

        self.cursor = index;
        self.redoable += 1;
        self.slot(index)
    }

    /// Returns the entry at the cursor for reapplication and steps forward.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if there is nothing to redo.
    pub fn redo(&mut self) -> Result<&E> {
        if !self.can_redo() {
            return Err(HistoryError::invalid_state("ring buffer has nothing to redo"));
        }
        let index = self.cursor;
        self.slot(index)?;

        self.redoable -= 1;
        self.cursor = self.step_forward(index);
        self.slot(index)
    }

    /// Drops every entry and rewinds the cursor.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.cursor = 0;
        self.redoable = 0;
        self.total = 0;
    }

    /// Whatever sits just behind the cursor.
    ///
    /// Informational only: the slot may hold a stale or overwritten entry
    /// when `can_undo()` is false.
    pub fn peek_undo(&self) -> Option<&E> {
        self.slots[self.step_back(self.cursor)].as_ref()
    }

    /// Whatever sits at the cursor.
    ///
    /// Informational only: the slot may hold a stale entry when
    /// `can_redo()` is false.
    pub fn peek_redo(&self) -> Option<&E> {
        self.slots[self.cursor].as_ref()
    }

    fn slot(&self, index: usize) -> Result<&E> {
        self.slots[index]
            .as_ref()
            .ok_or_else(|| HistoryError::invalid_state(format!("ring slot {index} is empty")))
    }

    fn step_forward(&self, index: usize) -> usize {
        (index + 1) % self.capacity()
    }

    fn step_back(&self, index: usize) -> usize {
        (index + self.capacity() - 1) % self.capacity()
    }
}
