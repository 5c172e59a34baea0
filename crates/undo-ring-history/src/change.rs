/// Reversible changes recorded by the history.
use crate::error::{HistoryError, Result};

/// A single recorded edit that can be reversed and reapplied against a
/// target of type `T`.
///
/// Implementations must not assume anything about how many times they are
/// replayed; an undo is always followed by at most one matching redo before
/// the next undo.
pub trait Change<T: ?Sized> {
    /// Reapplies the edit.
    fn apply_redo(&self, target: &mut T);

    /// Reverses the edit.
    fn apply_undo(&self, target: &mut T);
}

/// Adapter turning a pair of closures into a [`Change`].
///
/// The closure types are kept generic so that the adapter is `Send` and
/// `Sync` whenever both closures are.
#[derive(Clone)]
pub struct FnChange<U, R> {
    undo: U,
    redo: R,
}

impl<U, R> FnChange<U, R> {
    pub fn new(undo: U, redo: R) -> Self {
        Self { undo, redo }
    }

    /// Builds an adapter from optional parts.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if either action is missing.
    pub fn try_new(undo: Option<U>, redo: Option<R>) -> Result<Self> {
        let undo = undo.ok_or_else(|| HistoryError::invalid_argument("undo action is required"))?;
        let redo = redo.ok_or_else(|| HistoryError::invalid_argument("redo action is required"))?;
        Ok(Self::new(undo, redo))
    }
}

impl<T, U, R> Change<T> for FnChange<U, R>
where
    T: ?Sized,
    U: Fn(&mut T),
    R: Fn(&mut T),
{
    fn apply_redo(&self, target: &mut T) {
        (self.redo)(target);
    }

    fn apply_undo(&self, target: &mut T) {
        (self.undo)(target);
    }
}

impl<U, R> std::fmt::Debug for FnChange<U, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnChange").finish_non_exhaustive()
    }
}
