/// Non-owning handles to the object a history edits.
use std::cell::RefCell;
use std::rc;
use std::sync::{self, Mutex, PoisonError};

use crate::error::{HistoryError, Result};

/// A weak reference to a mutable target.
///
/// The history never keeps its target alive. It resolves the handle only
/// for the duration of a single change application and reports absence
/// instead of touching a dropped value.
pub trait TargetRef {
    type Target;

    /// Whether the referent still exists.
    fn is_alive(&self) -> bool;

    /// Runs `f` against the live target.
    ///
    /// # Errors
    ///
    /// Returns without calling `f`:
    /// - `TargetUnavailable` if the target has been dropped.
    /// - `InvalidState` if the target exists but cannot be borrowed right now.
    fn with_target<R>(&self, f: impl FnOnce(&mut Self::Target) -> R) -> Result<R>;
}

/// Single-threaded targets.
///
/// A target that is borrowed elsewhere, shared or mutably, is reported as
/// busy rather than panicking.
impl<T> TargetRef for rc::Weak<RefCell<T>> {
    type Target = T;

    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }

    fn with_target<R>(&self, f: impl FnOnce(&mut Self::Target) -> R) -> Result<R> {
        let strong = self.upgrade().ok_or(HistoryError::TargetUnavailable)?;
        let mut target = strong.try_borrow_mut().map_err(|_| {
            HistoryError::invalid_state("history target is borrowed elsewhere")
        })?;
        let result = f(&mut target);
        Ok(result)
    }
}

/// Targets shared across threads.
///
/// A poisoned lock is recovered: the panic that poisoned it is the caller's
/// concern, and the target itself is still alive.
impl<T> TargetRef for sync::Weak<Mutex<T>> {
    type Target = T;

    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }

    fn with_target<R>(&self, f: impl FnOnce(&mut Self::Target) -> R) -> Result<R> {
        let strong = self.upgrade().ok_or(HistoryError::TargetUnavailable)?;
        let mut target = strong.lock().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut target);
        Ok(result)
    }
}
