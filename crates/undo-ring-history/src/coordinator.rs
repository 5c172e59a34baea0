/// Undo/redo coordinator for a single weakly referenced target.
///
/// Owns the ring of recorded changes and replays them against the target.
/// All calls must come from the thread that created the coordinator, and
/// history cannot be modified while a change is being replayed.
use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::rc::{self, Rc};
use std::sync::{self, Arc, Mutex};
use std::thread::{self, ThreadId};

use crate::change::{Change, FnChange};
use crate::config::{ExhaustionPolicy, HistoryConfig};
use crate::error::{HistoryError, Result};
use crate::ring::RingBuffer;
use crate::target::TargetRef;

/// History bound to a single-threaded `Rc<RefCell<T>>` target.
pub type LocalHistory<T> = Coordinator<T>;

/// History bound to an `Arc<Mutex<T>>` target.
///
/// Changes must be `Send + Sync`, which makes the history itself `Send`:
/// it can be handed to another thread, but calls from any thread other
/// than the creating one are rejected.
pub type SharedHistory<T> = Coordinator<T, sync::Weak<Mutex<T>>, dyn Change<T> + Send + Sync>;

/// What the coordinator is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayState {
    #[default]
    Idle,
    Undoing,
    Redoing,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Undo,
    Redo,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Self::Undo => "undo",
            Self::Redo => "redo",
        }
    }

    fn state(self) -> ReplayState {
        match self {
            Self::Undo => ReplayState::Undoing,
            Self::Redo => ReplayState::Redoing,
        }
    }

    fn exhausted(self) -> HistoryError {
        match self {
            Self::Undo => HistoryError::NothingToUndo,
            Self::Redo => HistoryError::NothingToRedo,
        }
    }
}

/// Marks the coordinator as replaying until dropped.
///
/// Dropping restores `Idle` on every exit path, including a panic raised
/// by the change being applied.
struct ReplayGuard<'a> {
    state: &'a Cell<ReplayState>,
}

impl<'a> ReplayGuard<'a> {
    fn enter(state: &'a Cell<ReplayState>, next: ReplayState) -> Self {
        state.set(next);
        Self { state }
    }
}

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        self.state.set(ReplayState::Idle);
    }
}

/// Records reversible changes and replays them against one target.
///
/// - `T`: the target type changes operate on.
/// - `H`: the weak handle used to reach the target.
/// - `C`: the change type stored in the ring, usually a trait object.
///
/// Every method takes `&self`, so a change being replayed may hold a
/// reference back to its own coordinator; any attempt to record or replay
/// from inside a replay fails with `InvalidState`.
pub struct Coordinator<T, H = rc::Weak<RefCell<T>>, C: ?Sized = dyn Change<T>> {
    history: RefCell<RingBuffer<Arc<C>>>,
    target: H,
    owner: ThreadId,
    state: Cell<ReplayState>,
    undo_policy: ExhaustionPolicy,
    redo_policy: ExhaustionPolicy,
    _target: PhantomData<fn() -> T>,
}

impl<T, H, C: ?Sized> std::fmt::Debug for Coordinator<T, H, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let history = self.history.try_borrow();
        f.debug_struct("Coordinator")
            .field("owner", &self.owner)
            .field("state", &self.state.get())
            .field("capacity", &history.as_ref().map(|h| h.capacity()).ok())
            .field("undo_count", &history.as_ref().map(|h| h.undoable_count()).ok())
            .field("redo_count", &history.as_ref().map(|h| h.redoable_count()).ok())
            .field("undo_policy", &self.undo_policy)
            .field("redo_policy", &self.redo_policy)
            .finish()
    }
}

impl<T, H, C> Coordinator<T, H, C>
where
    H: TargetRef<Target = T>,
    C: Change<T> + ?Sized,
{
    /// Creates a coordinator bound to `target` and to the calling thread.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the target handle is already dead.
    pub fn new(target: H, config: &HistoryConfig) -> Result<Self> {
        if !target.is_alive() {
            return Err(HistoryError::invalid_argument(
                "history target must be alive at construction",
            ));
        }

        Ok(Self {
            history: RefCell::new(RingBuffer::new(config.capacity)),
            target,
            owner: thread::current().id(),
            state: Cell::new(ReplayState::Idle),
            undo_policy: config.undo_policy,
            redo_policy: config.redo_policy,
            _target: PhantomData,
        })
    }

    /// Records a change that has already been applied to the target.
    ///
    /// Discards everything that could have been redone.
    ///
    /// # Errors
    ///
    /// - `ContextViolation` if called from a foreign thread.
    /// - `InvalidState` if called while a change is being replayed.
    pub fn push_change(&self, change: Arc<C>) -> Result<()> {
        self.ensure_owner()?;
        self.ensure_idle("record a change")?;

        let mut history = self.history.borrow_mut();
        history.push(change);
        tracing::debug!(
            undo_count = history.undoable_count(),
            capacity = history.capacity(),
            "Recorded change"
        );
        Ok(())
    }

    /// Reverses the most recent change.
    ///
    /// With the `Ignore` policy an empty history is a no-op.
    ///
    /// # Errors
    ///
    /// - `ContextViolation` if called from a foreign thread.
    /// - `InvalidState` if called while a change is being replayed.
    /// - `NothingToUndo` if the history is empty and the policy is `Fail`.
    /// - `TargetUnavailable` if the target has been dropped.
    /// - `InvalidState` if the target is alive but borrowed elsewhere.
    pub fn undo(&self) -> Result<()> {
        self.replay(Direction::Undo)
    }

    /// Reapplies the most recently undone change.
    ///
    /// # Errors
    ///
    /// Mirrors [`Coordinator::undo`], with `NothingToRedo`.
    pub fn redo(&self) -> Result<()> {
        self.replay(Direction::Redo)
    }

    // Status queries are confined to the owning thread like the mutators.
    // Each one fails with `ContextViolation` when called from anywhere else.

    pub fn can_undo(&self) -> Result<bool> {
        self.inspect(RingBuffer::can_undo)
    }

    pub fn can_redo(&self) -> Result<bool> {
        self.inspect(RingBuffer::can_redo)
    }

    pub fn undo_count(&self) -> Result<usize> {
        self.inspect(RingBuffer::undoable_count)
    }

    pub fn redo_count(&self) -> Result<usize> {
        self.inspect(RingBuffer::redoable_count)
    }

    pub fn capacity(&self) -> Result<usize> {
        self.inspect(RingBuffer::capacity)
    }

    /// Whether the target still exists.
    pub fn is_target_alive(&self) -> Result<bool> {
        self.ensure_owner()?;
        Ok(self.target.is_alive())
    }

    pub fn replay_state(&self) -> Result<ReplayState> {
        self.ensure_owner()?;
        Ok(self.state.get())
    }

    pub fn is_replaying(&self) -> Result<bool> {
        Ok(self.replay_state()? != ReplayState::Idle)
    }

    pub fn undo_policy(&self) -> Result<ExhaustionPolicy> {
        self.ensure_owner()?;
        Ok(self.undo_policy)
    }

    pub fn redo_policy(&self) -> Result<ExhaustionPolicy> {
        self.ensure_owner()?;
        Ok(self.redo_policy)
    }

    fn inspect<R>(&self, f: impl FnOnce(&RingBuffer<Arc<C>>) -> R) -> Result<R> {
        self.ensure_owner()?;
        Ok(f(&self.history.borrow()))
    }

    fn replay(&self, direction: Direction) -> Result<()> {
        self.ensure_owner()?;
        self.ensure_idle(direction.label())?;
        let _guard = ReplayGuard::enter(&self.state, direction.state());

        let (available, policy) = {
            let history = self.history.borrow();
            match direction {
                Direction::Undo => (history.can_undo(), self.undo_policy),
                Direction::Redo => (history.can_redo(), self.redo_policy),
            }
        };
        if !available {
            return match policy {
                ExhaustionPolicy::Ignore => {
                    tracing::trace!("Nothing to {}, ignoring", direction.label());
                    Ok(())
                }
                ExhaustionPolicy::Fail => Err(direction.exhausted()),
            };
        }

        // The ring only moves once the target has been resolved, so a dropped
        // or busy target leaves the history where it was.
        let applied = self.target.with_target(|target| -> Result<()> {
            let change = match direction {
                Direction::Undo => Arc::clone(self.history.borrow_mut().undo()?),
                Direction::Redo => Arc::clone(self.history.borrow_mut().redo()?),
            };
            match direction {
                Direction::Undo => change.apply_undo(target),
                Direction::Redo => change.apply_redo(target),
            }
            Ok(())
        });

        match applied.and_then(|result| result) {
            Ok(()) => {
                let history = self.history.borrow();
                tracing::debug!(
                    undo_count = history.undoable_count(),
                    redo_count = history.redoable_count(),
                    "Applied {}",
                    direction.label()
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Cannot {}: {e}", direction.label());
                Err(e)
            }
        }
    }

    fn ensure_owner(&self) -> Result<()> {
        let caller = thread::current().id();
        if caller != self.owner {
            tracing::warn!(owner = ?self.owner, caller = ?caller, "History accessed from a foreign thread");
            return Err(HistoryError::ContextViolation {
                owner: self.owner,
                caller,
            });
        }
        Ok(())
    }

    fn ensure_idle(&self, action: &str) -> Result<()> {
        match self.state.get() {
            ReplayState::Idle => Ok(()),
            state => Err(HistoryError::invalid_state(format!(
                "cannot {action} while history is {state:?}"
            ))),
        }
    }
}

impl<T, H> Coordinator<T, H>
where
    H: TargetRef<Target = T>,
    T: 'static,
{
    /// Records a change given as a pair of closures.
    ///
    /// # Errors
    ///
    /// Same as [`Coordinator::push_change`].
    pub fn push_fn<U, R>(&self, undo: U, redo: R) -> Result<()>
    where
        U: Fn(&mut T) + 'static,
        R: Fn(&mut T) + 'static,
    {
        self.push_change(Arc::new(FnChange::new(undo, redo)))
    }
}

impl<T> Coordinator<T> {
    /// Creates a history for a single-threaded target without owning it.
    ///
    /// # Errors
    ///
    /// See [`Coordinator::new`].
    pub fn attach(target: &Rc<RefCell<T>>, config: &HistoryConfig) -> Result<Self> {
        Self::new(Rc::downgrade(target), config)
    }
}

impl<T> SharedHistory<T> {
    /// Creates a history for a shared target without owning it.
    ///
    /// # Errors
    ///
    /// See [`Coordinator::new`].
    pub fn attach_shared(target: &Arc<Mutex<T>>, config: &HistoryConfig) -> Result<Self> {
        Self::new(Arc::downgrade(target), config)
    }

    /// Records a thread-safe closure pair.
    ///
    /// # Errors
    ///
    /// Same as [`Coordinator::push_change`].
    pub fn push_fn_shared<U, R>(&self, undo: U, redo: R) -> Result<()>
    where
        U: Fn(&mut T) + Send + Sync + 'static,
        R: Fn(&mut T) + Send + Sync + 'static,
    {
        self.push_change(Arc::new(FnChange::new(undo, redo)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Rc<RefCell<String>> {
        Rc::new(RefCell::new(text.to_string()))
    }

    /// Appends `s` to the target and records the edit.
    fn type_text(history: &LocalHistory<String>, target: &Rc<RefCell<String>>, s: &str) {
        target.borrow_mut().push_str(s);
        let len = s.len();
        let redo_text = s.to_string();
        history
            .push_fn(
                move |t: &mut String| t.truncate(t.len() - len),
                move |t: &mut String| t.push_str(&redo_text),
            )
            .expect("push");
    }

    fn strict() -> HistoryConfig {
        HistoryConfig::default()
            .with_undo_policy(ExhaustionPolicy::Fail)
            .with_redo_policy(ExhaustionPolicy::Fail)
    }

    #[test]
    fn test_undo_redo_basic() {
        let target = doc("");
        let history = LocalHistory::attach(&target, &HistoryConfig::default()).expect("attach");
        type_text(&history, &target, "hello");
        type_text(&history, &target, " world");

        history.undo().expect("undo");
        assert_eq!(*target.borrow(), "hello");
        assert!(history.can_redo().expect("can_redo"));

        history.redo().expect("redo");
        assert_eq!(*target.borrow(), "hello world");
        assert!(!history.can_redo().expect("can_redo"));
        assert_eq!(history.undo_count().expect("undo_count"), 2);
    }

    #[test]
    fn test_dead_handle_rejected_at_construction() {
        let result: Result<LocalHistory<String>> =
            Coordinator::new(rc::Weak::new(), &HistoryConfig::default());
        assert!(matches!(result, Err(HistoryError::InvalidArgument { .. })));
    }

    #[test]
    fn test_capacity_from_config_is_clamped() {
        let target = doc("");
        let history =
            LocalHistory::attach(&target, &HistoryConfig::default().with_capacity(0)).expect("attach");
        assert_eq!(history.capacity().expect("capacity"), 1);
    }

    #[test]
    fn test_lenient_policy_is_noop() {
        let target = doc("unchanged");
        let history = LocalHistory::attach(&target, &HistoryConfig::default()).expect("attach");

        history.undo().expect("undo no-op");
        history.redo().expect("redo no-op");
        assert_eq!(*target.borrow(), "unchanged");
        assert_eq!(history.replay_state().expect("replay_state"), ReplayState::Idle);
    }

    #[test]
    fn test_strict_policy_fails_when_exhausted() {
        let target = doc("");
        let history = LocalHistory::attach(&target, &strict()).expect("attach");

        assert!(matches!(history.undo(), Err(HistoryError::NothingToUndo)));
        assert!(matches!(history.redo(), Err(HistoryError::NothingToRedo)));
        assert!(!history.is_replaying().expect("is_replaying"));
    }

    #[test]
    fn test_undo_after_target_dropped() {
        let target = doc("");
        let history = LocalHistory::attach(&target, &strict()).expect("attach");
        type_text(&history, &target, "abc");
        drop(target);

        assert!(!history.is_target_alive().expect("is_target_alive"));
        assert!(matches!(history.undo(), Err(HistoryError::TargetUnavailable)));
        // Nothing was consumed from the ring.
        assert_eq!(history.undo_count().expect("undo_count"), 1);
        assert!(!history.is_replaying().expect("is_replaying"));
    }

    #[test]
    fn test_coordinator_does_not_keep_target_alive() {
        let target = doc("x");
        let history = LocalHistory::attach(&target, &HistoryConfig::default()).expect("attach");
        assert_eq!(Rc::strong_count(&target), 1);
        drop(target);
        assert!(!history.is_target_alive().expect("is_target_alive"));
    }

    #[test]
    fn test_push_during_replay_is_rejected() {
        let target = doc("");
        let history = Rc::new(LocalHistory::attach(&target, &HistoryConfig::default()).expect("attach"));
        let nested = Rc::new(Cell::new(None));

        let inner = Rc::downgrade(&history);
        let observed = Rc::clone(&nested);
        history
            .push_fn(
                move |_t: &mut String| {
                    if let Some(history) = inner.upgrade() {
                        let result = history.push_fn(|_: &mut String| {}, |_: &mut String| {});
                        observed.set(Some(matches!(result, Err(HistoryError::InvalidState { .. }))));
                        assert_eq!(history.replay_state().expect("replay_state"), ReplayState::Undoing);
                    }
                },
                |_t: &mut String| {},
            )
            .expect("push");

        history.undo().expect("undo");
        assert_eq!(nested.get(), Some(true));
        assert_eq!(history.replay_state().expect("replay_state"), ReplayState::Idle);
        assert_eq!(history.undo_count().expect("undo_count"), 0);
        assert_eq!(history.redo_count().expect("redo_count"), 1);
    }

    #[test]
    fn test_nested_replay_is_rejected() {
        let target = doc("");
        let history = Rc::new(LocalHistory::attach(&target, &HistoryConfig::default()).expect("attach"));
        let nested = Rc::new(Cell::new(None));

        let inner = Rc::downgrade(&history);
        let observed = Rc::clone(&nested);
        history
            .push_fn(|_t: &mut String| {}, move |_t: &mut String| {
                if let Some(history) = inner.upgrade() {
                    observed.set(Some(matches!(history.undo(), Err(HistoryError::InvalidState { .. }))));
                }
            })
            .expect("push");

        history.undo().expect("undo");
        history.redo().expect("redo");
        assert_eq!(nested.get(), Some(true));
        assert!(!history.is_replaying().expect("is_replaying"));
    }

    #[test]
    fn test_panicking_change_releases_replay_state() {
        let target = doc("");
        let history = LocalHistory::attach(&target, &HistoryConfig::default()).expect("attach");
        history
            .push_fn(|_: &mut String| panic!("undo failed"), |_: &mut String| {})
            .expect("push");

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| history.undo()));
        assert!(outcome.is_err());
        assert_eq!(history.replay_state().expect("replay_state"), ReplayState::Idle);

        // The coordinator is still usable afterwards.
        type_text(&history, &target, "ok");
        history.undo().expect("undo");
        assert_eq!(*target.borrow(), "");
    }

    #[test]
    fn test_foreign_thread_is_rejected() {
        let target = Arc::new(Mutex::new(String::new()));
        let history = SharedHistory::attach_shared(&target, &HistoryConfig::default()).expect("attach");
        history
            .push_fn_shared(|t: &mut String| t.clear(), |t: &mut String| t.push('a'))
            .expect("push");

        let (history, push, undo) = thread::spawn(move || {
            let push = history.push_fn_shared(|_: &mut String| {}, |_: &mut String| {});
            let undo = history.undo();
            (history, push, undo)
        })
        .join()
        .expect("join");

        assert!(matches!(push, Err(HistoryError::ContextViolation { .. })));
        assert!(matches!(undo, Err(HistoryError::ContextViolation { .. })));
        assert_eq!(history.undo_count().expect("undo_count"), 1);
        assert_eq!(history.redo_count().expect("redo_count"), 0);
    }

    #[test]
    fn test_foreign_thread_queries_are_rejected() {
        let target = Arc::new(Mutex::new(String::new()));
        let history = SharedHistory::attach_shared(&target, &strict()).expect("attach");
        history
            .push_fn_shared(|t: &mut String| t.clear(), |t: &mut String| t.push('a'))
            .expect("push");

        let (history, violations) = thread::spawn(move || {
            let violations = [
                history.can_undo().err(),
                history.can_redo().err(),
                history.undo_count().err(),
                history.redo_count().err(),
                history.capacity().err(),
                history.is_target_alive().err(),
                history.replay_state().err(),
                history.is_replaying().err(),
                history.undo_policy().err(),
                history.redo_policy().err(),
            ]
            .iter()
            .filter(|err| matches!(err, Some(HistoryError::ContextViolation { .. })))
            .count();
            (history, violations)
        })
        .join()
        .expect("join");

        assert_eq!(violations, 10);
        assert!(history.can_undo().expect("can_undo"));
        assert_eq!(history.undo_count().expect("undo_count"), 1);
        assert_eq!(history.undo_policy().expect("undo_policy"), ExhaustionPolicy::Fail);
    }

    #[test]
    fn test_undo_while_target_is_read_reports_busy_target() {
        let target = doc("");
        let history = LocalHistory::attach(&target, &strict()).expect("attach");
        type_text(&history, &target, "abc");

        let reader = target.borrow();
        match history.undo() {
            Err(HistoryError::InvalidState { message }) => assert!(message.contains("borrowed")),
            other => panic!("expected InvalidState, got {other:?}"),
        }
        assert!(history.is_target_alive().expect("is_target_alive"));
        assert_eq!(history.undo_count().expect("undo_count"), 1);
        assert!(!history.is_replaying().expect("is_replaying"));
        drop(reader);

        history.undo().expect("undo");
        assert_eq!(*target.borrow(), "");
    }

    #[test]
    fn test_debug_output() {
        let target = doc("");
        let history = LocalHistory::attach(&target, &HistoryConfig::default()).expect("attach");
        let debug = format!("{history:?}");
        assert!(debug.contains("Coordinator"));
        assert!(debug.contains("Idle"));
    }
}
