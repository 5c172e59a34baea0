/// Undo/redo history in a fixed-capacity ring.
///
/// Provides a `RingBuffer` that tracks undoable and redoable entries without
/// reallocating, and a `Coordinator` that replays recorded changes against a
/// weakly referenced target from a single owning thread.
pub mod change;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod ring;
pub mod target;

pub use change::{Change, FnChange};
pub use config::{ExhaustionPolicy, HistoryConfig};
pub use coordinator::{Coordinator, LocalHistory, ReplayState, SharedHistory};
pub use error::{HistoryError, Result};
pub use ring::RingBuffer;
pub use target::TargetRef;
