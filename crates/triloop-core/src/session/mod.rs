//! Session state machine: a pure reducer over [`SessionState`] with guarded
//! stage transitions and wall-clock duration accounting.

pub mod events;
pub mod reducer;
pub mod state;

pub use events::SessionEvent;
pub use reducer::{
    reduce, reduce_with_guards, DefaultGuards, SessionGuards, TransitionError, TransitionErrorKind,
};
pub use state::{PlannedBalance, QueueEntry, SessionState, StageConfig};
