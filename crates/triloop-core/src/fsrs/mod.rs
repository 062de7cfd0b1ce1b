//! FSRS-5 memory model: per-item stability/difficulty/retrievability,
//! interval derivation, and the weekly weight-tuning heuristic.

pub mod card;
pub mod engine;
pub mod optimizer;

pub use card::{
    CardState, FsrsCard, FsrsSchedule, Rating, DEFAULT_TARGET_RETENTION, DEFAULT_WEIGHTS,
};
pub use engine::{apply, current_retrievability, is_due, retrievability, schedule};
pub use optimizer::{optimize_weights, LearnerReviewStats, TunedParameters};
