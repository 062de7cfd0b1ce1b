mod orchestrator;
mod profile;
mod scoring;
mod types;


pub use orchestrator::{OrchestratorConfig, SessionOrchestrator};
pub use profile::{
    topic_proficiency, update_behavioral, update_cognitive, update_motivational, ProfileConfig,
    SessionObservation,
};
pub use scoring::{
    FallbackScorer, LengthHeuristicScorer, ResponseScorer, ScoreRequest, ScoredResponse,
};
pub use types::{
    AbandonSessionView, ActiveSessionView, CompleteSessionView, CompletionSummary, ItemView,
    PlanSummaryView, RecordResponseRequest, RecordResponseView, StartSessionView,
};

#[cfg(any(test, feature = "testing"))]
pub use scoring::MockResponseScorer;
