//! Adaptive spaced-repetition engine.
//!
//! Four cooperating parts drive every learning session through the
//! encounter -> analysis -> return loop:
//!
//! - [`fsrs`]: the per-item memory model (stability, difficulty,
//!   retrievability) with interval derivation and weekly weight tuning.
//! - [`adaptive`]: the rule-based planner that decides what a session
//!   presents, how hard it is, and in what order.
//! - [`session`]: the pure reducer that moves a session through its stages
//!   under duration guards.
//! - [`services`]: the orchestrator composing all of the above over the
//!   repository ports, plus the four-layer learner profile refresh.
//!
//! The engine performs no I/O of its own: persistence and collaborators are
//! consumed through the traits in [`ports`].

pub mod adaptive;
pub mod analytics;
pub mod domain;
pub mod fsrs;
pub mod ports;
pub mod services;
pub mod session;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use domain::{
    AssessmentEvent, ContentItem, EngineError, FsrsMemoryRow, FsrsParameters,
    LearnerBehavioralState, LearnerCognitiveProfile, LearnerKcState, LearnerMotivationalState,
    LearnerTopicProficiency, LoopStage, RiskLabel, ScoringMethod, SessionRow, SessionStatus,
    SessionType, Topic, TrendLabel, UserAccount,
};

pub use fsrs::{
    apply, current_retrievability, is_due, optimize_weights, retrievability, schedule, CardState,
    FsrsCard, FsrsSchedule, LearnerReviewStats, Rating, TunedParameters, DEFAULT_TARGET_RETENTION,
    DEFAULT_WEIGHTS,
};

pub use adaptive::{
    compose_queue, detect_learner_protocol, detect_zombie, plan, plan_remediation, plan_small,
    LearnerProtocol, PlanRequest, ProtocolDecision, ProtocolInput, RemediationPlan,
    RemediationStrategy, SelectedItem, SelectionReason, SessionPlan, StageBalance,
    TopicCandidates, ZombieInput, ZombieStatus,
};

pub use session::{
    reduce, reduce_with_guards, PlannedBalance, QueueEntry, SessionEvent, SessionGuards,
    SessionState, StageConfig, TransitionError, TransitionErrorKind,
};

pub use analytics::{AnalyticsEvent, AnalyticsSink, CollectingSink, NullSink, TracingSink};

pub use ports::{AuthContext, AuthProvider, CompletionWrite, ContentRepository, LearnerRepository};

pub use services::{
    ActiveSessionView, CompleteSessionView, CompletionSummary, FallbackScorer,
    LengthHeuristicScorer, OrchestratorConfig, ProfileConfig, RecordResponseRequest,
    RecordResponseView, ResponseScorer, ScoreRequest, ScoredResponse, SessionObservation,
    SessionOrchestrator, StartSessionView,
};
