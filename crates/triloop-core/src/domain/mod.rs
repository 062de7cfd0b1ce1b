pub mod error;
pub mod models;

pub use error::EngineError;
pub use models::{
    AssessmentEvent, ContentItem, FsrsMemoryRow, FsrsParameters, LearnerBehavioralState,
    LearnerCognitiveProfile, LearnerKcState, LearnerMotivationalState, LearnerTopicProficiency,
    LoopStage, RiskLabel, RunningAccuracy, ScoringMethod, SessionRow, SessionStatus, SessionType,
    StageTimeRatio, Topic, TrendLabel, UserAccount, WeeklyEngagement,
};
