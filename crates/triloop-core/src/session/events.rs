use serde::{Deserialize, Serialize};

/// Events accepted by the session reducer. Timestamps travel alongside the
/// event at the reduce call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEvent {
    StartSession,
    PauseSession,
    ResumeSession,
    CompleteActivity { activity_id: String },
    AdvanceStage,
    SkipStage { reason: String },
    CompleteSession,
    AbandonSession { reason: String },
    ResumeAbandoned,
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::StartSession => "START_SESSION",
            SessionEvent::PauseSession => "PAUSE_SESSION",
            SessionEvent::ResumeSession => "RESUME_SESSION",
            SessionEvent::CompleteActivity { .. } => "COMPLETE_ACTIVITY",
            SessionEvent::AdvanceStage => "ADVANCE_STAGE",
            SessionEvent::SkipStage { .. } => "SKIP_STAGE",
            SessionEvent::CompleteSession => "COMPLETE_SESSION",
            SessionEvent::AbandonSession { .. } => "ABANDON_SESSION",
            SessionEvent::ResumeAbandoned => "RESUME_ABANDONED",
        }
    }
}
