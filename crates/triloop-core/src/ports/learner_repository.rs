use crate::domain::{
    AssessmentEvent, FsrsMemoryRow, FsrsParameters, LearnerBehavioralState, LearnerCognitiveProfile,
    LearnerKcState, LearnerMotivationalState, LearnerTopicProficiency, SessionRow, SessionStatus,
    UserAccount,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Every write of a session completion, applied in one transaction: the
/// session row flips to its terminal status together with the KC states,
/// memory rows and the refreshed four-layer profile.
#[derive(Debug, Clone)]
pub struct CompletionWrite {
    pub session_id: String,
    pub status: SessionStatus,
    pub completed_at: DateTime<Utc>,
    pub duration_s: u32,
    pub accuracy: Option<f64>,
    pub snapshot: serde_json::Value,
    pub kc_states: Vec<LearnerKcState>,
    pub memory_rows: Vec<FsrsMemoryRow>,
    pub topic_proficiency: LearnerTopicProficiency,
    pub behavioral: LearnerBehavioralState,
    pub cognitive: LearnerCognitiveProfile,
    pub motivational: LearnerMotivationalState,
}

/// Per-learner persistence. Implementations own transactionality: the
/// `*_atomic` methods either apply every write or none.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait LearnerRepository: Send + Sync {
    // ========================================================================
    // Users
    // ========================================================================

    async fn get_user(&self, user_id: &str) -> anyhow::Result<Option<UserAccount>>;

    // ========================================================================
    // Sessions
    // ========================================================================

    async fn insert_session(&self, session: &SessionRow) -> anyhow::Result<()>;

    async fn get_session(&self, session_id: &str) -> anyhow::Result<Option<SessionRow>>;

    /// Most recently started `in_progress` session for the user.
    async fn get_active_session(&self, user_id: &str) -> anyhow::Result<Option<SessionRow>>;

    /// Most recently started `in_progress` session for (user, topic).
    async fn get_active_session_for_topic(
        &self,
        user_id: &str,
        topic_id: &str,
    ) -> anyhow::Result<Option<SessionRow>>;

    /// Update only the session's status and snapshot (abandonment and
    /// recovery paths).
    async fn update_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        snapshot: &serde_json::Value,
    ) -> anyhow::Result<()>;

    /// Sessions started at or after `since`.
    async fn count_sessions_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<u32>;

    /// Most recent completed sessions, newest first.
    async fn get_recent_completed_sessions(
        &self,
        user_id: &str,
        limit: u32,
    ) -> anyhow::Result<Vec<SessionRow>>;

    // ========================================================================
    // Assessment events
    // ========================================================================

    /// Insert an assessment event and the updated session snapshot in one
    /// transaction.
    async fn save_response_atomic(
        &self,
        event: &AssessmentEvent,
        session_id: &str,
        snapshot: &serde_json::Value,
    ) -> anyhow::Result<()>;

    async fn list_events_for_session(
        &self,
        session_id: &str,
    ) -> anyhow::Result<Vec<AssessmentEvent>>;

    // ========================================================================
    // FSRS memory
    // ========================================================================

    /// Memory rows keyed by memory item id.
    async fn get_memory_rows(
        &self,
        user_id: &str,
        memory_item_ids: &[String],
    ) -> anyhow::Result<HashMap<String, FsrsMemoryRow>>;

    /// Concept-level return rows keyed by KC id.
    async fn get_return_memory_rows(
        &self,
        user_id: &str,
        kc_ids: &[String],
    ) -> anyhow::Result<HashMap<String, FsrsMemoryRow>>;

    /// All memory rows for a user (weight-tuning aggregation).
    async fn get_all_memory_rows(&self, user_id: &str) -> anyhow::Result<Vec<FsrsMemoryRow>>;

    // ========================================================================
    // Learner knowledge and profile
    // ========================================================================

    /// KC states keyed by KC id.
    async fn get_kc_states(
        &self,
        user_id: &str,
        kc_ids: &[String],
    ) -> anyhow::Result<HashMap<String, LearnerKcState>>;

    async fn get_topic_proficiency(
        &self,
        user_id: &str,
        topic_id: &str,
    ) -> anyhow::Result<Option<LearnerTopicProficiency>>;

    async fn get_behavioral_state(
        &self,
        user_id: &str,
    ) -> anyhow::Result<Option<LearnerBehavioralState>>;

    async fn get_cognitive_profile(
        &self,
        user_id: &str,
    ) -> anyhow::Result<Option<LearnerCognitiveProfile>>;

    async fn get_motivational_state(
        &self,
        user_id: &str,
    ) -> anyhow::Result<Option<LearnerMotivationalState>>;

    /// Increment the motivational abandonment counter for a stage.
    async fn record_abandonment(&self, user_id: &str, stage: &str) -> anyhow::Result<()>;

    // ========================================================================
    // FSRS parameters
    // ========================================================================

    async fn get_fsrs_parameters(&self, user_id: &str) -> anyhow::Result<Option<FsrsParameters>>;

    async fn upsert_fsrs_parameters(
        &self,
        user_id: &str,
        parameters: &FsrsParameters,
    ) -> anyhow::Result<()>;

    // ========================================================================
    // Session completion (single transaction)
    // ========================================================================

    /// Apply a full completion write atomically.
    async fn complete_session_atomic(&self, write: &CompletionWrite) -> anyhow::Result<()>;
}
