//! In-memory implementations of the triloop repository ports.
//!
//! Backed by a single `RwLock`-protected store, so the `*_atomic` methods
//! are genuinely atomic: every write happens under one lock acquisition.
//! Used by the integration tests and for embedding the engine without a
//! database.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use triloop_core::domain::{
    AssessmentEvent, ContentItem, FsrsMemoryRow, FsrsParameters, LearnerBehavioralState,
    LearnerCognitiveProfile, LearnerKcState, LearnerMotivationalState, LearnerTopicProficiency,
    LoopStage, SessionRow, SessionStatus, UserAccount,
};
use triloop_core::ports::{
    AuthContext, AuthProvider, CompletionWrite, ContentRepository, LearnerRepository,
};

// ============================================================================
// Content repository
// ============================================================================

/// Static content pool.
pub struct InMemoryContentRepository {
    topics: HashMap<String, String>,
    items: Vec<ContentItem>,
}

impl InMemoryContentRepository {
    pub fn new(topics: Vec<(String, String)>, items: Vec<ContentItem>) -> Self {
        Self {
            topics: topics.into_iter().collect(),
            items,
        }
    }

    /// Build the topic table from the items themselves.
    pub fn from_items(items: Vec<ContentItem>) -> Self {
        let topics = items
            .iter()
            .map(|i| (i.topic_id.clone(), i.topic_id.clone()))
            .collect();
        Self { topics, items }
    }
}

#[async_trait]
impl ContentRepository for InMemoryContentRepository {
    async fn topic_exists(&self, topic_id: &str) -> Result<bool> {
        Ok(self.topics.contains_key(topic_id))
    }

    async fn get_topic_name(&self, topic_id: &str) -> Result<Option<String>> {
        Ok(self.topics.get(topic_id).cloned())
    }

    async fn get_active_items(&self) -> Result<Vec<ContentItem>> {
        let mut items: Vec<ContentItem> =
            self.items.iter().filter(|i| i.is_active).cloned().collect();
        items.sort_by(|a, b| {
            let stage_rank = |s: LoopStage| match s {
                LoopStage::Encounter => 0,
                LoopStage::Analysis => 1,
                LoopStage::Return => 2,
            };
            stage_rank(a.stage)
                .cmp(&stage_rank(b.stage))
                .then(a.difficulty_level.cmp(&b.difficulty_level))
                .then(a.id.cmp(&b.id))
        });
        Ok(items)
    }

    async fn get_items_by_ids(&self, ids: &[String]) -> Result<Vec<ContentItem>> {
        Ok(self
            .items
            .iter()
            .filter(|i| ids.contains(&i.id))
            .cloned()
            .collect())
    }

    async fn get_primary_kc(&self, content_item_id: &str) -> Result<Option<String>> {
        Ok(self
            .items
            .iter()
            .find(|i| i.id == content_item_id)
            .and_then(|i| i.primary_kc_id.clone()))
    }

    async fn get_topic_kcs(&self, topic_id: &str) -> Result<Vec<String>> {
        let mut kcs: Vec<String> = self
            .items
            .iter()
            .filter(|i| i.topic_id == topic_id)
            .filter_map(|i| i.primary_kc_id.clone())
            .collect();
        kcs.sort();
        kcs.dedup();
        Ok(kcs)
    }
}

// ============================================================================
// Learner repository
// ============================================================================

#[derive(Default)]
struct LearnerStore {
    users: HashMap<String, UserAccount>,
    sessions: HashMap<String, SessionRow>,
    events: Vec<AssessmentEvent>,
    /// Keyed by (user_id, memory_item_id).
    memory_rows: HashMap<(String, String), FsrsMemoryRow>,
    /// Keyed by (user_id, kc_id).
    kc_states: HashMap<(String, String), LearnerKcState>,
    /// Keyed by (user_id, topic_id).
    topic_proficiency: HashMap<(String, String), LearnerTopicProficiency>,
    behavioral: HashMap<String, LearnerBehavioralState>,
    cognitive: HashMap<String, LearnerCognitiveProfile>,
    motivational: HashMap<String, LearnerMotivationalState>,
    fsrs_parameters: HashMap<String, FsrsParameters>,
}

/// HashMap-backed learner persistence.
#[derive(Default)]
pub struct InMemoryLearnerRepository {
    store: RwLock<LearnerStore>,
}

impl InMemoryLearnerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: UserAccount) {
        self.store.write().unwrap().users.insert(user.id.clone(), user);
    }

    // ------------------------------------------------------------------
    // Assertion helpers for tests
    // ------------------------------------------------------------------

    pub fn session(&self, session_id: &str) -> Option<SessionRow> {
        self.store.read().unwrap().sessions.get(session_id).cloned()
    }

    pub fn events_for(&self, session_id: &str) -> Vec<AssessmentEvent> {
        self.store
            .read()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect()
    }

    pub fn memory_row(&self, user_id: &str, memory_item_id: &str) -> Option<FsrsMemoryRow> {
        self.store
            .read()
            .unwrap()
            .memory_rows
            .get(&(user_id.to_string(), memory_item_id.to_string()))
            .cloned()
    }

    pub fn kc_state(&self, user_id: &str, kc_id: &str) -> Option<LearnerKcState> {
        self.store
            .read()
            .unwrap()
            .kc_states
            .get(&(user_id.to_string(), kc_id.to_string()))
            .cloned()
    }

    pub fn motivational(&self, user_id: &str) -> Option<LearnerMotivationalState> {
        self.store.read().unwrap().motivational.get(user_id).cloned()
    }

    pub fn behavioral(&self, user_id: &str) -> Option<LearnerBehavioralState> {
        self.store.read().unwrap().behavioral.get(user_id).cloned()
    }
}

#[async_trait]
impl LearnerRepository for InMemoryLearnerRepository {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserAccount>> {
        Ok(self.store.read().unwrap().users.get(user_id).cloned())
    }

    async fn insert_session(&self, session: &SessionRow) -> Result<()> {
        let mut store = self.store.write().unwrap();
        store.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRow>> {
        Ok(self.store.read().unwrap().sessions.get(session_id).cloned())
    }

    async fn get_active_session(&self, user_id: &str) -> Result<Option<SessionRow>> {
        Ok(self
            .store
            .read()
            .unwrap()
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.status == SessionStatus::InProgress)
            .max_by_key(|s| s.started_at)
            .cloned())
    }

    async fn get_active_session_for_topic(
        &self,
        user_id: &str,
        topic_id: &str,
    ) -> Result<Option<SessionRow>> {
        Ok(self
            .store
            .read()
            .unwrap()
            .sessions
            .values()
            .filter(|s| {
                s.user_id == user_id
                    && s.topic_id == topic_id
                    && s.status == SessionStatus::InProgress
            })
            .max_by_key(|s| s.started_at)
            .cloned())
    }

    async fn update_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        snapshot: &serde_json::Value,
    ) -> Result<()> {
        let mut store = self.store.write().unwrap();
        let session = store
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| anyhow::anyhow!("unknown session {session_id}"))?;
        session.status = status;
        session.adaptive_decisions = snapshot.clone();
        Ok(())
    }

    async fn count_sessions_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<u32> {
        Ok(self
            .store
            .read()
            .unwrap()
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.started_at >= since)
            .count() as u32)
    }

    async fn get_recent_completed_sessions(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<SessionRow>> {
        let store = self.store.read().unwrap();
        let mut sessions: Vec<SessionRow> = store
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.status == SessionStatus::Completed)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| std::cmp::Reverse(s.started_at));
        sessions.truncate(limit as usize);
        Ok(sessions)
    }

    async fn save_response_atomic(
        &self,
        event: &AssessmentEvent,
        session_id: &str,
        snapshot: &serde_json::Value,
    ) -> Result<()> {
        let mut store = self.store.write().unwrap();
        let session = store
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| anyhow::anyhow!("unknown session {session_id}"))?;
        session.adaptive_decisions = snapshot.clone();
        store.events.push(event.clone());
        Ok(())
    }

    async fn list_events_for_session(&self, session_id: &str) -> Result<Vec<AssessmentEvent>> {
        Ok(self
            .store
            .read()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn get_memory_rows(
        &self,
        user_id: &str,
        memory_item_ids: &[String],
    ) -> Result<HashMap<String, FsrsMemoryRow>> {
        let store = self.store.read().unwrap();
        let mut rows = HashMap::new();
        for id in memory_item_ids {
            if let Some(row) = store.memory_rows.get(&(user_id.to_string(), id.clone())) {
                rows.insert(id.clone(), row.clone());
            }
        }
        Ok(rows)
    }

    async fn get_return_memory_rows(
        &self,
        user_id: &str,
        kc_ids: &[String],
    ) -> Result<HashMap<String, FsrsMemoryRow>> {
        let store = self.store.read().unwrap();
        let mut rows = HashMap::new();
        for ((uid, _), row) in store.memory_rows.iter() {
            if uid != user_id || row.stage_type != LoopStage::Return {
                continue;
            }
            if let Some(kc_id) = &row.kc_id {
                if kc_ids.contains(kc_id) {
                    rows.insert(kc_id.clone(), row.clone());
                }
            }
        }
        Ok(rows)
    }

    async fn get_all_memory_rows(&self, user_id: &str) -> Result<Vec<FsrsMemoryRow>> {
        Ok(self
            .store
            .read()
            .unwrap()
            .memory_rows
            .iter()
            .filter(|((uid, _), _)| uid == user_id)
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn get_kc_states(
        &self,
        user_id: &str,
        kc_ids: &[String],
    ) -> Result<HashMap<String, LearnerKcState>> {
        let store = self.store.read().unwrap();
        let mut states = HashMap::new();
        for kc_id in kc_ids {
            if let Some(state) = store.kc_states.get(&(user_id.to_string(), kc_id.clone())) {
                states.insert(kc_id.clone(), state.clone());
            }
        }
        Ok(states)
    }

    async fn get_topic_proficiency(
        &self,
        user_id: &str,
        topic_id: &str,
    ) -> Result<Option<LearnerTopicProficiency>> {
        Ok(self
            .store
            .read()
            .unwrap()
            .topic_proficiency
            .get(&(user_id.to_string(), topic_id.to_string()))
            .cloned())
    }

    async fn get_behavioral_state(&self, user_id: &str) -> Result<Option<LearnerBehavioralState>> {
        Ok(self.store.read().unwrap().behavioral.get(user_id).cloned())
    }

    async fn get_cognitive_profile(
        &self,
        user_id: &str,
    ) -> Result<Option<LearnerCognitiveProfile>> {
        Ok(self.store.read().unwrap().cognitive.get(user_id).cloned())
    }

    async fn get_motivational_state(
        &self,
        user_id: &str,
    ) -> Result<Option<LearnerMotivationalState>> {
        Ok(self.store.read().unwrap().motivational.get(user_id).cloned())
    }

    async fn record_abandonment(&self, user_id: &str, stage: &str) -> Result<()> {
        let mut store = self.store.write().unwrap();
        let state = store
            .motivational
            .entry(user_id.to_string())
            .or_insert_with(|| {
                LearnerMotivationalState::new_for_user(user_id.to_string(), Utc::now())
            });
        *state
            .abandonment_by_stage
            .entry(stage.to_string())
            .or_insert(0) += 1;
        Ok(())
    }

    async fn get_fsrs_parameters(&self, user_id: &str) -> Result<Option<FsrsParameters>> {
        Ok(self
            .store
            .read()
            .unwrap()
            .fsrs_parameters
            .get(user_id)
            .cloned())
    }

    async fn upsert_fsrs_parameters(
        &self,
        user_id: &str,
        parameters: &FsrsParameters,
    ) -> Result<()> {
        self.store
            .write()
            .unwrap()
            .fsrs_parameters
            .insert(user_id.to_string(), parameters.clone());
        Ok(())
    }

    async fn complete_session_atomic(&self, write: &CompletionWrite) -> Result<()> {
        let mut store = self.store.write().unwrap();
        let session = store
            .sessions
            .get_mut(&write.session_id)
            .ok_or_else(|| anyhow::anyhow!("unknown session {}", write.session_id))?;
        session.status = write.status;
        session.completed_at = Some(write.completed_at);
        session.duration_s = Some(write.duration_s);
        session.accuracy = write.accuracy;
        session.adaptive_decisions = write.snapshot.clone();

        let user_id = session.user_id.clone();
        for kc in &write.kc_states {
            store
                .kc_states
                .insert((user_id.clone(), kc.kc_id.clone()), kc.clone());
        }
        for row in &write.memory_rows {
            store
                .memory_rows
                .insert((user_id.clone(), row.memory_item_id.clone()), row.clone());
        }
        store.topic_proficiency.insert(
            (user_id.clone(), write.topic_proficiency.topic_id.clone()),
            write.topic_proficiency.clone(),
        );
        // Abandonment counters accrue outside the completion path; carry them
        // into the refreshed motivational row.
        let mut motivational = write.motivational.clone();
        if let Some(existing) = store.motivational.get(&user_id) {
            if motivational.abandonment_by_stage.is_empty() {
                motivational.abandonment_by_stage = existing.abandonment_by_stage.clone();
            }
        }
        store.behavioral.insert(user_id.clone(), write.behavioral.clone());
        store.cognitive.insert(user_id.clone(), write.cognitive.clone());
        store.motivational.insert(user_id, motivational);
        Ok(())
    }
}

// ============================================================================
// Auth provider
// ============================================================================

/// Token table auth for tests and embedding.
#[derive(Default)]
pub struct StaticAuthProvider {
    tokens: RwLock<HashMap<String, AuthContext>>,
}

impl StaticAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_token(&self, token: &str, user_id: &str, is_active: bool) {
        self.tokens.write().unwrap().insert(
            token.to_string(),
            AuthContext {
                user_id: user_id.to_string(),
                role: "learner".to_string(),
                is_active,
            },
        );
    }
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    async fn validate(&self, token: &str) -> Result<Option<AuthContext>> {
        Ok(self.tokens.read().unwrap().get(token).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn row(id: &str, user: &str, topic: &str, status: SessionStatus, offset_s: i64) -> SessionRow {
        SessionRow {
            id: id.to_string(),
            user_id: user.to_string(),
            topic_id: topic.to_string(),
            session_type: triloop_core::domain::SessionType::Standard,
            status,
            started_at: Utc::now() + Duration::seconds(offset_s),
            completed_at: None,
            duration_s: None,
            accuracy: None,
            new_item_count: 0,
            review_item_count: 0,
            interleaved_item_count: 0,
            adaptive_decisions: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn active_session_picks_the_most_recent_in_progress() {
        let repo = InMemoryLearnerRepository::new();
        repo.insert_session(&row("s1", "u1", "t1", SessionStatus::InProgress, 0))
            .await
            .unwrap();
        repo.insert_session(&row("s2", "u1", "t2", SessionStatus::InProgress, 10))
            .await
            .unwrap();
        repo.insert_session(&row("s3", "u1", "t3", SessionStatus::Completed, 20))
            .await
            .unwrap();

        let active = repo.get_active_session("u1").await.unwrap().unwrap();
        assert_eq!(active.id, "s2");
    }

    #[tokio::test]
    async fn return_rows_are_keyed_by_kc() {
        let repo = InMemoryLearnerRepository::new();
        let write = CompletionWrite {
            session_id: "s1".to_string(),
            status: SessionStatus::Completed,
            completed_at: Utc::now(),
            duration_s: 60,
            accuracy: Some(1.0),
            snapshot: serde_json::Value::Null,
            kc_states: vec![],
            memory_rows: vec![FsrsMemoryRow {
                user_id: "u1".to_string(),
                memory_item_id: FsrsMemoryRow::return_item_id("kc-9"),
                kc_id: Some("kc-9".to_string()),
                stage_type: LoopStage::Return,
                stability: 3.0,
                difficulty: 5.0,
                retrievability: 1.0,
                state: triloop_core::fsrs::CardState::Review,
                last_review: Some(Utc::now()),
                next_review: Some(Utc::now()),
                review_count: 1,
                lapse_count: 0,
            }],
            topic_proficiency: triloop_core::services::topic_proficiency("u1", "t1", &[], Utc::now()),
            behavioral: LearnerBehavioralState::new_for_user("u1".to_string(), Utc::now()),
            cognitive: LearnerCognitiveProfile::new_for_user("u1".to_string(), Utc::now()),
            motivational: LearnerMotivationalState::new_for_user("u1".to_string(), Utc::now()),
        };
        repo.insert_session(&row("s1", "u1", "t1", SessionStatus::InProgress, 0))
            .await
            .unwrap();
        repo.complete_session_atomic(&write).await.unwrap();

        let rows = repo
            .get_return_memory_rows("u1", &["kc-9".to_string()])
            .await
            .unwrap();
        assert!(rows.contains_key("kc-9"));
    }

    #[tokio::test]
    async fn static_auth_resolves_tokens() {
        let auth = StaticAuthProvider::new();
        auth.add_token("tok", "u1", true);
        let ctx = auth.validate("tok").await.unwrap().unwrap();
        assert_eq!(ctx.user_id, "u1");
        assert!(auth.validate("nope").await.unwrap().is_none());
    }
}
