//! Session lifecycle orchestrator.
//!
//! Composes the FSRS engine, the adaptive planner and the session reducer
//! over the repository ports. Operations are serialised per user; every
//! multi-write goes through a single atomic repository call. Guard
//! rejections from the reducer never escape: a denied advance simply leaves
//! the session in its current stage.

use crate::adaptive::{
    self, PlanRequest, SelectedItem, SelectionReason, SessionPlan, TopicCandidates,
};
use crate::analytics::{AnalyticsEvent, AnalyticsSink, LevelChangeTrigger};
use crate::domain::{
    AssessmentEvent, ContentItem, EngineError, FsrsMemoryRow, FsrsParameters, LoopStage,
    ScoringMethod, SessionRow, SessionStatus, SessionType,
};
use crate::fsrs::{self, FsrsCard, Rating, DEFAULT_TARGET_RETENTION, DEFAULT_WEIGHTS};
use crate::ports::{AuthContext, AuthProvider, CompletionWrite, ContentRepository, LearnerRepository};
use crate::services::profile::{self, ProfileConfig, SessionObservation};
use crate::services::scoring::{FallbackScorer, ScoreRequest};
use crate::services::types::{
    AbandonSessionView, ActiveSessionView, CompleteSessionView, CompletionSummary, ItemView,
    PlanSummaryView, RecordResponseRequest, RecordResponseView, StartSessionView,
};
use crate::session::{
    reduce, PlannedBalance, QueueEntry, SessionEvent, SessionState, StageConfig,
    TransitionErrorKind,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Tunables for the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub stage: StageConfig,
    pub profile: ProfileConfig,
    /// Budget for each operation's repository work; exceeding it cancels the
    /// operation.
    pub operation_timeout: Option<std::time::Duration>,
}

/// How many encounter/return items enter the queue per session type (quick
/// sessions are reduced to one of each at composition time).
fn framing_item_count(session_type: SessionType) -> usize {
    match session_type {
        SessionType::Quick => 1,
        SessionType::Standard => 2,
        SessionType::Extended => 3,
    }
}

pub struct SessionOrchestrator {
    content: Arc<dyn ContentRepository>,
    learners: Arc<dyn LearnerRepository>,
    auth: Arc<dyn AuthProvider>,
    scorer: FallbackScorer,
    analytics: Arc<dyn AnalyticsSink>,
    config: OrchestratorConfig,
    user_locks: std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionOrchestrator {
    pub fn new(
        content: Arc<dyn ContentRepository>,
        learners: Arc<dyn LearnerRepository>,
        auth: Arc<dyn AuthProvider>,
        scorer: FallbackScorer,
        analytics: Arc<dyn AnalyticsSink>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            content,
            learners,
            auth,
            scorer,
            analytics,
            config,
            user_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    // ========================================================================
    // Plumbing
    // ========================================================================

    /// Run a repository future under the configured deadline.
    async fn bound<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, EngineError> {
        match self.config.operation_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, fut).await {
                Ok(result) => result.map_err(EngineError::from),
                Err(_) => Err(EngineError::Cancelled(
                    "repository deadline exceeded".to_string(),
                )),
            },
            None => fut.await.map_err(EngineError::from),
        }
    }

    fn user_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.user_locks.lock().expect("user lock map poisoned");
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn authenticate(&self, token: &str) -> Result<AuthContext, EngineError> {
        let context = self
            .bound(self.auth.validate(token))
            .await?
            .ok_or_else(|| EngineError::Forbidden("invalid credential".to_string()))?;
        if !context.is_active {
            return Err(EngineError::Forbidden("user is inactive".to_string()));
        }
        Ok(context)
    }

    fn load_state(row: &SessionRow) -> Result<SessionState, EngineError> {
        serde_json::from_value(row.adaptive_decisions.clone())
            .map_err(|e| EngineError::Internal(anyhow::anyhow!("corrupt session snapshot: {e}")))
    }

    fn snapshot(state: &SessionState) -> Result<serde_json::Value, EngineError> {
        serde_json::to_value(state)
            .map_err(|e| EngineError::Internal(anyhow::anyhow!("unserialisable state: {e}")))
    }

    async fn owned_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<SessionRow, EngineError> {
        let session = self
            .bound(self.learners.get_session(session_id))
            .await?
            .ok_or_else(|| EngineError::not_found("session", session_id))?;
        if session.user_id != user_id {
            return Err(EngineError::Forbidden(
                "session belongs to another user".to_string(),
            ));
        }
        Ok(session)
    }

    async fn fsrs_parameters(&self, user_id: &str) -> Result<FsrsParameters, EngineError> {
        Ok(self
            .bound(self.learners.get_fsrs_parameters(user_id))
            .await?
            .unwrap_or(FsrsParameters {
                weights: DEFAULT_WEIGHTS,
                target_retention: DEFAULT_TARGET_RETENTION,
            }))
    }

    // ========================================================================
    // getActive
    // ========================================================================

    #[instrument(skip(self, token))]
    pub async fn get_active(&self, token: &str) -> Result<ActiveSessionView, EngineError> {
        let auth = self.authenticate(token).await?;
        let lock = self.user_lock(&auth.user_id);
        let _guard = lock.lock().await;

        let Some(session) = self
            .bound(self.learners.get_active_session(&auth.user_id))
            .await?
        else {
            return Ok(ActiveSessionView::none());
        };
        let state = Self::load_state(&session)?;

        let ids: Vec<String> = state.item_queue.iter().map(|e| e.item_id.clone()).collect();
        let items = self.bound(self.content.get_items_by_ids(&ids)).await?;
        let by_id: HashMap<&str, &ContentItem> =
            items.iter().map(|i| (i.id.as_str(), i)).collect();
        let ordered: Vec<ItemView> = state
            .item_queue
            .iter()
            .filter_map(|entry| by_id.get(entry.item_id.as_str()).map(|i| ItemView::from(*i)))
            .collect();

        Ok(ActiveSessionView {
            active: true,
            session_id: Some(session.id.clone()),
            topic_id: Some(session.topic_id.clone()),
            session_type: Some(session.session_type),
            stage: state.current_stage,
            current_item_index: Some(state.current_item_index),
            started_at: Some(session.started_at),
            items: ordered,
        })
    }

    // ========================================================================
    // startSession
    // ========================================================================

    #[instrument(skip(self, token), fields(topic_id, session_type = %session_type))]
    pub async fn start_session(
        &self,
        token: &str,
        topic_id: &str,
        session_type: SessionType,
    ) -> Result<StartSessionView, EngineError> {
        if topic_id.trim().is_empty() {
            return Err(EngineError::validation("topic_id", "must not be empty"));
        }
        let auth = self.authenticate(token).await?;
        let lock = self.user_lock(&auth.user_id);
        let _guard = lock.lock().await;
        let user_id = auth.user_id.as_str();
        let now = Utc::now();

        if !self.bound(self.content.topic_exists(topic_id)).await? {
            return Err(EngineError::not_found("topic", topic_id));
        }
        if let Some(existing) = self
            .bound(self.learners.get_active_session_for_topic(user_id, topic_id))
            .await?
        {
            return Err(EngineError::Conflict(format!(
                "active session {} already exists for this topic",
                existing.id
            )));
        }

        // 1-2. Content pool, partitioned into per-stage primary pools plus the
        // analysis candidate set (primary and interleave-eligible siblings).
        let pool = self.bound(self.content.get_active_items()).await?;
        let mut encounter_items = Vec::new();
        let mut return_items = Vec::new();
        let mut analysis_by_topic: HashMap<String, Vec<ContentItem>> = HashMap::new();
        for item in &pool {
            match item.stage {
                LoopStage::Encounter if item.topic_id == topic_id => {
                    encounter_items.push(item.clone())
                }
                LoopStage::Return if item.topic_id == topic_id => return_items.push(item.clone()),
                LoopStage::Analysis => {
                    if item.topic_id == topic_id || item.interleave_eligible {
                        analysis_by_topic
                            .entry(item.topic_id.clone())
                            .or_default()
                            .push(item.clone());
                    }
                }
                _ => {}
            }
        }

        // 3. Learner KC state for the primary topic: hemisphere balance and
        // difficulty level.
        let kc_ids = self.bound(self.content.get_topic_kcs(topic_id)).await?;
        let kc_states = self
            .bound(self.learners.get_kc_states(user_id, &kc_ids))
            .await?;
        let hemisphere_balance = if kc_states.is_empty() {
            0.0
        } else {
            kc_states
                .values()
                .map(|kc| kc.rh_score - kc.lh_accuracy)
                .sum::<f64>()
                / kc_states.len() as f64
        };
        let level = if kc_states.is_empty() {
            1
        } else {
            let mean_tier = kc_states
                .values()
                .map(|kc| kc.difficulty_tier as f64)
                .sum::<f64>()
                / kc_states.len() as f64;
            (mean_tier.round() as u8).clamp(1, 4)
        };

        let analysis_ids: Vec<String> = analysis_by_topic
            .values()
            .flatten()
            .map(|i| i.id.clone())
            .collect();
        let memory_rows = self
            .bound(self.learners.get_memory_rows(user_id, &analysis_ids))
            .await?;
        let memory_states: HashMap<String, FsrsCard> = memory_rows
            .iter()
            .map(|(id, row)| (id.clone(), row.to_card()))
            .collect();

        // 4. Plan, falling back to the raw primary pool when empty.
        let mut topics: Vec<TopicCandidates> = analysis_by_topic
            .into_iter()
            .map(|(topic_id, analysis_items)| TopicCandidates {
                topic_id,
                analysis_items,
            })
            .collect();
        topics.sort_by(|a, b| a.topic_id.cmp(&b.topic_id));

        let request = PlanRequest {
            primary_topic_id: topic_id.to_string(),
            topics,
            memory_states,
            current_level: level,
            session_type,
            hemisphere_balance,
            analysis_item_budget: None,
            now,
        };
        let mut plan = adaptive::plan(&request);
        if plan.selected.is_empty() {
            plan.selected = self.fallback_selection(&request);
            if !plan.selected.is_empty() {
                plan.rationale.push("fallback: primary pool slice".to_string());
            }
        }

        // 5. Full queue and planned balance.
        let frame = framing_item_count(session_type);
        encounter_items.retain(|i| i.difficulty_level <= level);
        return_items.retain(|i| i.difficulty_level <= level);
        encounter_items.truncate(frame);
        return_items.truncate(frame);
        let queue_items = adaptive::compose_queue(
            &encounter_items,
            &plan.selected,
            &return_items,
            session_type,
        );
        if queue_items.is_empty() {
            return Err(EngineError::Conflict(
                "no plannable content for this topic".to_string(),
            ));
        }
        let queue: Vec<QueueEntry> = queue_items
            .iter()
            .map(|i| QueueEntry {
                item_id: i.id.clone(),
                stage: i.stage,
            })
            .collect();
        let planned_balance = PlannedBalance {
            new: plan.selected.iter().filter(|s| s.is_new).count() as u32,
            review: plan
                .selected
                .iter()
                .filter(|s| {
                    matches!(s.reason, SelectionReason::Overdue | SelectionReason::Due)
                })
                .count() as u32,
            interleaved: plan
                .selected
                .iter()
                .filter(|s| s.reason == SelectionReason::InterleavedRelated)
                .count() as u32,
        };

        // 6. Persist the session with its started state snapshot.
        let session_id = Uuid::new_v4().to_string();
        let ready = SessionState::new_ready(
            session_id.clone(),
            user_id.to_string(),
            topic_id.to_string(),
            session_type,
            queue,
            planned_balance,
        );
        let state = reduce(&ready, &SessionEvent::StartSession, now, &self.config.stage)
            .map_err(|e| EngineError::Internal(anyhow::anyhow!("start rejected: {e}")))?;

        let row = SessionRow {
            id: session_id.clone(),
            user_id: user_id.to_string(),
            topic_id: topic_id.to_string(),
            session_type,
            status: SessionStatus::InProgress,
            started_at: now,
            completed_at: None,
            duration_s: None,
            accuracy: None,
            new_item_count: planned_balance.new,
            review_item_count: planned_balance.review,
            interleaved_item_count: planned_balance.interleaved,
            adaptive_decisions: Self::snapshot(&state)?,
        };
        self.bound(self.learners.insert_session(&row)).await?;

        self.emit_plan_events(user_id, &session_id, topic_id, &plan, &request);
        debug!(session_id, queue_len = state.item_queue.len(), "session started");

        // 7. Encounter items only.
        let encounter_views: Vec<ItemView> = queue_items
            .iter()
            .filter(|i| i.stage == LoopStage::Encounter)
            .map(ItemView::from)
            .collect();
        Ok(StartSessionView {
            session_id,
            stage: LoopStage::Encounter,
            session_type,
            stage_balance: plan.stage_balance,
            adaptive: Some(PlanSummaryView {
                level: plan.level,
                next_level: plan.next_level,
                rationale: plan.rationale.clone(),
            }),
            target_duration_s: session_type.target_duration_s(),
            items: encounter_views,
        })
    }

    /// Fallback when the planner returns nothing: the primary analysis pool
    /// sliced to the budget.
    fn fallback_selection(&self, request: &PlanRequest) -> Vec<SelectedItem> {
        let budget = request.effective_budget();
        request
            .topics
            .iter()
            .filter(|t| t.topic_id == request.primary_topic_id)
            .flat_map(|t| t.analysis_items.iter())
            .take(budget)
            .map(|item| {
                let card = request.memory_states.get(&item.id);
                SelectedItem {
                    item: item.clone(),
                    score: 0.0,
                    reason: SelectionReason::Fill,
                    retrievability: card
                        .map(|c| fsrs::current_retrievability(c, request.now))
                        .unwrap_or(1.0),
                    is_new: card.is_none_or(|c| c.is_new()),
                }
            })
            .collect()
    }

    fn emit_plan_events(
        &self,
        user_id: &str,
        session_id: &str,
        topic_id: &str,
        plan: &SessionPlan,
        request: &PlanRequest,
    ) {
        let counts: HashMap<String, usize> = plan
            .counts_by_reason()
            .into_iter()
            .map(|(reason, count)| (reason.as_str().to_string(), count))
            .collect();
        self.analytics.emit(AnalyticsEvent::AdaptiveSessionPlanned {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            level: plan.level,
            next_level: plan.next_level,
            counts_by_reason: counts,
            review_ratio: adaptive::review_ratio(plan.level),
            interleave_ratio: adaptive::interleave_ratio(plan.level, request.session_type),
            stage_balance: plan.stage_balance,
            rationale: plan.rationale.clone(),
        });
        for selected in &plan.selected {
            self.analytics.emit(AnalyticsEvent::ItemSelected {
                session_id: session_id.to_string(),
                item_id: selected.item.id.clone(),
                reason: selected.reason.as_str().to_string(),
                score: selected.score,
            });
        }
        self.analytics.emit(AnalyticsEvent::HemisphereScoreUpdated {
            user_id: user_id.to_string(),
            topic_id: topic_id.to_string(),
            score: request.hemisphere_balance,
        });
        if plan.next_level != plan.level {
            let reviewed: Vec<f64> = request
                .memory_states
                .values()
                .filter(|c| !c.is_new())
                .map(|c| fsrs::current_retrievability(c, request.now))
                .collect();
            let avg_retrievability = if reviewed.is_empty() {
                0.0
            } else {
                reviewed.iter().sum::<f64>() / reviewed.len() as f64
            };
            self.analytics.emit(AnalyticsEvent::DifficultyLevelChanged {
                user_id: user_id.to_string(),
                from: plan.level,
                to: plan.next_level,
                avg_retrievability,
                trigger: if plan.next_level > plan.level {
                    LevelChangeTrigger::Promotion
                } else {
                    LevelChangeTrigger::Demotion
                },
            });
        }
    }

    // ========================================================================
    // recordResponse
    // ========================================================================

    #[instrument(skip(self, token, request), fields(session_id = %request.session_id))]
    pub async fn record_response(
        &self,
        token: &str,
        request: RecordResponseRequest,
    ) -> Result<RecordResponseView, EngineError> {
        if request.item_id.trim().is_empty() {
            return Err(EngineError::validation("item_id", "must not be empty"));
        }
        let auth = self.authenticate(token).await?;
        let lock = self.user_lock(&auth.user_id);
        let _guard = lock.lock().await;
        let user_id = auth.user_id.as_str();
        let now = Utc::now();

        let session = self.owned_session(user_id, &request.session_id).await?;
        if session.status != SessionStatus::InProgress {
            return Err(EngineError::Conflict(format!(
                "session is {}",
                session.status
            )));
        }
        let state = Self::load_state(&session)?;

        let Some(expected) = state.expected_entry() else {
            return Err(EngineError::Conflict("item queue is exhausted".to_string()));
        };
        if expected.item_id != request.item_id {
            return Err(EngineError::Conflict(format!(
                "expected item {}, got {}",
                expected.item_id, request.item_id
            )));
        }
        let Some(stage) = state.current_stage else {
            return Err(EngineError::Conflict("session has no active stage".to_string()));
        };

        let ids = vec![request.item_id.clone()];
        let item = self
            .bound(self.content.get_items_by_ids(&ids))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::not_found("content item", &request.item_id))?;

        // Derive the score. Explicit correctness wins; free text goes to the
        // scoring collaborator (which never fails); anything else is pending.
        let (score, is_correct, scoring_method) = match request.correct {
            Some(correct) => (
                Some(if correct { 1.0 } else { 0.0 }),
                Some(correct),
                ScoringMethod::Auto,
            ),
            None if request.response_type == "free_text" => {
                let user_response = request
                    .response_payload
                    .get("text")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let scored = self
                    .scorer
                    .score(&ScoreRequest {
                        concept: item
                            .primary_kc_id
                            .clone()
                            .unwrap_or_else(|| item.item_type.clone()),
                        scenario: item.body.to_string(),
                        user_response,
                    })
                    .await;
                (Some(scored.score), None, ScoringMethod::External)
            }
            None => (None, None, ScoringMethod::Pending),
        };

        let event = AssessmentEvent {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            session_id: session.id.clone(),
            content_item_id: item.id.clone(),
            kc_id: item.primary_kc_id.clone(),
            stage,
            response_type: request.response_type.clone(),
            payload: request.response_payload.clone(),
            is_correct,
            score,
            scoring_method,
            presented_at: now - Duration::milliseconds(request.latency_ms as i64),
            responded_at: now,
            latency_ms: request.latency_ms,
            confidence_rating: request.confidence_rating,
            // Explicit self-assessment wins over the legacy rating field.
            self_rating: request.self_rating.or(request.rating),
            help_requested: request.help_requested,
            difficulty_level: item.difficulty_level,
        };

        // Advance the state machine: complete the activity, then attempt the
        // stage boundary. A denied guard leaves the stage as-is; the next
        // response retries the boundary.
        let completed_index = state.current_item_index;
        let mut next_state = reduce(
            &state,
            &SessionEvent::CompleteActivity {
                activity_id: request.item_id.clone(),
            },
            now,
            &self.config.stage,
        )
        .map_err(|e| EngineError::Internal(anyhow::anyhow!("activity rejected: {e}")))?;

        if next_state.is_stage_boundary(completed_index) {
            let boundary_event = if stage == LoopStage::Return {
                SessionEvent::CompleteSession
            } else {
                SessionEvent::AdvanceStage
            };
            match reduce(&next_state, &boundary_event, now, &self.config.stage) {
                Ok(advanced) => next_state = advanced,
                Err(e) if e.kind == TransitionErrorKind::GuardFailed => {
                    debug!(reason = %e.reason, "stage boundary held back by guard");
                }
                Err(e) => {
                    warn!(error = %e, "unexpected transition failure at stage boundary");
                }
            }
        }

        let snapshot = Self::snapshot(&next_state)?;
        self.bound(
            self.learners
                .save_response_atomic(&event, &session.id, &snapshot),
        )
        .await?;

        let session_complete = next_state.status == SessionStatus::Completed;
        let next_item = match next_state.expected_entry() {
            Some(entry) if !session_complete => {
                let ids = vec![entry.item_id.clone()];
                self.bound(self.content.get_items_by_ids(&ids))
                    .await?
                    .first()
                    .map(ItemView::from)
            }
            _ => None,
        };

        Ok(RecordResponseView {
            next_item,
            stage: next_state.current_stage.unwrap_or(stage),
            session_complete,
        })
    }

    // ========================================================================
    // completeSession
    // ========================================================================

    #[instrument(skip(self, token))]
    pub async fn complete_session(
        &self,
        token: &str,
        session_id: &str,
    ) -> Result<CompleteSessionView, EngineError> {
        let auth = self.authenticate(token).await?;
        let lock = self.user_lock(&auth.user_id);
        let _guard = lock.lock().await;
        let user_id = auth.user_id.as_str();
        let now = Utc::now();

        let session = self.owned_session(user_id, session_id).await?;
        if session.status != SessionStatus::InProgress {
            return Err(EngineError::Conflict(format!(
                "session is {}",
                session.status
            )));
        }
        let mut state = Self::load_state(&session)?;

        // 1-2. Events and overall accuracy.
        let events = self
            .bound(self.learners.list_events_for_session(session_id))
            .await?;
        let total_items = events.len();
        let correct = events
            .iter()
            .filter(|e| e.is_correct == Some(true))
            .count();
        let accuracy = if total_items == 0 {
            None
        } else {
            Some(correct as f64 / total_items as f64)
        };

        // 3-4. Per-KC aggregation and state updates.
        let kc_aggregates = aggregate_per_kc(&events);
        let kc_ids: Vec<String> = kc_aggregates.keys().cloned().collect();
        let existing_kc = self
            .bound(self.learners.get_kc_states(user_id, &kc_ids))
            .await?;
        let mut kc_states = Vec::with_capacity(kc_aggregates.len());
        let mut mastery_deltas = Vec::with_capacity(kc_aggregates.len());
        for (kc_id, agg) in &kc_aggregates {
            let previous = existing_kc.get(kc_id);
            let old_mastery = previous.map(|kc| kc.mastery_level).unwrap_or(0.0);
            let updated = apply_kc_update(previous, user_id, kc_id, agg, now);
            mastery_deltas.push((updated.difficulty_tier, updated.mastery_level - old_mastery));
            kc_states.push(updated);
        }

        // 5. FSRS rescheduling, concept-level for the return stage.
        let parameters = self.fsrs_parameters(user_id).await?;
        let targets = reschedule_targets(&events);
        let item_ids: Vec<String> = targets
            .iter()
            .filter(|t| t.stage_type != LoopStage::Return)
            .map(|t| t.memory_item_id.clone())
            .collect();
        let return_kcs: Vec<String> = targets
            .iter()
            .filter(|t| t.stage_type == LoopStage::Return)
            .filter_map(|t| t.kc_id.clone())
            .collect();
        let mut existing_rows = self
            .bound(self.learners.get_memory_rows(user_id, &item_ids))
            .await?;
        let return_rows = self
            .bound(self.learners.get_return_memory_rows(user_id, &return_kcs))
            .await?;
        for (kc_id, row) in return_rows {
            existing_rows.insert(FsrsMemoryRow::return_item_id(&kc_id), row);
        }

        let mut memory_rows = Vec::with_capacity(targets.len());
        for target in &targets {
            let card = existing_rows
                .get(&target.memory_item_id)
                .map(|row| row.to_card())
                .unwrap_or_default();
            let rating = Rating::from_score(target.mean_score);
            let pre_retrievability = fsrs::current_retrievability(&card, now);
            let elapsed_days = card
                .last_review
                .map(|lr| (now - lr).num_milliseconds() as f64 / 86_400_000.0)
                .unwrap_or(0.0);
            let sched = fsrs::schedule(
                &card,
                rating,
                now,
                &parameters.weights,
                parameters.target_retention,
            );
            let applied = fsrs::apply(&card, &sched, rating, now);
            self.analytics.emit(AnalyticsEvent::ReviewOutcome {
                user_id: user_id.to_string(),
                memory_item_id: target.memory_item_id.clone(),
                rating: rating.as_u8(),
                pre_state: card.state,
                post_state: applied.state,
                pre_retrievability,
                post_retrievability: applied.retrievability,
                elapsed_days,
                scheduled_days: sched.interval_days,
            });
            memory_rows.push(FsrsMemoryRow {
                user_id: user_id.to_string(),
                memory_item_id: target.memory_item_id.clone(),
                kc_id: target.kc_id.clone(),
                stage_type: target.stage_type,
                stability: applied.stability,
                difficulty: applied.difficulty,
                retrievability: applied.retrievability,
                state: applied.state,
                last_review: Some(now),
                next_review: Some(sched.next_due),
                review_count: applied.review_count,
                lapse_count: applied.lapse_count,
            });
        }

        // 6. Terminal session fields.
        let duration_s =
            (((now - session.started_at).num_milliseconds() as f64) / 1000.0).round() as u32;
        if state.status != SessionStatus::Completed {
            state.status = SessionStatus::Completed;
            state.completed_at = Some(now);
        }

        // 7. Four-layer profile refresh.
        let observation = self
            .build_observation(&session, &state, &events, &kc_states, &mastery_deltas, accuracy)
            .await?;
        let sessions_last_7d = self
            .bound(
                self.learners
                    .count_sessions_since(user_id, now - Duration::days(7)),
            )
            .await?;
        let sessions_last_30d = self
            .bound(
                self.learners
                    .count_sessions_since(user_id, now - Duration::days(30)),
            )
            .await?;

        let prev_behavioral = self
            .bound(self.learners.get_behavioral_state(user_id))
            .await?;
        let prev_cognitive = self
            .bound(self.learners.get_cognitive_profile(user_id))
            .await?;
        let prev_motivational = self
            .bound(self.learners.get_motivational_state(user_id))
            .await?;
        let baseline_accuracy = prev_cognitive.as_ref().and_then(|profile| {
            let (attempts, correct) = profile.item_type_accuracy.values().fold(
                (0u32, 0u32),
                |(a, c), acc| (a + acc.attempts, c + acc.correct),
            );
            (attempts > 0).then(|| correct as f64 / attempts as f64)
        });

        let behavioral = profile::update_behavioral(
            prev_behavioral,
            user_id,
            &observation,
            sessions_last_7d,
            sessions_last_30d,
            &self.config.profile,
            now,
        );
        let cognitive = profile::update_cognitive(
            prev_cognitive,
            user_id,
            &observation,
            &self.config.profile,
            now,
        );
        let motivational = profile::update_motivational(
            prev_motivational,
            user_id,
            &observation,
            sessions_last_7d,
            sessions_last_30d,
            baseline_accuracy,
            behavioral.latency_trend_ms,
            &self.config.profile,
            now,
        );

        // Topic proficiency over every KC of the topic, updates included.
        let topic_kc_ids = self
            .bound(self.content.get_topic_kcs(&session.topic_id))
            .await?;
        let mut topic_kc_states = self
            .bound(self.learners.get_kc_states(user_id, &topic_kc_ids))
            .await?;
        for kc in &kc_states {
            topic_kc_states.insert(kc.kc_id.clone(), kc.clone());
        }
        let states_vec: Vec<_> = topic_kc_states.into_values().collect();
        let topic_proficiency =
            profile::topic_proficiency(user_id, &session.topic_id, &states_vec, now);

        let kcs_updated = kc_states.len();
        let fsrs_rows_updated = memory_rows.len();
        let write = CompletionWrite {
            session_id: session_id.to_string(),
            status: SessionStatus::Completed,
            completed_at: now,
            duration_s,
            accuracy,
            snapshot: Self::snapshot(&state)?,
            kc_states,
            memory_rows,
            topic_proficiency,
            behavioral,
            cognitive,
            motivational,
        };
        self.bound(self.learners.complete_session_atomic(&write))
            .await?;

        self.analytics.emit(AnalyticsEvent::SessionCompleted {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            total_items,
            correct,
            accuracy,
            duration_s,
        });
        debug!(session_id, total_items, kcs_updated, fsrs_rows_updated, "session completed");

        Ok(CompleteSessionView {
            summary: CompletionSummary {
                total_items,
                correct,
                accuracy,
                kcs_updated,
                fsrs_rows_updated,
            },
        })
    }

    async fn build_observation(
        &self,
        session: &SessionRow,
        state: &SessionState,
        events: &[AssessmentEvent],
        kc_states: &[crate::domain::LearnerKcState],
        mastery_deltas: &[(u8, f64)],
        accuracy: Option<f64>,
    ) -> Result<SessionObservation, EngineError> {
        let mut item_ids: Vec<String> = events.iter().map(|e| e.content_item_id.clone()).collect();
        item_ids.sort();
        item_ids.dedup();
        let items = self.bound(self.content.get_items_by_ids(&item_ids)).await?;
        let items_by_id: HashMap<&str, &ContentItem> =
            items.iter().map(|i| (i.id.as_str(), i)).collect();

        let responses = events.len();
        let mean_latency_ms = if responses == 0 {
            0.0
        } else {
            events.iter().map(|e| e.latency_ms as f64).sum::<f64>() / responses as f64
        };
        let help_requests = events
            .iter()
            .filter(|e| e.help_requested == Some(true))
            .count();
        let confidence_pairs: Vec<(f64, bool)> = events
            .iter()
            .filter_map(|e| match (e.confidence_rating, e.is_correct) {
                (Some(confidence), Some(correct)) => {
                    Some(((confidence as f64 / 5.0).min(1.0), correct))
                }
                _ => None,
            })
            .collect();
        let mut response_type_counts: HashMap<String, u32> = HashMap::new();
        for event in events {
            *response_type_counts
                .entry(event.response_type.clone())
                .or_insert(0) += 1;
        }
        let attempted_difficulty_mean = if responses == 0 {
            0.0
        } else {
            events.iter().map(|e| e.difficulty_level as f64).sum::<f64>() / responses as f64
        };
        let mut item_type_results = Vec::new();
        let mut topic_results = Vec::new();
        for event in events {
            if let Some(correct) = event.is_correct {
                if let Some(item) = items_by_id.get(event.content_item_id.as_str()) {
                    item_type_results.push((item.item_type.clone(), correct));
                    topic_results.push((item.topic_id.clone(), correct));
                }
            }
        }
        let hemisphere_balance_sample = if kc_states.is_empty() {
            0.0
        } else {
            kc_states
                .iter()
                .map(|kc| kc.rh_score - kc.lh_accuracy)
                .sum::<f64>()
                / kc_states.len() as f64
        };

        Ok(SessionObservation {
            topic_id: session.topic_id.clone(),
            started_at: Some(session.started_at),
            duration_ms: (Utc::now() - session.started_at).num_milliseconds().max(0) as u64,
            total_items: responses,
            correct: events.iter().filter(|e| e.is_correct == Some(true)).count(),
            accuracy,
            mean_latency_ms,
            help_requests,
            responses,
            confidence_pairs,
            response_type_counts,
            stage_durations_ms: (
                state.encounter_duration_ms,
                state.analysis_duration_ms,
                state.return_duration_ms,
            ),
            mastery_deltas: mastery_deltas.to_vec(),
            attempted_difficulty_mean,
            item_type_results,
            topic_results,
            hemisphere_balance_sample,
        })
    }

    // ========================================================================
    // abandonSession
    // ========================================================================

    #[instrument(skip(self, token))]
    pub async fn abandon_session(
        &self,
        token: &str,
        session_id: &str,
        reason: &str,
    ) -> Result<AbandonSessionView, EngineError> {
        let auth = self.authenticate(token).await?;
        let lock = self.user_lock(&auth.user_id);
        let _guard = lock.lock().await;

        let session = self.owned_session(&auth.user_id, session_id).await?;
        if session.status != SessionStatus::InProgress {
            return Err(EngineError::Conflict(format!(
                "session is {}",
                session.status
            )));
        }
        let state = Self::load_state(&session)?;
        let now = Utc::now();
        let abandoned = reduce(
            &state,
            &SessionEvent::AbandonSession {
                reason: reason.to_string(),
            },
            now,
            &self.config.stage,
        )
        .map_err(|e| EngineError::Conflict(e.to_string()))?;

        let snapshot = Self::snapshot(&abandoned)?;
        self.bound(self.learners.update_session_status(
            session_id,
            SessionStatus::Abandoned,
            &snapshot,
        ))
        .await?;
        if let Some(stage) = abandoned.abandoned_at_stage {
            self.bound(self.learners.record_abandonment(&auth.user_id, stage.as_str()))
                .await?;
        }

        Ok(AbandonSessionView {
            session_id: session_id.to_string(),
            abandoned_at_stage: abandoned.abandoned_at_stage,
        })
    }

    // ========================================================================
    // Weekly weight tuning
    // ========================================================================

    /// Batch entry point: aggregate a learner's memory rows and persist tuned
    /// FSRS parameters. Returns the tuning result for reporting.
    #[instrument(skip(self))]
    pub async fn run_weight_tuning(
        &self,
        user_id: &str,
    ) -> Result<fsrs::TunedParameters, EngineError> {
        let user = self
            .bound(self.learners.get_user(user_id))
            .await?
            .ok_or_else(|| EngineError::not_found("user", user_id))?;
        if !user.is_active {
            return Err(EngineError::Forbidden("user is inactive".to_string()));
        }
        let rows = self
            .bound(self.learners.get_all_memory_rows(user_id))
            .await?;
        let stats = if rows.is_empty() {
            fsrs::LearnerReviewStats::default()
        } else {
            let n = rows.len() as f64;
            fsrs::LearnerReviewStats {
                total_reviews: rows.iter().map(|r| r.review_count as u64).sum(),
                total_lapses: rows.iter().map(|r| r.lapse_count as u64).sum(),
                avg_retrievability: rows.iter().map(|r| r.retrievability).sum::<f64>() / n,
                avg_stability: rows.iter().map(|r| r.stability).sum::<f64>() / n,
                avg_difficulty: rows.iter().map(|r| r.difficulty).sum::<f64>() / n,
            }
        };
        let base = self.fsrs_parameters(user_id).await?;
        let tuned = fsrs::optimize_weights(&base.weights, &stats);
        self.bound(
            self.learners
                .upsert_fsrs_parameters(user_id, &FsrsParameters::from(&tuned)),
        )
        .await?;
        Ok(tuned)
    }
}

// ============================================================================
// Completion helpers (pure)
// ============================================================================

/// Per-KC aggregate of one session's events.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KcAggregate {
    pub attempts: u32,
    pub correct: u32,
    pub score_sum: f64,
    pub scored_count: u32,
}

pub(crate) fn aggregate_per_kc(events: &[AssessmentEvent]) -> HashMap<String, KcAggregate> {
    let mut aggregates: HashMap<String, KcAggregate> = HashMap::new();
    for event in events {
        let Some(kc_id) = &event.kc_id else { continue };
        let agg = aggregates.entry(kc_id.clone()).or_default();
        agg.attempts += 1;
        if event.is_correct == Some(true) {
            agg.correct += 1;
        }
        if let Some(score) = event.score {
            agg.score_sum += score;
            agg.scored_count += 1;
        }
    }
    aggregates
}

/// Weighted-mean update of one KC state from a session aggregate.
pub(crate) fn apply_kc_update(
    previous: Option<&crate::domain::LearnerKcState>,
    user_id: &str,
    kc_id: &str,
    agg: &KcAggregate,
    now: DateTime<Utc>,
) -> crate::domain::LearnerKcState {
    let existing = previous.is_some();
    let mut kc = previous.cloned().unwrap_or_else(|| {
        crate::domain::LearnerKcState::new_for_kc(user_id.to_string(), kc_id.to_string(), now)
    });

    let attempts = agg.attempts.max(1);
    let session_accuracy = agg.correct as f64 / attempts as f64;
    let session_avg_score = if agg.scored_count > 0 {
        agg.score_sum / agg.scored_count as f64
    } else {
        session_accuracy
    };
    let session_performance = ((session_accuracy + session_avg_score) / 2.0).clamp(0.0, 1.0);

    let lh_total = kc.lh_attempts + agg.attempts;
    kc.lh_accuracy = (kc.lh_accuracy * kc.lh_attempts as f64 + agg.correct as f64)
        / lh_total.max(1) as f64;
    let rh_total = kc.rh_attempts + agg.attempts;
    kc.rh_score =
        (kc.rh_score * kc.rh_attempts as f64 + agg.score_sum) / rh_total.max(1) as f64;
    kc.lh_attempts = lh_total;
    kc.rh_attempts = rh_total;
    kc.lh_last_accuracy = session_accuracy;
    kc.rh_last_score = session_avg_score;
    kc.integrated_score = ((kc.lh_accuracy + kc.rh_score) / 2.0).clamp(0.0, 1.0);
    kc.mastery_level = if existing {
        (0.8 * kc.mastery_level + 0.2 * session_performance).clamp(0.0, 1.0)
    } else {
        session_performance.clamp(0.0, 1.0)
    };

    if session_performance >= 0.85 && kc.lh_attempts >= 8 {
        kc.difficulty_tier = (kc.difficulty_tier + 1).min(4);
    } else if session_performance < 0.4 && agg.attempts >= 3 {
        kc.difficulty_tier = kc.difficulty_tier.saturating_sub(1).max(1);
    }

    kc.last_practiced = Some(now);
    kc.last_assessed_lh = Some(now);
    kc.last_assessed_rh = Some(now);
    kc.updated_at = now;
    kc
}

/// One memory row to reschedule at completion.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RescheduleTarget {
    pub memory_item_id: String,
    pub kc_id: Option<String>,
    pub stage_type: LoopStage,
    pub mean_score: Option<f64>,
}

/// Distinct (item, KC) reschedule targets. Return-stage events collapse to
/// one concept-level target per KC; events without a KC are skipped.
pub(crate) fn reschedule_targets(events: &[AssessmentEvent]) -> Vec<RescheduleTarget> {
    struct Acc {
        kc_id: Option<String>,
        stage_type: LoopStage,
        score_sum: f64,
        scored_count: u32,
    }
    let mut by_key: Vec<(String, Acc)> = Vec::new();
    for event in events {
        let Some(kc_id) = &event.kc_id else { continue };
        let memory_item_id = if event.stage == LoopStage::Return {
            FsrsMemoryRow::return_item_id(kc_id)
        } else {
            event.content_item_id.clone()
        };
        let index = match by_key.iter().position(|(key, _)| *key == memory_item_id) {
            Some(index) => index,
            None => {
                by_key.push((
                    memory_item_id,
                    Acc {
                        kc_id: Some(kc_id.clone()),
                        stage_type: event.stage,
                        score_sum: 0.0,
                        scored_count: 0,
                    },
                ));
                by_key.len() - 1
            }
        };
        let acc = &mut by_key[index].1;
        if let Some(score) = event.score {
            acc.score_sum += score;
            acc.scored_count += 1;
        }
    }
    by_key
        .into_iter()
        .map(|(memory_item_id, acc)| RescheduleTarget {
            memory_item_id,
            kc_id: acc.kc_id,
            stage_type: acc.stage_type,
            mean_score: (acc.scored_count > 0).then(|| acc.score_sum / acc.scored_count as f64),
        })
        .collect()
}
