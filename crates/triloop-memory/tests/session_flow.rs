//! End-to-end session flows: orchestrator + planner + reducer + FSRS over
//! the in-memory repositories.

use std::sync::Arc;
use triloop_core::domain::{EngineError, LoopStage, ScoringMethod, SessionType};
use triloop_core::fsrs::CardState;
use triloop_core::services::{
    FallbackScorer, OrchestratorConfig, RecordResponseRequest, SessionOrchestrator,
};
use triloop_core::session::StageConfig;
use triloop_core::{CollectingSink, UserAccount};
use triloop_core::testing::fixtures;
use triloop_memory::{InMemoryContentRepository, InMemoryLearnerRepository, StaticAuthProvider};

const TOKEN: &str = "token-u1";


struct Harness {
    orchestrator: SessionOrchestrator,
    learners: Arc<InMemoryLearnerRepository>,
    analytics: Arc<CollectingSink>,
}

/// Engine wired over in-memory adapters with zero stage minimums, so tests
/// can march through stages without waiting out wall-clock guards.
fn harness() -> Harness {
    let content = Arc::new(InMemoryContentRepository::from_items(fixtures::topic_pool("topic-a", 4)));
    let learners = Arc::new(InMemoryLearnerRepository::new());
    learners.add_user(UserAccount {
        id: "u1".to_string(),
        is_active: true,
    });
    let auth = StaticAuthProvider::new();
    auth.add_token(TOKEN, "u1", true);
    let analytics = Arc::new(CollectingSink::new());

    let config = OrchestratorConfig {
        stage: StageConfig {
            min_encounter_ms: 0,
            min_analysis_ms: 0,
            min_return_ms: 0,
            ..StageConfig::default()
        },
        ..OrchestratorConfig::default()
    };
    let orchestrator = SessionOrchestrator::new(
        content,
        learners.clone(),
        Arc::new(auth),
        FallbackScorer::heuristic_only(),
        analytics.clone(),
        config,
    );
    Harness {
        orchestrator,
        learners,
        analytics,
    }
}

fn response(session_id: &str, item_id: &str, correct: bool) -> RecordResponseRequest {
    RecordResponseRequest {
        session_id: session_id.to_string(),
        item_id: item_id.to_string(),
        response_type: "mcq".to_string(),
        response_payload: serde_json::json!({"choice": 1}),
        correct: Some(correct),
        rating: None,
        latency_ms: 1_500,
        confidence_rating: Some(4),
        self_rating: None,
        help_requested: Some(false),
    }
}

/// Answer every queued item in order; returns true when the last response
/// completed the state machine.
async fn drive_to_completion(h: &Harness, session_id: &str) -> bool {
    loop {
        let active = h.orchestrator.get_active(TOKEN).await.unwrap();
        assert!(active.active, "session disappeared mid-flight");
        let index = active.current_item_index.unwrap();
        let item_id = active.items[index].id.clone();
        let view = h
            .orchestrator
            .record_response(TOKEN, response(session_id, &item_id, true))
            .await
            .unwrap();
        if view.session_complete {
            return true;
        }
    }
}

#[tokio::test]
async fn full_session_lifecycle() {
    let h = harness();

    // Start: encounter items only, quick loop shape.
    let started = h
        .orchestrator
        .start_session(TOKEN, "topic-a", SessionType::Quick)
        .await
        .unwrap();
    assert_eq!(started.stage, LoopStage::Encounter);
    assert_eq!(started.items.len(), 1);
    assert_eq!(started.items[0].id, "topic-a-enc-1");
    let session_id = started.session_id.clone();

    // The queue is 1 encounter + 4 analysis + 1 return.
    let active = h.orchestrator.get_active(TOKEN).await.unwrap();
    assert!(active.active);
    assert_eq!(active.items.len(), 6);
    assert_eq!(active.items[0].stage, LoopStage::Encounter);
    assert_eq!(active.items[5].stage, LoopStage::Return);

    // Answer everything correctly; the final response completes the loop.
    assert!(drive_to_completion(&h, &session_id).await);

    // Aggregate and persist.
    let completed = h
        .orchestrator
        .complete_session(TOKEN, &session_id)
        .await
        .unwrap();
    assert_eq!(completed.summary.total_items, 6);
    assert_eq!(completed.summary.correct, 6);
    assert_eq!(completed.summary.accuracy, Some(1.0));
    assert_eq!(completed.summary.kcs_updated, 6);
    assert_eq!(completed.summary.fsrs_rows_updated, 6);

    // Memory rows: per-item for encounter/analysis, concept-level for return.
    let ana_row = h.learners.memory_row("u1", "topic-a-ana-1").unwrap();
    assert_eq!(ana_row.review_count, 1);
    assert_eq!(ana_row.state, CardState::Review);
    assert!(ana_row.stability > 0.0);
    assert!(ana_row.next_review.is_some());

    let return_row = h
        .learners
        .memory_row("u1", "return:kc-topic-a-ret-1")
        .expect("return scheduling is keyed by KC");
    assert_eq!(return_row.stage_type, LoopStage::Return);

    // KC state reflects the perfect session.
    let kc = h.learners.kc_state("u1", "kc-topic-a-ana-1").unwrap();
    assert_eq!(kc.lh_attempts, 1);
    assert!((kc.mastery_level - 1.0).abs() < 1e-9);

    // Profile rows were refreshed.
    let behavioral = h.learners.behavioral("u1").unwrap();
    assert_eq!(behavioral.total_sessions, 1);
    let motivational = h.learners.motivational("u1").unwrap();
    assert!(motivational.engagement_score > 0.0);

    // The session row is terminal and no longer active.
    let row = h.learners.session(&session_id).unwrap();
    assert!(row.status.is_terminal());
    assert_eq!(row.accuracy, Some(1.0));
    let active = h.orchestrator.get_active(TOKEN).await.unwrap();
    assert!(!active.active);

    // Analytics captured the plan and the completion.
    assert_eq!(
        h.analytics.count_where(|e| matches!(
            e,
            triloop_core::AnalyticsEvent::AdaptiveSessionPlanned { .. }
        )),
        1
    );
    assert_eq!(
        h.analytics.count_where(|e| matches!(
            e,
            triloop_core::AnalyticsEvent::SessionCompleted { .. }
        )),
        1
    );
    assert!(
        h.analytics.count_where(|e| matches!(
            e,
            triloop_core::AnalyticsEvent::ReviewOutcome { .. }
        )) >= 6
    );
}

#[tokio::test]
async fn completion_is_idempotent_via_conflict() {
    let h = harness();
    let started = h
        .orchestrator
        .start_session(TOKEN, "topic-a", SessionType::Quick)
        .await
        .unwrap();
    drive_to_completion(&h, &started.session_id).await;
    h.orchestrator
        .complete_session(TOKEN, &started.session_id)
        .await
        .unwrap();

    let first_row = h.learners.session(&started.session_id).unwrap();
    let err = h
        .orchestrator
        .complete_session(TOKEN, &started.session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    // The persisted row is unchanged by the rejected second call.
    let second_row = h.learners.session(&started.session_id).unwrap();
    assert_eq!(first_row.completed_at, second_row.completed_at);
    assert_eq!(first_row.accuracy, second_row.accuracy);
}

#[tokio::test]
async fn out_of_order_responses_are_conflicts() {
    let h = harness();
    let started = h
        .orchestrator
        .start_session(TOKEN, "topic-a", SessionType::Quick)
        .await
        .unwrap();

    // First expected item is the encounter, not an analysis item.
    let err = h
        .orchestrator
        .record_response(TOKEN, response(&started.session_id, "topic-a-ana-1", true))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    // The queue pointer did not move.
    let active = h.orchestrator.get_active(TOKEN).await.unwrap();
    assert_eq!(active.current_item_index, Some(0));
}

#[tokio::test]
async fn second_start_conflicts_until_abandoned() {
    let h = harness();
    let started = h
        .orchestrator
        .start_session(TOKEN, "topic-a", SessionType::Standard)
        .await
        .unwrap();

    let err = h
        .orchestrator
        .start_session(TOKEN, "topic-a", SessionType::Standard)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    let abandoned = h
        .orchestrator
        .abandon_session(TOKEN, &started.session_id, "lost interest")
        .await
        .unwrap();
    assert_eq!(abandoned.abandoned_at_stage, Some(LoopStage::Encounter));

    // The abandonment is tallied per stage for the motivational profile.
    let motivational = h.learners.motivational("u1").unwrap();
    assert_eq!(motivational.abandonment_by_stage.get("encounter"), Some(&1));

    // A fresh session can start now.
    let restarted = h
        .orchestrator
        .start_session(TOKEN, "topic-a", SessionType::Standard)
        .await
        .unwrap();
    assert_ne!(restarted.session_id, started.session_id);
}

#[tokio::test]
async fn unscored_responses_stay_pending() {
    let h = harness();
    let started = h
        .orchestrator
        .start_session(TOKEN, "topic-a", SessionType::Quick)
        .await
        .unwrap();

    let mut request = response(&started.session_id, "topic-a-enc-1", true);
    request.correct = None;
    h.orchestrator
        .record_response(TOKEN, request)
        .await
        .unwrap();

    let events = h.learners.events_for(&started.session_id);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].scoring_method, ScoringMethod::Pending);
    assert!(events[0].score.is_none());
    assert!(events[0].is_correct.is_none());
}

#[tokio::test]
async fn free_text_is_scored_by_the_fallback_heuristic() {
    let h = harness();
    let started = h
        .orchestrator
        .start_session(TOKEN, "topic-a", SessionType::Quick)
        .await
        .unwrap();

    let request = RecordResponseRequest {
        session_id: started.session_id.clone(),
        item_id: "topic-a-enc-1".to_string(),
        response_type: "free_text".to_string(),
        response_payload: serde_json::json!({
            "text": "the idea keeps resurfacing right before I would forget it"
        }),
        correct: None,
        rating: None,
        latency_ms: 12_000,
        confidence_rating: None,
        self_rating: None,
        help_requested: None,
    };
    h.orchestrator
        .record_response(TOKEN, request)
        .await
        .unwrap();

    let events = h.learners.events_for(&started.session_id);
    assert_eq!(events[0].scoring_method, ScoringMethod::External);
    let score = events[0].score.unwrap();
    assert!(score > 0.0 && score <= 0.7);
}

#[tokio::test]
async fn weight_tuning_runs_from_persisted_rows() {
    let h = harness();
    let started = h
        .orchestrator
        .start_session(TOKEN, "topic-a", SessionType::Quick)
        .await
        .unwrap();
    drive_to_completion(&h, &started.session_id).await;
    h.orchestrator
        .complete_session(TOKEN, &started.session_id)
        .await
        .unwrap();

    let tuned = h.orchestrator.run_weight_tuning("u1").await.unwrap();
    assert_eq!(tuned.lapse_rate, 0.0);
    assert!((0.82..=0.95).contains(&tuned.target_retention));
    assert!(tuned.weights.iter().all(|w| w.is_finite()));
}

#[tokio::test]
async fn inactive_tokens_cannot_start_sessions() {
    let h = harness();
    let auth = StaticAuthProvider::new();
    auth.add_token("token-sleeper", "u9", false);
    // The shared harness auth does not know this token at all.
    let err = h
        .orchestrator
        .start_session("token-sleeper", "topic-a", SessionType::Quick)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}
