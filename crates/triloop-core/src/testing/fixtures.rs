//! Reusable test fixtures: content pools, cards and events, plus default
//! mock wiring so tests only override what they care about.

use crate::domain::{AssessmentEvent, ContentItem, LoopStage, ScoringMethod};
use crate::fsrs::{CardState, FsrsCard};
use crate::ports::{MockContentRepository, MockLearnerRepository};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

// ============================================================================
// Content fixtures
// ============================================================================

/// A content item with sensible defaults; override fields as needed.
pub fn content_item(id: &str, topic_id: &str, stage: LoopStage) -> ContentItem {
    ContentItem {
        id: id.to_string(),
        topic_id: topic_id.to_string(),
        stage,
        item_type: "scenario".to_string(),
        difficulty_level: 1,
        hemisphere_mode: "integration".to_string(),
        estimated_duration_s: 60,
        is_active: true,
        is_reviewable: true,
        interleave_eligible: true,
        similarity_tags: vec!["core".to_string()],
        primary_kc_id: Some(format!("kc-{id}")),
        body: serde_json::json!({"prompt": format!("prompt for {id}")}),
    }
}

/// A small three-stage topic pool: one encounter item, `analysis_count`
/// analysis items, one return prompt.
pub fn topic_pool(topic_id: &str, analysis_count: usize) -> Vec<ContentItem> {
    let mut pool = vec![content_item(
        &format!("{topic_id}-enc-1"),
        topic_id,
        LoopStage::Encounter,
    )];
    for i in 1..=analysis_count {
        pool.push(content_item(
            &format!("{topic_id}-ana-{i}"),
            topic_id,
            LoopStage::Analysis,
        ));
    }
    pool.push(content_item(
        &format!("{topic_id}-ret-1"),
        topic_id,
        LoopStage::Return,
    ));
    pool
}

// ============================================================================
// Memory fixtures
// ============================================================================

/// A reviewed card with the given stability, last reviewed `days_ago`.
pub fn reviewed_card(stability: f64, days_ago: i64, now: DateTime<Utc>) -> FsrsCard {
    FsrsCard {
        stability,
        difficulty: 5.0,
        retrievability: 0.9,
        state: CardState::Review,
        last_review: Some(now - Duration::days(days_ago)),
        review_count: 3,
        lapse_count: 0,
    }
}

/// Memory states map for a set of item ids, all with the same card.
pub fn memory_states_for(ids: &[&str], card: FsrsCard) -> HashMap<String, FsrsCard> {
    ids.iter().map(|id| (id.to_string(), card.clone())).collect()
}

// ============================================================================
// Event fixtures
// ============================================================================

pub fn assessment_event(
    session_id: &str,
    item_id: &str,
    kc_id: Option<&str>,
    stage: LoopStage,
    is_correct: Option<bool>,
    score: Option<f64>,
) -> AssessmentEvent {
    let now = Utc::now();
    AssessmentEvent {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: "u1".to_string(),
        session_id: session_id.to_string(),
        content_item_id: item_id.to_string(),
        kc_id: kc_id.map(str::to_string),
        stage,
        response_type: "mcq".to_string(),
        payload: serde_json::Value::Null,
        is_correct,
        score,
        scoring_method: if is_correct.is_some() {
            ScoringMethod::Auto
        } else {
            ScoringMethod::Pending
        },
        presented_at: now - Duration::seconds(2),
        responded_at: now,
        latency_ms: 2_000,
        confidence_rating: None,
        self_rating: None,
        help_requested: None,
        difficulty_level: 1,
    }
}

// ============================================================================
// Mock wiring
// ============================================================================

/// Wire a content mock to serve a fixed pool: active items, id lookups,
/// topic existence, and primary KCs from the items themselves.
pub fn setup_content_mock(mock: &mut MockContentRepository, pool: Vec<ContentItem>) {
    let topics: Vec<String> = {
        let mut t: Vec<String> = pool.iter().map(|i| i.topic_id.clone()).collect();
        t.sort();
        t.dedup();
        t
    };
    let pool_for_active = pool.clone();
    mock.expect_get_active_items()
        .returning(move || Ok(pool_for_active.clone()));

    let pool_for_ids = pool.clone();
    mock.expect_get_items_by_ids().returning(move |ids| {
        Ok(pool_for_ids
            .iter()
            .filter(|i| ids.contains(&i.id))
            .cloned()
            .collect())
    });

    let topics_for_exists = topics.clone();
    mock.expect_topic_exists()
        .returning(move |id| Ok(topics_for_exists.iter().any(|t| t == id)));

    mock.expect_get_topic_name()
        .returning(|id| Ok(Some(format!("Topic {id}"))));

    let pool_for_kc = pool.clone();
    mock.expect_get_primary_kc().returning(move |item_id| {
        Ok(pool_for_kc
            .iter()
            .find(|i| i.id == item_id)
            .and_then(|i| i.primary_kc_id.clone()))
    });

    let pool_for_topic_kcs = pool;
    mock.expect_get_topic_kcs().returning(move |topic_id| {
        let mut kcs: Vec<String> = pool_for_topic_kcs
            .iter()
            .filter(|i| i.topic_id == topic_id)
            .filter_map(|i| i.primary_kc_id.clone())
            .collect();
        kcs.sort();
        kcs.dedup();
        Ok(kcs)
    });
}

/// Wire a learner mock so every read returns "nothing yet" and every write
/// succeeds. Tests override the calls they assert on.
pub fn setup_default_learner_mock(mock: &mut MockLearnerRepository) {
    mock.expect_get_user().returning(|_| Ok(None));
    mock.expect_get_session().returning(|_| Ok(None));
    mock.expect_get_active_session().returning(|_| Ok(None));
    mock.expect_get_active_session_for_topic()
        .returning(|_, _| Ok(None));
    mock.expect_insert_session().returning(|_| Ok(()));
    mock.expect_update_session_status().returning(|_, _, _| Ok(()));
    mock.expect_count_sessions_since().returning(|_, _| Ok(0));
    mock.expect_get_recent_completed_sessions()
        .returning(|_, _| Ok(vec![]));
    mock.expect_save_response_atomic().returning(|_, _, _| Ok(()));
    mock.expect_list_events_for_session().returning(|_| Ok(vec![]));
    mock.expect_get_memory_rows()
        .returning(|_, _| Ok(HashMap::new()));
    mock.expect_get_return_memory_rows()
        .returning(|_, _| Ok(HashMap::new()));
    mock.expect_get_all_memory_rows().returning(|_| Ok(vec![]));
    mock.expect_get_kc_states()
        .returning(|_, _| Ok(HashMap::new()));
    mock.expect_get_topic_proficiency().returning(|_, _| Ok(None));
    mock.expect_get_behavioral_state().returning(|_| Ok(None));
    mock.expect_get_cognitive_profile().returning(|_| Ok(None));
    mock.expect_get_motivational_state().returning(|_| Ok(None));
    mock.expect_record_abandonment().returning(|_, _| Ok(()));
    mock.expect_get_fsrs_parameters().returning(|_| Ok(None));
    mock.expect_upsert_fsrs_parameters().returning(|_, _| Ok(()));
    mock.expect_complete_session_atomic().returning(|_| Ok(()));
}
