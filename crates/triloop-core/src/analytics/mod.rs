//! Analytics bus: typed events shaped from planner decisions and review
//! outcomes, behind a pluggable sink. The no-op sink is the safe default.

use crate::adaptive::StageBalance;
use crate::fsrs::CardState;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

/// What moved a learner between difficulty levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelChangeTrigger {
    Promotion,
    Demotion,
}

/// Typed analytics events emitted by the engine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalyticsEvent {
    AdaptiveSessionPlanned {
        user_id: String,
        session_id: String,
        level: u8,
        next_level: u8,
        counts_by_reason: HashMap<String, usize>,
        review_ratio: f64,
        interleave_ratio: f64,
        stage_balance: StageBalance,
        rationale: Vec<String>,
    },
    ItemSelected {
        session_id: String,
        item_id: String,
        reason: String,
        score: f64,
    },
    DifficultyLevelChanged {
        user_id: String,
        from: u8,
        to: u8,
        avg_retrievability: f64,
        trigger: LevelChangeTrigger,
    },
    ReviewOutcome {
        user_id: String,
        memory_item_id: String,
        rating: u8,
        pre_state: CardState,
        post_state: CardState,
        pre_retrievability: f64,
        post_retrievability: f64,
        elapsed_days: f64,
        scheduled_days: u32,
    },
    SessionCompleted {
        user_id: String,
        session_id: String,
        total_items: usize,
        correct: usize,
        accuracy: Option<f64>,
        duration_s: u32,
    },
    HemisphereScoreUpdated {
        user_id: String,
        topic_id: String,
        score: f64,
    },
}

/// Consumer of analytics events.
pub trait AnalyticsSink: Send + Sync {
    fn emit(&self, event: AnalyticsEvent);
}

/// Discards everything.
pub struct NullSink;

impl AnalyticsSink for NullSink {
    #[inline]
    fn emit(&self, _event: AnalyticsEvent) {}
}

/// Forwards events to the tracing subscriber at debug level.
pub struct TracingSink;

impl AnalyticsSink for TracingSink {
    fn emit(&self, event: AnalyticsEvent) {
        tracing::debug!(?event, "analytics_event");
    }
}

/// Stores events for test assertions.
pub struct CollectingSink {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn count_where(&self, predicate: impl Fn(&AnalyticsEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| predicate(e)).count()
    }
}

impl Default for CollectingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyticsSink for CollectingSink {
    fn emit(&self, event: AnalyticsEvent) {
        self.events.lock().unwrap().push(event);
    }
}
