use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ===== Learning loop =====

/// Stage of the three-part learning loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStage {
    Encounter,
    Analysis,
    Return,
}

impl LoopStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopStage::Encounter => "encounter",
            LoopStage::Analysis => "analysis",
            LoopStage::Return => "return",
        }
    }

    /// The stage that follows this one, or `None` for the final stage.
    pub fn next(&self) -> Option<LoopStage> {
        match self {
            LoopStage::Encounter => Some(LoopStage::Analysis),
            LoopStage::Analysis => Some(LoopStage::Return),
            LoopStage::Return => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "encounter" => Some(LoopStage::Encounter),
            "analysis" => Some(LoopStage::Analysis),
            "return" => Some(LoopStage::Return),
            _ => None,
        }
    }
}

impl std::fmt::Display for LoopStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Session loop type: quick (~8 min), standard (~16 min), extended (~28 min).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Quick,
    Standard,
    Extended,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Quick => "quick",
            SessionType::Standard => "standard",
            SessionType::Extended => "extended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "quick" => Some(SessionType::Quick),
            "standard" => Some(SessionType::Standard),
            "extended" => Some(SessionType::Extended),
            _ => None,
        }
    }

    /// Default number of analysis items when no explicit budget is given.
    pub fn analysis_item_budget(&self) -> usize {
        match self {
            SessionType::Quick => 8,
            SessionType::Standard => 16,
            SessionType::Extended => 28,
        }
    }

    /// Nominal wall-clock target for the whole session, in seconds.
    pub fn target_duration_s(&self) -> u32 {
        match self {
            SessionType::Quick => 480,
            SessionType::Standard => 960,
            SessionType::Extended => 1680,
        }
    }
}

impl std::fmt::Display for SessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ===== Content =====

/// A reviewable content item. Shared across learners, read-only at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub topic_id: String,
    pub stage: LoopStage,
    pub item_type: String,
    /// Difficulty level 1 (introductory) to 4 (advanced).
    pub difficulty_level: u8,
    /// Hemisphere mode tag from authoring ("lh", "rh", "integration", ...).
    pub hemisphere_mode: String,
    pub estimated_duration_s: u32,
    pub is_active: bool,
    pub is_reviewable: bool,
    pub interleave_eligible: bool,
    pub similarity_tags: Vec<String>,
    /// Primary knowledge component, when the item is KC-tagged.
    pub primary_kc_id: Option<String>,
    /// Opaque rendering payload.
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub name: String,
}

// ===== Assessment =====

/// How a response score was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
    /// Derived directly from a correct/incorrect flag.
    Auto,
    /// No score yet; awaiting out-of-band scoring.
    Pending,
    /// Scored by the external scoring collaborator (or its fallback).
    External,
}

/// One learner response. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentEvent {
    pub id: String,
    pub user_id: String,
    pub session_id: String,
    pub content_item_id: String,
    pub kc_id: Option<String>,
    pub stage: LoopStage,
    pub response_type: String,
    pub payload: serde_json::Value,
    pub is_correct: Option<bool>,
    /// Normalised score in [0, 1] when available.
    pub score: Option<f64>,
    pub scoring_method: ScoringMethod,
    pub presented_at: DateTime<Utc>,
    pub responded_at: DateTime<Utc>,
    pub latency_ms: u64,
    /// Learner-reported confidence, 1..=5.
    pub confidence_rating: Option<u8>,
    pub self_rating: Option<u8>,
    pub help_requested: Option<bool>,
    pub difficulty_level: u8,
}

// ===== Learner knowledge state =====

/// Per-(user, KC) mastery bookkeeping. Updated exactly once per affected KC
/// at session completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerKcState {
    pub user_id: String,
    pub kc_id: String,
    pub lh_accuracy: f64,
    pub lh_attempts: u32,
    pub lh_last_accuracy: f64,
    pub rh_score: f64,
    pub rh_attempts: u32,
    pub rh_last_score: f64,
    pub mastery_level: f64,
    pub integrated_score: f64,
    /// Difficulty tier 1..=4.
    pub difficulty_tier: u8,
    pub first_encountered: DateTime<Utc>,
    pub last_practiced: Option<DateTime<Utc>>,
    pub last_assessed_lh: Option<DateTime<Utc>>,
    pub last_assessed_rh: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl LearnerKcState {
    pub fn new_for_kc(user_id: String, kc_id: String, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            kc_id,
            lh_accuracy: 0.0,
            lh_attempts: 0,
            lh_last_accuracy: 0.0,
            rh_score: 0.0,
            rh_attempts: 0,
            rh_last_score: 0.0,
            mastery_level: 0.0,
            integrated_score: 0.0,
            difficulty_tier: 1,
            first_encountered: now,
            last_practiced: None,
            last_assessed_lh: None,
            last_assessed_rh: None,
            updated_at: now,
        }
    }
}

// ===== FSRS persistence =====

/// Persisted memory row for one (user, memory item). For `stage_type = return`
/// the row is concept-level: the memory item id is fixed per KC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsrsMemoryRow {
    pub user_id: String,
    pub memory_item_id: String,
    pub kc_id: Option<String>,
    pub stage_type: LoopStage,
    pub stability: f64,
    pub difficulty: f64,
    pub retrievability: f64,
    pub state: crate::fsrs::CardState,
    pub last_review: Option<DateTime<Utc>>,
    pub next_review: Option<DateTime<Utc>>,
    pub review_count: u32,
    pub lapse_count: u32,
}

impl FsrsMemoryRow {
    /// Fixed memory item id used for concept-level return scheduling, so
    /// repeated reflection prompts for the same KC share one decay curve.
    pub fn return_item_id(kc_id: &str) -> String {
        format!("return:{kc_id}")
    }

    /// View the persisted row as an in-memory card.
    pub fn to_card(&self) -> crate::fsrs::FsrsCard {
        crate::fsrs::FsrsCard {
            stability: self.stability,
            difficulty: self.difficulty,
            retrievability: self.retrievability,
            state: self.state,
            last_review: self.last_review,
            review_count: self.review_count,
            lapse_count: self.lapse_count,
        }
    }
}

/// Per-user FSRS weight override with a global default fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsrsParameters {
    pub weights: [f64; 19],
    pub target_retention: f64,
}

// ===== Sessions (persisted row) =====

/// Lifecycle status of a session row (mirrors the state-machine status).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Planning,
    Ready,
    InProgress,
    Paused,
    Completing,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Planning => "planning",
            SessionStatus::Ready => "ready",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Paused => "paused",
            SessionStatus::Completing => "completing",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted session row. The full state-machine snapshot lives in
/// `adaptive_decisions` as an opaque JSON blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: String,
    pub user_id: String,
    pub topic_id: String,
    pub session_type: SessionType,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_s: Option<u32>,
    pub accuracy: Option<f64>,
    pub new_item_count: u32,
    pub review_item_count: u32,
    pub interleaved_item_count: u32,
    pub adaptive_decisions: serde_json::Value,
}

// ===== Users =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: String,
    pub is_active: bool,
}

// ===== Four-layer learner profile =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendLabel {
    Increasing,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLabel {
    Low,
    Moderate,
    High,
}

/// Knowledge layer: per-topic rollup of KC mastery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerTopicProficiency {
    pub user_id: String,
    pub topic_id: String,
    /// Mean of per-KC mastery levels for the topic.
    pub proficiency: f64,
    /// KC count with mastery >= 0.8.
    pub kcs_mastered: u32,
    /// KC count with mastery in (0, 0.8).
    pub kcs_in_progress: u32,
    /// KC count with mastery == 0.
    pub kcs_not_started: u32,
    pub updated_at: DateTime<Utc>,
}

/// Per-stage share of active session time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StageTimeRatio {
    pub encounter: f64,
    pub analysis: f64,
    #[serde(rename = "return")]
    pub return_stage: f64,
}

impl Default for StageTimeRatio {
    fn default() -> Self {
        Self {
            encounter: 0.25,
            analysis: 0.5,
            return_stage: 0.25,
        }
    }
}

/// Behavioral layer: engagement mechanics, smoothed per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerBehavioralState {
    pub user_id: String,
    pub total_sessions: u32,
    pub sessions_last_7d: u32,
    pub sessions_last_30d: u32,
    /// EWMA of completed-session duration in milliseconds.
    pub avg_session_duration_ms: f64,
    /// EWMA of per-response latency in milliseconds.
    pub mean_latency_ms: f64,
    /// Signed delta of the latest session's mean latency against the EWMA.
    pub latency_trend_ms: f64,
    /// Session-start counts per hour of day (UTC).
    pub hour_histogram: Vec<u32>,
    pub preferred_hour: Option<u8>,
    pub help_request_rate: f64,
    pub stage_time_ratio: StageTimeRatio,
    /// Pearson correlation between confidence ratings and correctness.
    pub confidence_accuracy_corr: f64,
    /// Mean normalised confidence minus observed accuracy.
    pub calibration_gap: f64,
    pub updated_at: DateTime<Utc>,
}

impl LearnerBehavioralState {
    pub fn new_for_user(user_id: String, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            total_sessions: 0,
            sessions_last_7d: 0,
            sessions_last_30d: 0,
            avg_session_duration_ms: 0.0,
            mean_latency_ms: 0.0,
            latency_trend_ms: 0.0,
            hour_histogram: vec![0; 24],
            preferred_hour: None,
            help_request_rate: 0.0,
            stage_time_ratio: StageTimeRatio::default(),
            confidence_accuracy_corr: 0.0,
            calibration_gap: 0.0,
            updated_at: now,
        }
    }
}

/// Cognitive layer: hemisphere tilt, modality preferences, velocity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerCognitiveProfile {
    pub user_id: String,
    /// Hemisphere balance scalar in [-1, 1], EWMA-smoothed.
    pub hemisphere_balance: f64,
    /// Rolling history of raw per-session balance samples, newest last.
    pub hbs_history: Vec<f64>,
    /// Response-type preference weights, normalised to sum to 1.
    pub modality_preferences: HashMap<String, f64>,
    /// 1 - calibration gap magnitude, EWMA-smoothed.
    pub metacognitive_accuracy: f64,
    /// EWMA of per-session mean mastery delta.
    pub learning_velocity: f64,
    /// Velocity split by difficulty tier (index 0 = tier 1).
    pub velocity_by_tier: [f64; 4],
    pub strongest_item_types: Vec<String>,
    pub weakest_item_types: Vec<String>,
    pub strongest_topics: Vec<String>,
    pub weakest_topics: Vec<String>,
    /// Running accuracy per item type, backing the strongest/weakest lists.
    pub item_type_accuracy: HashMap<String, RunningAccuracy>,
    /// Running accuracy per topic.
    pub topic_accuracy: HashMap<String, RunningAccuracy>,
    pub updated_at: DateTime<Utc>,
}

/// Count-weighted accuracy accumulator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RunningAccuracy {
    pub attempts: u32,
    pub correct: u32,
}

impl RunningAccuracy {
    pub fn ratio(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.correct as f64 / self.attempts as f64
        }
    }
}

impl LearnerCognitiveProfile {
    pub fn new_for_user(user_id: String, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            hemisphere_balance: 0.0,
            hbs_history: Vec::new(),
            modality_preferences: HashMap::new(),
            metacognitive_accuracy: 0.0,
            learning_velocity: 0.0,
            velocity_by_tier: [0.0; 4],
            strongest_item_types: Vec::new(),
            weakest_item_types: Vec::new(),
            strongest_topics: Vec::new(),
            weakest_topics: Vec::new(),
            item_type_accuracy: HashMap::new(),
            topic_accuracy: HashMap::new(),
            updated_at: now,
        }
    }
}

/// One week of engagement history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeeklyEngagement {
    pub week_start: DateTime<Utc>,
    pub score: f64,
}

/// Motivational layer: engagement, risk signals, abandonment profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerMotivationalState {
    pub user_id: String,
    /// Current weekly engagement score, bounded [0, 1].
    pub engagement_score: f64,
    /// Up to eight weeks of history, newest last.
    pub engagement_history: Vec<WeeklyEngagement>,
    pub engagement_trend: TrendLabel,
    /// EWMA of attempted-difficulty tolerance in [0, 1].
    pub challenge_tolerance: f64,
    /// Abandonment counts keyed by stage name.
    pub abandonment_by_stage: HashMap<String, u32>,
    pub dropout_risk: RiskLabel,
    pub burnout_risk: RiskLabel,
    pub updated_at: DateTime<Utc>,
}

impl LearnerMotivationalState {
    pub fn new_for_user(user_id: String, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            engagement_score: 0.0,
            engagement_history: Vec::new(),
            engagement_trend: TrendLabel::Stable,
            challenge_tolerance: 0.0,
            abandonment_by_stage: HashMap::new(),
            dropout_risk: RiskLabel::Low,
            burnout_risk: RiskLabel::Low,
            updated_at: now,
        }
    }
}
