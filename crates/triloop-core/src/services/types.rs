//! Request and response shapes of the orchestrator operations. These are the
//! JSON bodies the HTTP surface serialises directly.

use crate::adaptive::StageBalance;
use crate::domain::{ContentItem, LoopStage, SessionType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client-facing slice of a content item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub id: String,
    pub topic_id: String,
    pub stage: LoopStage,
    pub item_type: String,
    pub difficulty_level: u8,
    pub estimated_duration_s: u32,
    pub body: serde_json::Value,
}

impl From<&ContentItem> for ItemView {
    fn from(item: &ContentItem) -> Self {
        Self {
            id: item.id.clone(),
            topic_id: item.topic_id.clone(),
            stage: item.stage,
            item_type: item.item_type.clone(),
            difficulty_level: item.difficulty_level,
            estimated_duration_s: item.estimated_duration_s,
            body: item.body.clone(),
        }
    }
}

/// `getActive` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSessionView {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_type: Option<SessionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<LoopStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_item_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ItemView>,
}

impl ActiveSessionView {
    pub fn none() -> Self {
        Self {
            active: false,
            session_id: None,
            topic_id: None,
            session_type: None,
            stage: None,
            current_item_index: None,
            started_at: None,
            items: Vec::new(),
        }
    }
}

/// Planner summary included in the `startSession` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummaryView {
    pub level: u8,
    pub next_level: u8,
    pub rationale: Vec<String>,
}

/// `startSession` response: encounter items only, for immediate rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionView {
    pub session_id: String,
    pub stage: LoopStage,
    pub session_type: SessionType,
    pub stage_balance: StageBalance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adaptive: Option<PlanSummaryView>,
    pub target_duration_s: u32,
    pub items: Vec<ItemView>,
}

/// `recordResponse` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResponseRequest {
    pub session_id: String,
    pub item_id: String,
    pub response_type: String,
    pub response_payload: serde_json::Value,
    #[serde(default)]
    pub correct: Option<bool>,
    #[serde(default)]
    pub rating: Option<u8>,
    pub latency_ms: u64,
    #[serde(default)]
    pub confidence_rating: Option<u8>,
    #[serde(default)]
    pub self_rating: Option<u8>,
    #[serde(default)]
    pub help_requested: Option<bool>,
}

/// `recordResponse` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResponseView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_item: Option<ItemView>,
    pub stage: LoopStage,
    pub session_complete: bool,
}

/// `completeSession` summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSummary {
    pub total_items: usize,
    pub correct: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    pub kcs_updated: usize,
    pub fsrs_rows_updated: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSessionView {
    pub summary: CompletionSummary,
}

/// `abandonSession` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbandonSessionView {
    pub session_id: String,
    pub abandoned_at_stage: Option<LoopStage>,
}
