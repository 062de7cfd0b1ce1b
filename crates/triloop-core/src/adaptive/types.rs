//! Core types for the adaptive session planner.

use crate::domain::{ContentItem, SessionType};
use crate::fsrs::FsrsCard;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Share of overall session time per loop stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageBalance {
    pub encounter: f64,
    pub analysis: f64,
    #[serde(rename = "return")]
    pub return_stage: f64,
}

impl StageBalance {
    /// The neutral loop default.
    pub const DEFAULT: StageBalance = StageBalance {
        encounter: 0.2,
        analysis: 0.6,
        return_stage: 0.2,
    };

    /// Quick sessions compress encounter and return to a fixed split.
    pub const QUICK: StageBalance = StageBalance {
        encounter: 0.1,
        analysis: 0.7,
        return_stage: 0.2,
    };

    /// Resolve the stage balance for a session type and hemisphere score.
    ///
    /// Standard and extended sessions bias stage time by the learner's
    /// hemisphere balance: a leftward tilt (negative) earns more encounter
    /// and return time, a rightward tilt more analysis.
    pub fn resolve(session_type: SessionType, hemisphere_balance: f64) -> StageBalance {
        if session_type == SessionType::Quick {
            return StageBalance::QUICK;
        }
        match hemisphere_balance {
            h if h < -0.3 => StageBalance {
                encounter: 0.30,
                analysis: 0.40,
                return_stage: 0.30,
            },
            h if h < -0.1 => StageBalance {
                encounter: 0.27,
                analysis: 0.46,
                return_stage: 0.27,
            },
            h if h <= 0.1 => StageBalance::DEFAULT,
            h if h <= 0.3 => StageBalance {
                encounter: 0.22,
                analysis: 0.56,
                return_stage: 0.22,
            },
            _ => StageBalance {
                encounter: 0.20,
                analysis: 0.60,
                return_stage: 0.20,
            },
        }
    }
}

/// Review share of the analysis budget, by difficulty level.
pub fn review_ratio(level: u8) -> f64 {
    match level {
        1 => 0.70,
        2 => 0.60,
        3 => 0.55,
        _ => 0.50,
    }
}

/// Base interleave share of the analysis budget, by difficulty level.
pub fn base_interleave_ratio(level: u8) -> f64 {
    match level {
        1 => 0.10,
        2 => 0.20,
        3 => 0.25,
        _ => 0.35,
    }
}

/// Effective interleave ratio after session-type adjustment: quick sessions
/// cap at 0.15, extended sessions add 0.05 up to 0.40.
pub fn interleave_ratio(level: u8, session_type: SessionType) -> f64 {
    let base = base_interleave_ratio(level);
    match session_type {
        SessionType::Quick => base.min(0.15),
        SessionType::Standard => base,
        SessionType::Extended => (base + 0.05).min(0.40),
    }
}

/// Candidate analysis items for one topic.
#[derive(Debug, Clone)]
pub struct TopicCandidates {
    pub topic_id: String,
    pub analysis_items: Vec<ContentItem>,
}

/// Input to the planner: pre-fetched candidates and learner state.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub primary_topic_id: String,
    /// Candidate pools, primary topic included.
    pub topics: Vec<TopicCandidates>,
    /// Memory states keyed by content item id. Missing entries mean "new".
    pub memory_states: HashMap<String, FsrsCard>,
    /// Current difficulty level, 1..=4.
    pub current_level: u8,
    pub session_type: SessionType,
    /// Hemisphere balance score in [-1, 1].
    pub hemisphere_balance: f64,
    /// Explicit analysis budget; positive values are floored, anything else
    /// falls back to the session-type default.
    pub analysis_item_budget: Option<f64>,
    pub now: DateTime<Utc>,
}

impl PlanRequest {
    pub fn effective_budget(&self) -> usize {
        match self.analysis_item_budget {
            Some(b) if b > 0.0 => b.floor() as usize,
            _ => self.session_type.analysis_item_budget(),
        }
    }
}

/// Why an item entered the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    Overdue,
    Due,
    NewPrimary,
    InterleavedRelated,
    Fill,
}

impl SelectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionReason::Overdue => "overdue",
            SelectionReason::Due => "due",
            SelectionReason::NewPrimary => "new_primary",
            SelectionReason::InterleavedRelated => "interleaved_related",
            SelectionReason::Fill => "fill",
        }
    }
}

/// One planned analysis item with its selection evidence.
#[derive(Debug, Clone)]
pub struct SelectedItem {
    pub item: ContentItem,
    pub score: f64,
    pub reason: SelectionReason,
    pub retrievability: f64,
    pub is_new: bool,
}

/// Output of the planner.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub level: u8,
    pub next_level: u8,
    pub stage_balance: StageBalance,
    pub selected: Vec<SelectedItem>,
    pub rationale: Vec<String>,
}

impl SessionPlan {
    /// Selection counts keyed by reason, for analytics and planned balance.
    pub fn counts_by_reason(&self) -> HashMap<SelectionReason, usize> {
        let mut counts = HashMap::new();
        for sel in &self.selected {
            *counts.entry(sel.reason).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quick_balance_is_fixed_regardless_of_hbs() {
        for hbs in [-0.9, -0.2, 0.0, 0.2, 0.9] {
            assert_eq!(
                StageBalance::resolve(SessionType::Quick, hbs),
                StageBalance::QUICK
            );
        }
    }

    #[test]
    fn hbs_bins_select_expected_balances() {
        let b = StageBalance::resolve(SessionType::Standard, -0.5);
        assert_eq!((b.encounter, b.analysis, b.return_stage), (0.30, 0.40, 0.30));

        let b = StageBalance::resolve(SessionType::Standard, -0.2);
        assert_eq!((b.encounter, b.analysis, b.return_stage), (0.27, 0.46, 0.27));

        let b = StageBalance::resolve(SessionType::Standard, 0.0);
        assert_eq!(b, StageBalance::DEFAULT);

        let b = StageBalance::resolve(SessionType::Extended, 0.2);
        assert_eq!((b.encounter, b.analysis, b.return_stage), (0.22, 0.56, 0.22));

        let b = StageBalance::resolve(SessionType::Extended, 0.5);
        assert_eq!((b.encounter, b.analysis, b.return_stage), (0.20, 0.60, 0.20));
    }

    #[test]
    fn interleave_ratio_session_adjustments() {
        // Quick caps at 0.15.
        assert_eq!(interleave_ratio(4, SessionType::Quick), 0.15);
        assert_eq!(interleave_ratio(1, SessionType::Quick), 0.10);
        // Extended adds 0.05, capped at 0.40.
        assert_eq!(interleave_ratio(2, SessionType::Extended), 0.25);
        assert_eq!(interleave_ratio(4, SessionType::Extended), 0.40);
        // Standard uses the base table.
        assert_eq!(interleave_ratio(3, SessionType::Standard), 0.25);
    }

    #[test]
    fn budget_floor_and_fallback() {
        let mut req = PlanRequest {
            primary_topic_id: "t1".into(),
            topics: vec![],
            memory_states: HashMap::new(),
            current_level: 1,
            session_type: SessionType::Standard,
            hemisphere_balance: 0.0,
            analysis_item_budget: Some(12.7),
            now: Utc::now(),
        };
        assert_eq!(req.effective_budget(), 12);

        req.analysis_item_budget = Some(0.0);
        assert_eq!(req.effective_budget(), 16);

        req.analysis_item_budget = None;
        req.session_type = SessionType::Extended;
        assert_eq!(req.effective_budget(), 28);
    }
}
