//! Learner-protocol classification.
//!
//! Classifies a learner's recent behaviour into one of four coarse protocols
//! that the planner uses to adjust pacing: cold-start learners get a tiny
//! budget, stuck learners get a review backoff, bored learners get a
//! challenge injection.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnerProtocol {
    ColdStart,
    Stuck,
    Bored,
    Normal,
}

impl LearnerProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearnerProtocol::ColdStart => "cold_start",
            LearnerProtocol::Stuck => "stuck",
            LearnerProtocol::Bored => "bored",
            LearnerProtocol::Normal => "normal",
        }
    }
}

/// Recent-behaviour inputs for protocol detection.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolInput {
    pub session_count: u32,
    pub recent_average_score: f64,
    pub recent_items_per_session: f64,
    /// True when every assigned item is still unseen.
    pub all_assigned_unseen: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolDecision {
    pub protocol: LearnerProtocol,
    pub reason: String,
    pub cold_start_item_budget: Option<usize>,
    pub stuck_backoff_days: Option<u32>,
    pub inject_challenge: bool,
}

/// Classify the learner. Order matters: cold start wins over stuck/bored.
pub fn detect_learner_protocol(input: &ProtocolInput) -> ProtocolDecision {
    if input.session_count < 3 || input.all_assigned_unseen {
        return ProtocolDecision {
            protocol: LearnerProtocol::ColdStart,
            reason: format!(
                "session_count={} all_unseen={}",
                input.session_count, input.all_assigned_unseen
            ),
            cold_start_item_budget: Some(3),
            stuck_backoff_days: None,
            inject_challenge: false,
        };
    }
    if input.recent_average_score < 0.5 && input.recent_items_per_session < 5.0 {
        return ProtocolDecision {
            protocol: LearnerProtocol::Stuck,
            reason: format!(
                "recent_avg_score={:.2} items_per_session={:.1}",
                input.recent_average_score, input.recent_items_per_session
            ),
            cold_start_item_budget: None,
            stuck_backoff_days: Some(3),
            inject_challenge: false,
        };
    }
    if input.recent_average_score > 0.85 && input.recent_items_per_session > 15.0 {
        return ProtocolDecision {
            protocol: LearnerProtocol::Bored,
            reason: format!(
                "recent_avg_score={:.2} items_per_session={:.1}",
                input.recent_average_score, input.recent_items_per_session
            ),
            cold_start_item_budget: None,
            stuck_backoff_days: None,
            inject_challenge: true,
        };
    }
    ProtocolDecision {
        protocol: LearnerProtocol::Normal,
        reason: "within normal bands".to_string(),
        cold_start_item_budget: None,
        stuck_backoff_days: None,
        inject_challenge: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn cold_start_on_low_session_count() {
        let decision = detect_learner_protocol(&ProtocolInput {
            session_count: 2,
            recent_average_score: 0.7,
            recent_items_per_session: 8.0,
            all_assigned_unseen: false,
        });
        assert_eq!(decision.protocol, LearnerProtocol::ColdStart);
        assert_eq!(decision.cold_start_item_budget, Some(3));
    }

    #[test]
    fn cold_start_when_everything_is_unseen() {
        let decision = detect_learner_protocol(&ProtocolInput {
            session_count: 20,
            recent_average_score: 0.7,
            recent_items_per_session: 8.0,
            all_assigned_unseen: true,
        });
        assert_eq!(decision.protocol, LearnerProtocol::ColdStart);
    }

    #[rstest]
    #[case(0.4, 4.0, LearnerProtocol::Stuck)]
    #[case(0.9, 16.0, LearnerProtocol::Bored)]
    #[case(0.7, 8.0, LearnerProtocol::Normal)]
    #[case(0.4, 8.0, LearnerProtocol::Normal)] // low score alone is not stuck
    #[case(0.9, 10.0, LearnerProtocol::Normal)] // high score alone is not bored
    fn classification_bands(
        #[case] score: f64,
        #[case] items: f64,
        #[case] expected: LearnerProtocol,
    ) {
        let decision = detect_learner_protocol(&ProtocolInput {
            session_count: 10,
            recent_average_score: score,
            recent_items_per_session: items,
            all_assigned_unseen: false,
        });
        assert_eq!(decision.protocol, expected);
    }

    #[test]
    fn stuck_carries_backoff_and_bored_carries_challenge() {
        let stuck = detect_learner_protocol(&ProtocolInput {
            session_count: 10,
            recent_average_score: 0.3,
            recent_items_per_session: 3.0,
            all_assigned_unseen: false,
        });
        assert_eq!(stuck.stuck_backoff_days, Some(3));

        let bored = detect_learner_protocol(&ProtocolInput {
            session_count: 10,
            recent_average_score: 0.95,
            recent_items_per_session: 20.0,
            all_assigned_unseen: false,
        });
        assert!(bored.inject_challenge);
    }
}
