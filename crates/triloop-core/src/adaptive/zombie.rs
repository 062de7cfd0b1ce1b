//! Zombie detection and remediation routing.
//!
//! A zombie is an item the learner chronically misses. Remediation escalates
//! with the consecutive-failure count: rest or simplify first, then flag the
//! content for restructuring, finally retire it.

use serde::{Deserialize, Serialize};

/// Failure state of one (learner, item) pair.
#[derive(Debug, Clone, Copy)]
pub struct ZombieInput {
    pub consecutive_again: u32,
    pub retrievability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZombieStatus {
    pub is_zombie: bool,
    pub at_risk: bool,
}

/// Zombie: three or more consecutive Again ratings with retrievability at or
/// below 0.4. At-risk: two consecutive failures short of zombie status.
pub fn detect_zombie(input: &ZombieInput) -> ZombieStatus {
    let is_zombie = input.consecutive_again >= 3 && input.retrievability <= 0.4;
    ZombieStatus {
        is_zombie,
        at_risk: !is_zombie && input.consecutive_again >= 2,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationStrategy {
    /// Remove the item from circulation.
    Retire,
    /// Flag for content review.
    Restructure,
    /// Suspend scheduling for a fixed rest period.
    Rest,
    /// Route the learner to prerequisite material.
    Simplify,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationPlan {
    pub strategy: RemediationStrategy,
    pub rest_days: Option<u32>,
    pub reason: String,
}

/// Pick a remediation strategy from the failure count. Items with fewer than
/// three consecutive failures need no remediation yet.
pub fn plan_remediation(consecutive_again: u32, retrievability: f64) -> Option<RemediationPlan> {
    match consecutive_again {
        0..=2 => None,
        3..=4 if retrievability < 0.2 => Some(RemediationPlan {
            strategy: RemediationStrategy::Rest,
            rest_days: Some(7),
            reason: format!("{consecutive_again} consecutive failures with R={retrievability:.2}"),
        }),
        3..=4 => Some(RemediationPlan {
            strategy: RemediationStrategy::Simplify,
            rest_days: None,
            reason: format!("{consecutive_again} consecutive failures, prerequisites likely weak"),
        }),
        5..=6 => Some(RemediationPlan {
            strategy: RemediationStrategy::Restructure,
            rest_days: None,
            reason: format!("{consecutive_again} consecutive failures, flagging content"),
        }),
        _ => Some(RemediationPlan {
            strategy: RemediationStrategy::Retire,
            rest_days: None,
            reason: format!("{consecutive_again} consecutive failures, retiring item"),
        }),
    }
}
