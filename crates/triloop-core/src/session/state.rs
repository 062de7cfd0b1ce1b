//! Session state: the single source of truth for one in-flight session.
//!
//! The whole struct round-trips through JSON as the session row's
//! `adaptive_decisions` snapshot, so every field is serde-visible.

use crate::domain::{LoopStage, SessionStatus, SessionType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Planned composition of the session queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedBalance {
    pub new: u32,
    pub review: u32,
    pub interleaved: u32,
}

/// One queue slot: the item and the stage it belongs to. Stage boundaries are
/// read straight off the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub item_id: String,
    pub stage: LoopStage,
}

/// Per-stage minimum and target durations, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    pub min_encounter_ms: u64,
    pub min_analysis_ms: u64,
    pub min_return_ms: u64,
    pub target_encounter_ms: u64,
    pub target_analysis_ms: u64,
    pub target_return_ms: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            min_encounter_ms: 180_000,
            min_analysis_ms: 360_000,
            min_return_ms: 180_000,
            target_encounter_ms: 240_000,
            target_analysis_ms: 600_000,
            target_return_ms: 240_000,
        }
    }
}

impl StageConfig {
    pub fn min_for(&self, stage: LoopStage) -> u64 {
        match stage {
            LoopStage::Encounter => self.min_encounter_ms,
            LoopStage::Analysis => self.min_analysis_ms,
            LoopStage::Return => self.min_return_ms,
        }
    }

    pub fn target_for(&self, stage: LoopStage) -> u64 {
        match stage {
            LoopStage::Encounter => self.target_encounter_ms,
            LoopStage::Analysis => self.target_analysis_ms,
            LoopStage::Return => self.target_return_ms,
        }
    }

    pub fn target_total(&self) -> u64 {
        self.target_encounter_ms + self.target_analysis_ms + self.target_return_ms
    }
}

/// Full state of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub user_id: String,
    pub topic_id: String,
    pub status: SessionStatus,
    pub current_stage: Option<LoopStage>,

    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub encounter_started_at: Option<DateTime<Utc>>,
    pub analysis_started_at: Option<DateTime<Utc>>,
    pub return_started_at: Option<DateTime<Utc>>,

    pub total_duration_ms: u64,
    pub encounter_duration_ms: u64,
    pub analysis_duration_ms: u64,
    pub return_duration_ms: u64,
    pub paused_duration_ms: u64,
    /// Cumulative paused milliseconds at the moment the current stage was
    /// entered, so pause time is attributed to the stage it happened in.
    pub stage_paused_offset_ms: u64,

    pub item_queue: Vec<QueueEntry>,
    pub current_item_index: usize,

    pub encounter_complete: bool,
    pub analysis_complete: bool,
    pub return_complete: bool,
    /// Completed activity ids in first-completion order.
    pub completed_activity_ids: Vec<String>,

    pub abandoned_at_stage: Option<LoopStage>,
    pub abandonment_reason: Option<String>,

    pub session_type: SessionType,
    pub planned_balance: PlannedBalance,
}

impl SessionState {
    /// A freshly planned session, ready to start.
    pub fn new_ready(
        session_id: String,
        user_id: String,
        topic_id: String,
        session_type: SessionType,
        item_queue: Vec<QueueEntry>,
        planned_balance: PlannedBalance,
    ) -> Self {
        Self {
            session_id,
            user_id,
            topic_id,
            status: SessionStatus::Ready,
            current_stage: None,
            started_at: None,
            paused_at: None,
            completed_at: None,
            encounter_started_at: None,
            analysis_started_at: None,
            return_started_at: None,
            total_duration_ms: 0,
            encounter_duration_ms: 0,
            analysis_duration_ms: 0,
            return_duration_ms: 0,
            paused_duration_ms: 0,
            stage_paused_offset_ms: 0,
            item_queue,
            current_item_index: 0,
            encounter_complete: false,
            analysis_complete: false,
            return_complete: false,
            completed_activity_ids: Vec::new(),
            abandoned_at_stage: None,
            abandonment_reason: None,
            session_type,
            planned_balance,
        }
    }

    pub fn stage_started_at(&self, stage: LoopStage) -> Option<DateTime<Utc>> {
        match stage {
            LoopStage::Encounter => self.encounter_started_at,
            LoopStage::Analysis => self.analysis_started_at,
            LoopStage::Return => self.return_started_at,
        }
    }

    pub(crate) fn set_stage_started_at(&mut self, stage: LoopStage, at: DateTime<Utc>) {
        match stage {
            LoopStage::Encounter => self.encounter_started_at = Some(at),
            LoopStage::Analysis => self.analysis_started_at = Some(at),
            LoopStage::Return => self.return_started_at = Some(at),
        }
    }

    pub fn stage_duration_ms(&self, stage: LoopStage) -> u64 {
        match stage {
            LoopStage::Encounter => self.encounter_duration_ms,
            LoopStage::Analysis => self.analysis_duration_ms,
            LoopStage::Return => self.return_duration_ms,
        }
    }

    pub(crate) fn set_stage_duration_ms(&mut self, stage: LoopStage, ms: u64) {
        match stage {
            LoopStage::Encounter => self.encounter_duration_ms = ms,
            LoopStage::Analysis => self.analysis_duration_ms = ms,
            LoopStage::Return => self.return_duration_ms = ms,
        }
    }

    pub fn stage_complete(&self, stage: LoopStage) -> bool {
        match stage {
            LoopStage::Encounter => self.encounter_complete,
            LoopStage::Analysis => self.analysis_complete,
            LoopStage::Return => self.return_complete,
        }
    }

    pub(crate) fn set_stage_complete(&mut self, stage: LoopStage) {
        match stage {
            LoopStage::Encounter => self.encounter_complete = true,
            LoopStage::Analysis => self.analysis_complete = true,
            LoopStage::Return => self.return_complete = true,
        }
    }

    /// Milliseconds of the pause segment currently open, if any.
    fn ongoing_pause_ms(&self, now: DateTime<Utc>) -> u64 {
        match self.paused_at {
            Some(paused_at) => (now.timestamp_millis() - paused_at.timestamp_millis()).max(0) as u64,
            None => 0,
        }
    }

    /// Pause time attributed to the current stage, including an open segment.
    fn stage_pause_ms(&self, now: DateTime<Utc>) -> u64 {
        (self.paused_duration_ms + self.ongoing_pause_ms(now))
            .saturating_sub(self.stage_paused_offset_ms)
    }

    /// Active (non-paused) time accumulated in the current stage as of `now`:
    /// the stored duration plus wall time since the stage (re)started, minus
    /// pause time within the stage.
    pub fn current_stage_elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        let Some(stage) = self.current_stage else {
            return 0;
        };
        let Some(started_at) = self.stage_started_at(stage) else {
            return self.stage_duration_ms(stage);
        };
        let wall = (now.timestamp_millis() - started_at.timestamp_millis()).max(0) as u64;
        self.stage_duration_ms(stage) + wall.saturating_sub(self.stage_pause_ms(now))
    }

    /// Progress through the current stage against its target duration.
    pub fn stage_progress(&self, now: DateTime<Utc>, config: &StageConfig) -> f64 {
        let Some(stage) = self.current_stage else {
            return 0.0;
        };
        let target = config.target_for(stage).max(1);
        (self.current_stage_elapsed_ms(now) as f64 / target as f64).min(1.0)
    }

    /// Progress through the whole session against the summed stage targets.
    pub fn session_progress(&self, now: DateTime<Utc>, config: &StageConfig) -> f64 {
        let mut total = 0u64;
        for stage in [LoopStage::Encounter, LoopStage::Analysis, LoopStage::Return] {
            if Some(stage) == self.current_stage {
                total += self.current_stage_elapsed_ms(now);
            } else {
                total += self.stage_duration_ms(stage);
            }
        }
        (total as f64 / config.target_total().max(1) as f64).min(1.0)
    }

    /// The queue entry the learner is expected to answer next.
    pub fn expected_entry(&self) -> Option<&QueueEntry> {
        self.item_queue.get(self.current_item_index)
    }

    /// Whether completing the entry at `index` lands on a stage boundary:
    /// the next entry belongs to a different stage, or the queue is done.
    pub fn is_stage_boundary(&self, index: usize) -> bool {
        match (self.item_queue.get(index), self.item_queue.get(index + 1)) {
            (Some(_), None) => true,
            (Some(current), Some(next)) => next.stage != current.stage,
            (None, _) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn queue() -> Vec<QueueEntry> {
        vec![
            QueueEntry {
                item_id: "e1".into(),
                stage: LoopStage::Encounter,
            },
            QueueEntry {
                item_id: "a1".into(),
                stage: LoopStage::Analysis,
            },
            QueueEntry {
                item_id: "a2".into(),
                stage: LoopStage::Analysis,
            },
            QueueEntry {
                item_id: "r1".into(),
                stage: LoopStage::Return,
            },
        ]
    }

    fn ready_state() -> SessionState {
        SessionState::new_ready(
            "s1".into(),
            "u1".into(),
            "t1".into(),
            SessionType::Standard,
            queue(),
            PlannedBalance::default(),
        )
    }

    #[test]
    fn boundary_detection_reads_the_queue() {
        let state = ready_state();
        assert!(state.is_stage_boundary(0)); // e1 -> a1 changes stage
        assert!(!state.is_stage_boundary(1)); // a1 -> a2 same stage
        assert!(state.is_stage_boundary(2)); // a2 -> r1 changes stage
        assert!(state.is_stage_boundary(3)); // queue exhausted
        assert!(!state.is_stage_boundary(4)); // out of range
    }

    #[test]
    fn stage_elapsed_subtracts_pause_time() {
        let t0 = Utc::now();
        let mut state = ready_state();
        state.status = SessionStatus::InProgress;
        state.current_stage = Some(LoopStage::Encounter);
        state.started_at = Some(t0);
        state.encounter_started_at = Some(t0);
        state.paused_duration_ms = 30_000;
        // All recorded pause time happened within this stage.
        state.stage_paused_offset_ms = 0;

        let now = t0 + Duration::seconds(120);
        assert_eq!(state.current_stage_elapsed_ms(now), 90_000);
    }

    #[test]
    fn open_pause_segment_counts_toward_stage_pause() {
        let t0 = Utc::now();
        let mut state = ready_state();
        state.status = SessionStatus::Paused;
        state.current_stage = Some(LoopStage::Encounter);
        state.started_at = Some(t0);
        state.encounter_started_at = Some(t0);
        state.paused_at = Some(t0 + Duration::seconds(60));

        // 60s active, then 40s (and counting) paused.
        let now = t0 + Duration::seconds(100);
        assert_eq!(state.current_stage_elapsed_ms(now), 60_000);
    }

    #[test]
    fn progress_caps_at_one() {
        let t0 = Utc::now();
        let mut state = ready_state();
        state.status = SessionStatus::InProgress;
        state.current_stage = Some(LoopStage::Encounter);
        state.encounter_started_at = Some(t0);

        let config = StageConfig::default();
        let now = t0 + Duration::seconds(10_000);
        assert_eq!(state.stage_progress(now, &config), 1.0);
        assert!(state.session_progress(now, &config) <= 1.0);
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let state = ready_state();
        let json = serde_json::to_value(&state).unwrap();
        let back: SessionState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
