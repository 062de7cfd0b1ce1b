//! Pure session reducer.
//!
//! Every call takes the current state plus one timestamped event and returns
//! either the successor state or a typed transition error. No I/O, no
//! mutation of the input. Guard implementations may be swapped out; a guard
//! that fails internally surfaces as `ReducerError` instead of unwinding.

use super::events::SessionEvent;
use super::state::{SessionState, StageConfig};
use crate::domain::{LoopStage, SessionStatus};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionErrorKind {
    /// The event is never legal from this status/stage.
    InvalidTransition,
    /// The state itself is inconsistent (e.g. paused without a timestamp).
    InvalidState,
    /// A guard evaluated to false; the caller keeps the prior state.
    GuardFailed,
    /// The event is not recognised by the active reducer.
    UnknownEvent,
    /// A custom guard implementation failed internally.
    ReducerError,
}

#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {reason}")]
pub struct TransitionError {
    pub kind: TransitionErrorKind,
    pub reason: String,
}

impl TransitionError {
    fn new(kind: TransitionErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    fn invalid_transition(reason: impl Into<String>) -> Self {
        Self::new(TransitionErrorKind::InvalidTransition, reason)
    }

    fn invalid_state(reason: impl Into<String>) -> Self {
        Self::new(TransitionErrorKind::InvalidState, reason)
    }

    fn guard_failed(reason: impl Into<String>) -> Self {
        Self::new(TransitionErrorKind::GuardFailed, reason)
    }
}

/// Stage-advance guards. The defaults implement the minimum-duration rules;
/// implementations can tighten or relax them.
pub trait SessionGuards {
    fn can_advance_to_analysis(
        &self,
        state: &SessionState,
        at: DateTime<Utc>,
        config: &StageConfig,
    ) -> anyhow::Result<bool> {
        Ok(state.current_stage == Some(LoopStage::Encounter)
            && state.encounter_complete
            && state.encounter_started_at.is_some()
            && state.current_stage_elapsed_ms(at) >= config.min_for(LoopStage::Encounter))
    }

    fn can_advance_to_return(
        &self,
        state: &SessionState,
        at: DateTime<Utc>,
        config: &StageConfig,
    ) -> anyhow::Result<bool> {
        Ok(state.current_stage == Some(LoopStage::Analysis)
            && state.analysis_complete
            && state.analysis_started_at.is_some()
            && state.current_item_index > 0
            && state.current_stage_elapsed_ms(at) >= config.min_for(LoopStage::Analysis))
    }

    fn can_complete(
        &self,
        state: &SessionState,
        at: DateTime<Utc>,
        config: &StageConfig,
    ) -> anyhow::Result<bool> {
        Ok(state.current_stage == Some(LoopStage::Return)
            && state.return_complete
            && state.return_started_at.is_some()
            && state.current_stage_elapsed_ms(at) >= config.min_for(LoopStage::Return))
    }
}

/// The built-in guard set.
pub struct DefaultGuards;

impl SessionGuards for DefaultGuards {}

/// Apply one event with the default guards.
pub fn reduce(
    state: &SessionState,
    event: &SessionEvent,
    at: DateTime<Utc>,
    config: &StageConfig,
) -> Result<SessionState, TransitionError> {
    reduce_with_guards(state, event, at, config, &DefaultGuards)
}

/// Apply one event with caller-provided guards.
pub fn reduce_with_guards(
    state: &SessionState,
    event: &SessionEvent,
    at: DateTime<Utc>,
    config: &StageConfig,
    guards: &dyn SessionGuards,
) -> Result<SessionState, TransitionError> {
    let mut next = state.clone();
    match event {
        SessionEvent::StartSession => {
            if next.status != SessionStatus::Ready {
                return Err(TransitionError::invalid_transition(format!(
                    "cannot start from {}",
                    next.status
                )));
            }
            if next.item_queue.is_empty() {
                return Err(TransitionError::guard_failed("item queue is empty"));
            }
            next.status = SessionStatus::InProgress;
            next.current_stage = Some(LoopStage::Encounter);
            next.started_at = Some(at);
            next.encounter_started_at = Some(at);
            next.stage_paused_offset_ms = next.paused_duration_ms;
        }

        SessionEvent::PauseSession => {
            if next.status != SessionStatus::InProgress {
                return Err(TransitionError::invalid_transition(format!(
                    "cannot pause from {}",
                    next.status
                )));
            }
            if next.paused_at.is_some() {
                return Err(TransitionError::guard_failed("pause already open"));
            }
            next.paused_at = Some(at);
            next.status = SessionStatus::Paused;
        }

        SessionEvent::ResumeSession => {
            if next.status != SessionStatus::Paused {
                return Err(TransitionError::invalid_transition(format!(
                    "cannot resume from {}",
                    next.status
                )));
            }
            let Some(paused_at) = next.paused_at else {
                return Err(TransitionError::invalid_state("paused without a timestamp"));
            };
            next.paused_duration_ms +=
                (at.timestamp_millis() - paused_at.timestamp_millis()).max(0) as u64;
            next.paused_at = None;
            next.status = SessionStatus::InProgress;
        }

        SessionEvent::CompleteActivity { activity_id } => {
            if next.status != SessionStatus::InProgress {
                return Err(TransitionError::invalid_transition(format!(
                    "cannot complete activity from {}",
                    next.status
                )));
            }
            let index = next.current_item_index;
            let Some(entry) = next.item_queue.get(index).cloned() else {
                return Err(TransitionError::guard_failed("item queue exhausted"));
            };
            if !next.completed_activity_ids.iter().any(|id| id == activity_id) {
                next.completed_activity_ids.push(activity_id.clone());
            }
            next.current_item_index = index + 1;
            // Landing on a boundary marks the finished stage complete; the
            // caller decides whether to attempt the advance.
            if next.is_stage_boundary(index) {
                next.set_stage_complete(entry.stage);
            }
        }

        SessionEvent::AdvanceStage => {
            if next.status != SessionStatus::InProgress {
                return Err(TransitionError::invalid_transition(format!(
                    "cannot advance from {}",
                    next.status
                )));
            }
            let Some(stage) = next.current_stage else {
                return Err(TransitionError::invalid_state("in progress without a stage"));
            };
            let Some(target) = stage.next() else {
                return Err(TransitionError::invalid_transition(
                    "return has no next stage",
                ));
            };
            let allowed = match stage {
                LoopStage::Encounter => guards.can_advance_to_analysis(&next, at, config),
                LoopStage::Analysis => guards.can_advance_to_return(&next, at, config),
                LoopStage::Return => unreachable!("return handled above"),
            }
            .map_err(|e| TransitionError::new(TransitionErrorKind::ReducerError, e.to_string()))?;
            if !allowed {
                return Err(TransitionError::guard_failed(format!(
                    "advance from {stage} denied"
                )));
            }
            enter_next_stage(&mut next, stage, target, at);
        }

        SessionEvent::SkipStage { reason: _ } => {
            if next.status != SessionStatus::InProgress {
                return Err(TransitionError::invalid_transition(format!(
                    "cannot skip from {}",
                    next.status
                )));
            }
            let Some(stage) = next.current_stage else {
                return Err(TransitionError::invalid_state("in progress without a stage"));
            };
            let Some(target) = stage.next() else {
                return Err(TransitionError::invalid_transition(
                    "return has no next stage",
                ));
            };
            next.set_stage_complete(stage);
            enter_next_stage(&mut next, stage, target, at);
        }

        SessionEvent::CompleteSession => {
            if next.status != SessionStatus::InProgress {
                return Err(TransitionError::invalid_transition(format!(
                    "cannot complete from {}",
                    next.status
                )));
            }
            if next.current_stage != Some(LoopStage::Return) {
                return Err(TransitionError::invalid_transition(
                    "completion is only legal from the return stage",
                ));
            }
            let allowed = guards
                .can_complete(&next, at, config)
                .map_err(|e| TransitionError::new(TransitionErrorKind::ReducerError, e.to_string()))?;
            if !allowed {
                return Err(TransitionError::guard_failed("completion denied"));
            }
            let elapsed = next.current_stage_elapsed_ms(at);
            next.set_stage_duration_ms(LoopStage::Return, elapsed);
            next.status = SessionStatus::Completed;
            next.completed_at = Some(at);
            next.total_duration_ms = next.encounter_duration_ms
                + next.analysis_duration_ms
                + next.return_duration_ms;
        }

        SessionEvent::AbandonSession { reason } => {
            if !matches!(next.status, SessionStatus::InProgress | SessionStatus::Paused) {
                return Err(TransitionError::invalid_transition(format!(
                    "cannot abandon from {}",
                    next.status
                )));
            }
            if let Some(paused_at) = next.paused_at.take() {
                next.paused_duration_ms +=
                    (at.timestamp_millis() - paused_at.timestamp_millis()).max(0) as u64;
            }
            if let Some(stage) = next.current_stage {
                let elapsed = next.current_stage_elapsed_ms(at);
                next.set_stage_duration_ms(stage, elapsed);
                // Clearing the stage clock freezes elapsed time while the
                // session sits abandoned; recovery re-stamps it.
                match stage {
                    LoopStage::Encounter => next.encounter_started_at = None,
                    LoopStage::Analysis => next.analysis_started_at = None,
                    LoopStage::Return => next.return_started_at = None,
                }
                next.abandoned_at_stage = Some(stage);
            }
            next.abandonment_reason = Some(reason.clone());
            next.status = SessionStatus::Abandoned;
        }

        SessionEvent::ResumeAbandoned => {
            if next.status != SessionStatus::Abandoned {
                return Err(TransitionError::invalid_transition(format!(
                    "cannot recover from {}",
                    next.status
                )));
            }
            next.status = SessionStatus::InProgress;
            if let Some(stage) = next.current_stage {
                next.set_stage_started_at(stage, at);
            }
            next.stage_paused_offset_ms = next.paused_duration_ms;
            next.abandoned_at_stage = None;
            next.abandonment_reason = None;
        }
    }
    Ok(next)
}

/// Finalize the finished stage's duration and open the next stage.
fn enter_next_stage(
    state: &mut SessionState,
    finished: LoopStage,
    target: LoopStage,
    at: DateTime<Utc>,
) {
    let elapsed = state.current_stage_elapsed_ms(at);
    state.set_stage_duration_ms(finished, elapsed);
    state.current_stage = Some(target);
    state.set_stage_started_at(target, at);
    state.stage_paused_offset_ms = state.paused_duration_ms;
}
