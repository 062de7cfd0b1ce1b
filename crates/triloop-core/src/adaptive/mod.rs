//! Adaptive selector: plans what a session presents, how hard it is, and in
//! what order, from candidate pools and the learner's memory state.

pub mod protocol;
pub mod selector;
pub mod types;
pub mod zombie;

pub use protocol::{detect_learner_protocol, LearnerProtocol, ProtocolDecision, ProtocolInput};
pub use selector::{compose_queue, plan, plan_small};
pub use types::{
    base_interleave_ratio, interleave_ratio, review_ratio, PlanRequest, SelectedItem,
    SelectionReason, SessionPlan, StageBalance, TopicCandidates,
};
pub use zombie::{
    detect_zombie, plan_remediation, RemediationPlan, RemediationStrategy, ZombieInput,
    ZombieStatus,
};
