//! Test utilities for triloop-core and downstream crates.
//!
//! Provides re-exports of the mockall-generated port mocks plus reusable
//! fixtures and default mock wiring.

pub mod fixtures;

pub use crate::ports::{MockAuthProvider, MockContentRepository, MockLearnerRepository};
pub use crate::services::MockResponseScorer;
