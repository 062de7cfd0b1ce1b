//! Repository and collaborator contracts consumed by the engine. The engine
//! never talks to a store directly; implementations live outside the core.

pub mod auth;
pub mod content_repository;
pub mod learner_repository;

pub use auth::{AuthContext, AuthProvider};
pub use content_repository::ContentRepository;
pub use learner_repository::{CompletionWrite, LearnerRepository};

#[cfg(any(test, feature = "testing"))]
pub use auth::MockAuthProvider;
#[cfg(any(test, feature = "testing"))]
pub use content_repository::MockContentRepository;
#[cfg(any(test, feature = "testing"))]
pub use learner_repository::MockLearnerRepository;
