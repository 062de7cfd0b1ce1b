use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identity resolved from a bearer credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: String,
    pub role: String,
    pub is_active: bool,
}

/// Authentication collaborator. Consulted on every orchestrator operation.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Validate a bearer credential. `None` means the credential is unknown
    /// or expired.
    async fn validate(&self, token: &str) -> anyhow::Result<Option<AuthContext>>;
}
