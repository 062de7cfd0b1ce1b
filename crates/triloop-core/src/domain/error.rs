use thiserror::Error;

/// Error surface of the engine's orchestrator operations.
///
/// Guard rejections from the session state machine never appear here: the
/// orchestrator recovers from them internally by keeping the pre-guard state.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Machine-readable kind for response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation { .. } => "validation_error",
            EngineError::NotFound { .. } => "not_found",
            EngineError::Forbidden(_) => "forbidden",
            EngineError::Conflict(_) => "conflict",
            EngineError::Cancelled(_) => "cancelled",
            EngineError::Internal(_) => "internal",
        }
    }
}
