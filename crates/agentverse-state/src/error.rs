//! Error types for agentverse-state

use thiserror::Error;

/// Errors raised by the collaborator services a manipulator calls through.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Embedding service failed to produce vectors
    #[error("Embedding failed: {reason}")]
    Embedding { reason: String },

    /// LLM service failed to produce a completion
    #[error("LLM generation failed: {reason}")]
    Llm { reason: String },

    /// Memory store could not be read
    #[error("Memory store unavailable: {reason}")]
    Store { reason: String },

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Upstream answered with something we could not interpret
    #[error("Invalid response from {service}: {reason}")]
    InvalidResponse { service: String, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServiceError {
    pub fn embedding(reason: impl Into<String>) -> Self {
        ServiceError::Embedding {
            reason: reason.into(),
        }
    }

    pub fn llm(reason: impl Into<String>) -> Self {
        ServiceError::Llm {
            reason: reason.into(),
        }
    }

    pub fn store(reason: impl Into<String>) -> Self {
        ServiceError::Store {
            reason: reason.into(),
        }
    }

    /// Short machine-readable label used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Embedding { .. } => "embedding",
            ServiceError::Llm { .. } => "llm",
            ServiceError::Store { .. } => "store",
            ServiceError::Http(_) => "http",
            ServiceError::InvalidResponse { .. } => "invalid_response",
            ServiceError::Io(_) => "io",
            ServiceError::Serialization(_) => "serialization",
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        ServiceError::Http(err.to_string())
    }
}
