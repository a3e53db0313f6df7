//! Error taxonomy for memory manipulation.

use agentverse_state::ServiceError;
use serde_json::{json, Map, Value};

/// Errors produced while a manipulator is running.
#[derive(Debug, thiserror::Error)]
pub enum ManipulationError {
    #[error("{manipulator}: custom format requires a template")]
    MissingTemplate { manipulator: String },

    #[error("{manipulator}: service call failed: {source}")]
    Service {
        manipulator: String,
        #[source]
        source: ServiceError,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{manipulator}: invalid response: {reason}")]
    InvalidResponse { manipulator: String, reason: String },
}

impl ManipulationError {
    /// Wrap a collaborator failure with the name of the manipulator that saw it.
    pub fn service(manipulator: &str, source: ServiceError) -> Self {
        ManipulationError::Service {
            manipulator: manipulator.to_string(),
            source,
        }
    }

    /// Name of the manipulator that raised the error, when known.
    pub fn manipulator(&self) -> Option<&str> {
        match self {
            ManipulationError::MissingTemplate { manipulator }
            | ManipulationError::Service { manipulator, .. }
            | ManipulationError::InvalidResponse { manipulator, .. } => Some(manipulator),
            ManipulationError::Serialization(_) => None,
        }
    }

    /// Structured details for logs and degraded pipeline outcomes.
    pub fn details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        if let Some(name) = self.manipulator() {
            details.insert("manipulator".into(), json!(name));
        }
        let kind = match self {
            ManipulationError::MissingTemplate { .. } => "missing_template",
            ManipulationError::Service { source, .. } => {
                details.insert("service".into(), json!(source.kind()));
                "service"
            }
            ManipulationError::Serialization(_) => "serialization",
            ManipulationError::InvalidResponse { reason, .. } => {
                details.insert("reason".into(), json!(reason));
                "invalid_response"
            }
        };
        details.insert("kind".into(), json!(kind));
        details.insert("error".into(), json!(self.to_string()));
        details
    }
}

/// Errors produced while validating configuration or assembling a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("unsupported transform format: {format}")]
    UnsupportedFormat { format: String },

    #[error("{field} out of range: {value} (expected {expected})")]
    OutOfRange {
        field: String,
        value: f64,
        expected: String,
    },

    #[error("unknown manipulator: {kind}")]
    UnknownManipulator { kind: String },

    #[error("manipulator already registered: {kind}")]
    DuplicateManipulator { kind: String },

    #[error("manipulator {manipulator} requires the {service} service")]
    MissingService {
        manipulator: String,
        service: &'static str,
    },

    #[error("invalid options for {manipulator}: {reason}")]
    InvalidOptions { manipulator: String, reason: String },

    #[error("config error: {0}")]
    Config(String),
}

impl ValidationError {
    pub(crate) fn out_of_range(field: &str, value: f64, expected: &str) -> Self {
        ValidationError::OutOfRange {
            field: field.to_string(),
            value,
            expected: expected.to_string(),
        }
    }
}

/// Result type for manipulation operations.
pub type Result<T> = std::result::Result<T, ManipulationError>;

/// Result type for configuration validation.
pub type ValidationResult<T> = std::result::Result<T, ValidationError>;
