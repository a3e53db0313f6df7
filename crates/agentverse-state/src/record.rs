//! Memory record schema shared by stores and manipulators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single conversational memory.
///
/// Scores are filled in lazily by LLM rating calls. Once scored a record is
/// never mutated in place: [`MemoryRecord::scored`] consumes the record and
/// returns a new value, which keeps content-keyed memo tables coherent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Message text
    pub content: String,
    /// Optional embedding vector (for semantic filtering/retrieval)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// When the message was observed
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Long-term significance in [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<f64>,
    /// Urgency in [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immediacy: Option<f64>,
    /// Free-form metadata (sender, type, ...)
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl MemoryRecord {
    /// Create a new record stamped with the current time.
    pub fn new(content: impl Into<String>) -> Self {
        MemoryRecord {
            content: content.into(),
            embedding: None,
            timestamp: Utc::now(),
            importance: None,
            immediacy: None,
            metadata: Map::new(),
        }
    }

    /// Set the observation timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set embedding vector
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Insert a metadata entry
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Produce a scored copy. Scores are clamped to [0, 1].
    pub fn scored(self, importance: f64, immediacy: Option<f64>) -> Self {
        MemoryRecord {
            importance: Some(importance.clamp(0.0, 1.0)),
            immediacy: immediacy.map(|v| v.clamp(0.0, 1.0)),
            ..self
        }
    }

    /// Whether an importance score has been assigned.
    pub fn is_scored(&self) -> bool {
        self.importance.is_some()
    }

    /// Conversational messages carry no `type` metadata or `type = "message"`.
    pub fn is_message(&self) -> bool {
        match self.metadata.get("type").and_then(|v| v.as_str()) {
            None => true,
            Some(kind) => kind == "message",
        }
    }

    /// Length of the content in characters (not bytes).
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}
