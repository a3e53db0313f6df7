//! Collaborator trait definitions for memory manipulation
//!
//! These traits define the narrow interfaces a manipulator calls through:
//! - `EmbeddingService`: text → vector
//! - `LlmService`: prompt → completion
//! - `MemoryStore`: read-only access to an agent's memory records
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::record::MemoryRecord;

/// Result type for collaborator calls
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

// ---------------------------------------------------------------------------
// EmbeddingService
// ---------------------------------------------------------------------------

/// Embedding provider.
///
/// Guarantees:
/// - `get_embeddings(texts)` returns exactly one vector per input, in order.
/// - Failures surface as `ServiceError::Embedding` (or a transport error);
///   callers decide whether to fail open.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed a single text.
    async fn get_embedding(&self, text: &str) -> ServiceResult<Vec<f32>>;

    /// Embed a batch of texts.
    async fn get_embeddings(&self, texts: &[String]) -> ServiceResult<Vec<Vec<f32>>>;
}

// ---------------------------------------------------------------------------
// LlmService
// ---------------------------------------------------------------------------

/// A completed LLM response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Generated text
    pub content: String,
}

impl LlmResponse {
    pub fn new(content: impl Into<String>) -> Self {
        LlmResponse {
            content: content.into(),
        }
    }
}

/// Request/response text generation. No streaming.
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate_response(&self, prompt: &str) -> ServiceResult<LlmResponse>;

    /// Generate with an output token budget.
    ///
    /// Backends without budget support fall back to `generate_response`.
    async fn generate_with_limit(
        &self,
        prompt: &str,
        _max_tokens: usize,
    ) -> ServiceResult<LlmResponse> {
        self.generate_response(prompt).await
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Read-only view of an agent's memory. Writes happen upstream.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Conversational messages, oldest first.
    async fn get_messages(&self) -> ServiceResult<Vec<MemoryRecord>>;

    /// Every stored record, oldest first.
    async fn get_all(&self) -> ServiceResult<Vec<MemoryRecord>>;
}
