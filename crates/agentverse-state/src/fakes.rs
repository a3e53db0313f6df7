//! In-memory fakes for collaborator traits (testing only)
//!
//! Provides `ScriptedLlm`, `FailingLlm`, `KeywordEmbeddings`,
//! `FailingEmbeddings` and `InMemoryStore` that satisfy the trait contracts
//! without any network access.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::record::MemoryRecord;
use crate::service_traits::*;

// ---------------------------------------------------------------------------
// ScriptedLlm
// ---------------------------------------------------------------------------

/// LLM fake that answers from a script.
///
/// Rules (`needle → response`) are checked in insertion order against the
/// prompt; the first rule whose needle occurs in the prompt wins. Otherwise
/// the default responses are cycled. Every prompt is recorded.
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    rules: Vec<(String, String)>,
    responses: Vec<String>,
    cursor: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedLlm {
            responses: responses.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Answer `response` whenever the prompt contains `needle`.
    pub fn with_rule(mut self, needle: &str, response: &str) -> Self {
        self.rules.push((needle.to_string(), response.to_string()));
        self
    }

    /// All prompts received so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Number of prompts that contained `needle`.
    pub fn calls_containing(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(needle))
            .count()
    }
}

#[async_trait]
impl LlmService for ScriptedLlm {
    async fn generate_response(&self, prompt: &str) -> ServiceResult<LlmResponse> {
        self.calls.lock().unwrap().push(prompt.to_string());

        if let Some((_, response)) = self.rules.iter().find(|(n, _)| prompt.contains(n.as_str())) {
            return Ok(LlmResponse::new(response.clone()));
        }
        if self.responses.is_empty() {
            return Ok(LlmResponse::new(""));
        }
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst) % self.responses.len();
        Ok(LlmResponse::new(self.responses[idx].clone()))
    }
}

// ---------------------------------------------------------------------------
// FailingLlm
// ---------------------------------------------------------------------------

/// LLM fake whose every call fails with `ServiceError::Llm`.
#[derive(Debug, Default)]
pub struct FailingLlm {
    attempts: AtomicUsize,
}

impl FailingLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmService for FailingLlm {
    async fn generate_response(&self, _prompt: &str) -> ServiceResult<LlmResponse> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ServiceError::llm("scripted failure"))
    }
}

// ---------------------------------------------------------------------------
// KeywordEmbeddings
// ---------------------------------------------------------------------------

const KEYWORD_DIMENSIONS: usize = 64;

/// Deterministic bag-of-words embeddings.
///
/// Each lowercase alphanumeric token is hashed (FNV-1a) into one of 64
/// buckets, so texts sharing words have positive cosine similarity and texts
/// with disjoint vocabularies are (almost always) orthogonal.
#[derive(Debug, Default)]
pub struct KeywordEmbeddings {
    requests: AtomicUsize,
}

impl KeywordEmbeddings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of texts embedded so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Vector for `text` without touching the request counter.
    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; KEYWORD_DIMENSIONS];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = fnv1a(&token.to_lowercase()) as usize % KEYWORD_DIMENSIONS;
            v[bucket] += 1.0;
        }
        v
    }
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in s.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[async_trait]
impl EmbeddingService for KeywordEmbeddings {
    async fn get_embedding(&self, text: &str) -> ServiceResult<Vec<f32>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vector_for(text))
    }

    async fn get_embeddings(&self, texts: &[String]) -> ServiceResult<Vec<Vec<f32>>> {
        self.requests.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }
}

// ---------------------------------------------------------------------------
// FailingEmbeddings
// ---------------------------------------------------------------------------

/// Embedding fake whose every call fails with `ServiceError::Embedding`.
#[derive(Debug, Default)]
pub struct FailingEmbeddings;

impl FailingEmbeddings {
    pub fn new() -> Self {
        FailingEmbeddings
    }
}

#[async_trait]
impl EmbeddingService for FailingEmbeddings {
    async fn get_embedding(&self, _text: &str) -> ServiceResult<Vec<f32>> {
        Err(ServiceError::embedding("embedding backend unavailable"))
    }

    async fn get_embeddings(&self, _texts: &[String]) -> ServiceResult<Vec<Vec<f32>>> {
        Err(ServiceError::embedding("embedding backend unavailable"))
    }
}

// ---------------------------------------------------------------------------
// InMemoryStore
// ---------------------------------------------------------------------------

/// In-memory store backed by a `Vec<MemoryRecord>`.
///
/// Only records for which [`MemoryRecord::is_message`] holds are returned by
/// `get_messages`; everything is visible via `get_all`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: Mutex<Vec<MemoryRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<MemoryRecord>) -> Self {
        InMemoryStore {
            records: Mutex::new(records),
        }
    }

    /// Append a record (upstream ingestion).
    pub fn push(&self, record: MemoryRecord) {
        self.records.lock().unwrap().push(record);
    }

    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn get_messages(&self) -> ServiceResult<Vec<MemoryRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records.iter().filter(|r| r.is_message()).cloned().collect())
    }

    async fn get_all(&self) -> ServiceResult<Vec<MemoryRecord>> {
        Ok(self.records.lock().unwrap().clone())
    }
}
