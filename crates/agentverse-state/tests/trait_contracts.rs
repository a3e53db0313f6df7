//! Trait contract tests for EmbeddingService, LlmService, and MemoryStore.
//!
//! These tests verify the behavioral contracts of the collaborator traits
//! using in-memory fakes. Any conforming implementation must pass these.

use std::sync::Arc;

use agentverse_state::fakes::{
    FailingEmbeddings, FailingLlm, InMemoryStore, KeywordEmbeddings, ScriptedLlm,
};
use agentverse_state::service_traits::*;
use agentverse_state::{MemoryRecord, ServiceError};
use chrono::{Duration, Utc};

// ===========================================================================
// EmbeddingService contract tests
// ===========================================================================

#[tokio::test]
async fn embeddings_one_vector_per_input_in_order() {
    let svc = KeywordEmbeddings::new();
    let texts = vec![
        "the cat sat".to_string(),
        "stock market crash".to_string(),
        "the cat sat".to_string(),
    ];
    let vectors = svc.get_embeddings(&texts).await.unwrap();

    assert_eq!(vectors.len(), texts.len());
    assert_eq!(vectors[0], vectors[2]);
    assert_ne!(vectors[0], vectors[1]);
}

#[tokio::test]
async fn embeddings_single_matches_batch() {
    let svc = KeywordEmbeddings::new();
    let single = svc.get_embedding("rust memory pipeline").await.unwrap();
    let batch = svc
        .get_embeddings(&["rust memory pipeline".to_string()])
        .await
        .unwrap();

    assert_eq!(single, batch[0]);
    assert_eq!(svc.requests(), 2);
}

#[tokio::test]
async fn embeddings_empty_batch_is_empty() {
    let svc = KeywordEmbeddings::new();
    assert!(svc.get_embeddings(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn embeddings_failure_is_embedding_error() {
    let svc = FailingEmbeddings::new();
    let err = svc.get_embedding("anything").await.unwrap_err();

    assert!(matches!(err, ServiceError::Embedding { .. }));
}

// ===========================================================================
// LlmService contract tests
// ===========================================================================

#[tokio::test]
async fn llm_rules_take_precedence_over_defaults() {
    let llm = ScriptedLlm::new(["default"]).with_rule("poignancy", "8");

    let rated = llm
        .generate_response("rate the likely poignancy of: lunch")
        .await
        .unwrap();
    let other = llm.generate_response("say hi").await.unwrap();

    assert_eq!(rated.content, "8");
    assert_eq!(other.content, "default");
    assert_eq!(llm.call_count(), 2);
    assert_eq!(llm.calls_containing("poignancy"), 1);
}

#[tokio::test]
async fn llm_defaults_cycle() {
    let llm = ScriptedLlm::new(["a", "b"]);
    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(llm.generate_response("x").await.unwrap().content);
    }
    assert_eq!(seen, vec!["a", "b", "a"]);
}

#[tokio::test]
async fn llm_generate_with_limit_defaults_to_generate_response() {
    let llm = ScriptedLlm::new(["bounded"]);
    let response = llm.generate_with_limit("summarize", 16).await.unwrap();

    assert_eq!(response.content, "bounded");
    assert_eq!(llm.calls(), vec!["summarize".to_string()]);
}

#[tokio::test]
async fn llm_failure_is_llm_error() {
    let llm = FailingLlm::new();
    let err = llm.generate_response("hello").await.unwrap_err();

    assert!(matches!(err, ServiceError::Llm { .. }));
    assert_eq!(llm.attempts(), 1);
}

#[tokio::test]
async fn llm_usable_as_trait_object() {
    let llm: Arc<dyn LlmService> = Arc::new(ScriptedLlm::new(["ok"]));
    assert_eq!(llm.generate_response("ping").await.unwrap().content, "ok");
}

// ===========================================================================
// MemoryStore contract tests
// ===========================================================================

#[tokio::test]
async fn store_preserves_insertion_order() {
    let base = Utc::now();
    let store = InMemoryStore::new();
    store.push(MemoryRecord::new("first").at(base));
    store.push(MemoryRecord::new("second").at(base + Duration::seconds(1)));

    let all = store.get_all().await.unwrap();
    let contents: Vec<_> = all.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second"]);
}

#[tokio::test]
async fn store_messages_are_subset_of_all() {
    let store = InMemoryStore::with_records(vec![
        MemoryRecord::new("hello"),
        MemoryRecord::new("a reflection").with_metadata("type", "reflection"),
        MemoryRecord::new("explicit").with_metadata("type", "message"),
    ]);

    let all = store.get_all().await.unwrap();
    let messages = store.get_messages().await.unwrap();

    assert_eq!(all.len(), 3);
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| all.contains(m)));
}

#[tokio::test]
async fn store_empty_returns_empty() {
    let store = InMemoryStore::new();
    assert!(store.is_empty());
    assert!(store.get_messages().await.unwrap().is_empty());
    assert!(store.get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn store_clear_removes_everything() {
    let store = InMemoryStore::with_records(vec![MemoryRecord::new("x")]);
    store.clear();
    assert_eq!(store.len(), 0);
}
