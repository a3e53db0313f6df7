//! Filter composition and fail-open behaviour.

use std::sync::Arc;

use agentverse_memory::{
    FilterCriteria, FilterManipulator, Manipulator, ManipulatorRegistry, ManipulatorSpec, Services,
};
use agentverse_state::fakes::{FailingEmbeddings, InMemoryStore, KeywordEmbeddings};
use agentverse_state::{EmbeddingService, MemoryRecord, MemoryStore};
use chrono::{Duration, Utc};
use serde_json::json;

fn sample_memories() -> Vec<MemoryRecord> {
    vec![
        MemoryRecord::new("I ate breakfast"),
        MemoryRecord::new("My startup failed today"),
        MemoryRecord::new("Walked the dog in the park"),
    ]
}

fn corpus() -> Vec<MemoryRecord> {
    let now = Utc::now();
    [
        ("Deployed the new release to production", 1),
        ("Lunch with the team at noon", 30),
        ("Production outage traced to a bad config", 3),
        ("ok", 2),
        ("Read an article about Rust async runtimes", 90),
        ("Reviewed the release checklist twice", 5),
    ]
    .into_iter()
    .map(|(text, minutes)| MemoryRecord::new(text).at(now - Duration::minutes(minutes)))
    .collect()
}

fn is_subsequence(output: &[MemoryRecord], input: &[MemoryRecord]) -> bool {
    let mut it = input.iter();
    output.iter().all(|o| it.any(|i| i == o))
}

fn store_of(records: Vec<MemoryRecord>) -> Arc<dyn MemoryStore> {
    Arc::new(InMemoryStore::with_records(records))
}

#[tokio::test]
async fn startup_topic_keeps_exactly_one_memory() {
    let mut filter = FilterManipulator::new(
        FilterCriteria::default().with_topics(["startup"]),
        store_of(sample_memories()),
        None,
    )
    .unwrap();

    let result = filter.manipulate(None).await.unwrap();
    assert_eq!(result.content, "My startup failed today");
    assert_eq!(result.metadata["kept_count"], 1);
    assert_eq!(result.metadata["input_count"], 3);
}

#[tokio::test]
async fn every_criteria_combination_yields_a_subsequence() {
    let embeddings: Arc<dyn EmbeddingService> = Arc::new(KeywordEmbeddings::new());
    let criteria = vec![
        FilterCriteria::default(),
        FilterCriteria::default().with_topics(["release", "production"]),
        FilterCriteria::default().with_recency_window(600),
        FilterCriteria::default().with_length_bounds(10, 40),
        FilterCriteria::default()
            .exclude_pattern("(?i)lunch")
            .include_pattern("^[A-Z]"),
        FilterCriteria::default()
            .with_topics(["release"])
            .with_relevance(0.05),
        FilterCriteria::default()
            .with_recency_window(3600)
            .with_length_bounds(3, 0)
            .exclude_pattern("outage"),
    ];

    let input = corpus();
    for c in criteria {
        let filter =
            FilterManipulator::new(c.clone(), store_of(Vec::new()), Some(embeddings.clone()))
                .unwrap();
        let out = filter
            .filter(input.clone(), Some("production release"))
            .await;
        assert!(out.memories.len() <= input.len(), "criteria {c:?}");
        assert!(is_subsequence(&out.memories, &input), "criteria {c:?}");
    }
}

#[tokio::test]
async fn passes_compose_in_order() {
    let filter = FilterManipulator::new(
        FilterCriteria::default()
            .with_recency_window(600)
            .with_topics(["release"]),
        store_of(Vec::new()),
        None,
    )
    .unwrap();
    let out = filter.filter(corpus(), None).await;
    let contents: Vec<_> = out.memories.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(
        contents,
        vec![
            "Deployed the new release to production",
            "Reviewed the release checklist twice"
        ]
    );
}

#[tokio::test]
async fn embedding_failure_returns_input_unchanged() {
    let embeddings: Arc<dyn EmbeddingService> = Arc::new(FailingEmbeddings::new());
    let mut filter = FilterManipulator::new(
        FilterCriteria::default().with_relevance(0.9),
        store_of(corpus()),
        Some(embeddings),
    )
    .unwrap();

    let input = corpus();
    let out = filter.filter(input.clone(), Some("anything")).await;
    assert!(out.relevance_fail_open);
    assert_eq!(out.memories, input);

    let result = filter.manipulate(Some("anything")).await.unwrap();
    assert_eq!(result.metadata["relevance_fail_open"], true);
    assert_eq!(result.metadata["kept_count"], 6);
}

#[tokio::test]
async fn relevance_uses_existing_embeddings() {
    let embeddings = Arc::new(KeywordEmbeddings::new());
    let memories = vec![
        MemoryRecord::new("pre-embedded")
            .with_embedding(KeywordEmbeddings::vector_for("rust compiler")),
        MemoryRecord::new("gardening tips for spring"),
    ];
    let filter = FilterManipulator::new(
        FilterCriteria::default().with_relevance(0.5),
        store_of(Vec::new()),
        Some(embeddings.clone() as Arc<dyn EmbeddingService>),
    )
    .unwrap();

    let out = filter.filter(memories, Some("rust compiler")).await;
    assert_eq!(out.memories.len(), 1);
    assert_eq!(out.memories[0].content, "pre-embedded");
    // Context plus the one memory lacking a vector.
    assert_eq!(embeddings.requests(), 2);
}

#[tokio::test]
async fn no_context_skips_relevance() {
    let embeddings = Arc::new(KeywordEmbeddings::new());
    let filter = FilterManipulator::new(
        FilterCriteria::default().with_relevance(0.99),
        store_of(Vec::new()),
        Some(embeddings.clone() as Arc<dyn EmbeddingService>),
    )
    .unwrap();

    let out = filter.filter(sample_memories(), None).await;
    assert_eq!(out.memories.len(), 3);
    assert_eq!(embeddings.requests(), 0);
}

#[tokio::test]
async fn configured_recency_window_beyond_calendar_keeps_all() {
    let registry = ManipulatorRegistry::with_builtins();
    let services = Services::new(store_of(corpus()));

    for secs in [10_000_000_000_000u64, u64::MAX] {
        let spec = ManipulatorSpec::new("filter").with_options(json!({ "recency_window_secs": secs }));
        let mut filter = registry.build(&spec, &services).unwrap();
        let result = filter.manipulate(None).await.unwrap();
        assert_eq!(result.metadata["kept_count"], 6, "window {secs}");
    }
}
