//! Reflection cycle tests: memoized scoring, threshold doubling and
//! abandon-safety of `process`.

use std::sync::Arc;

use agentverse_memory::{
    CycleManipulator, Manipulator, ReflectionConfig, ReflectionManipulator, ReflectionPhase,
};
use agentverse_state::fakes::{InMemoryStore, KeywordEmbeddings, ScriptedLlm};
use agentverse_state::{LlmResponse, LlmService, MemoryRecord, ServiceError, ServiceResult};
use async_trait::async_trait;
use chrono::{Duration, Utc};

fn reflection(
    llm: Arc<dyn LlmService>,
    store: Arc<InMemoryStore>,
    threshold: f64,
) -> ReflectionManipulator {
    ReflectionManipulator::new(
        ReflectionConfig::default().with_threshold(threshold),
        llm,
        Arc::new(KeywordEmbeddings::new()),
        store,
    )
    .unwrap()
}

fn always_poignant() -> Arc<ScriptedLlm> {
    Arc::new(
        ScriptedLlm::new(["The agent cares about its events."])
            .with_rule("poignancy", "10")
            .with_rule("salient", "1. What happened?\n2. Why does it matter?"),
    )
}

/// Fails only when asked to synthesize insights.
struct InsightFailingLlm {
    inner: ScriptedLlm,
}

#[async_trait]
impl LlmService for InsightFailingLlm {
    async fn generate_response(&self, prompt: &str) -> ServiceResult<LlmResponse> {
        if prompt.contains("high-level insights") {
            return Err(ServiceError::llm("insight backend down"));
        }
        self.inner.generate_response(prompt).await
    }
}

#[tokio::test]
async fn scoring_same_content_twice_issues_one_call() {
    let llm = Arc::new(ScriptedLlm::new(["4"]));
    let store = Arc::new(InMemoryStore::with_records(vec![
        MemoryRecord::new("repeated line"),
        MemoryRecord::new("repeated line"),
    ]));
    let mut reflection = reflection(llm.clone(), store, 10.0);

    reflection.should_run().await.unwrap();
    reflection.should_run().await.unwrap();

    assert_eq!(llm.calls_containing("poignancy"), 1);
    // Both messages count towards the sum.
    assert!((reflection.state().accumulated_importance - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn threshold_triggers_on_third_message() {
    let llm = Arc::new(
        ScriptedLlm::new(["0"])
            .with_rule("alpha", "3")
            .with_rule("beta", "3")
            .with_rule("gamma", "5"),
    );
    let store = Arc::new(InMemoryStore::new());
    let mut reflection = reflection(llm, store.clone(), 1.0);

    store.push(MemoryRecord::new("alpha note"));
    assert!(!reflection.should_run().await.unwrap());
    store.push(MemoryRecord::new("beta note"));
    assert!(!reflection.should_run().await.unwrap());
    assert!((reflection.state().accumulated_importance - 0.6).abs() < 1e-9);
    assert_eq!(reflection.phase(), ReflectionPhase::Idle);

    store.push(MemoryRecord::new("gamma note"));
    assert!(reflection.should_run().await.unwrap());
    assert!((reflection.state().accumulated_importance - 1.1).abs() < 1e-9);
    assert_eq!(reflection.phase(), ReflectionPhase::ShouldRunCheck);
}

#[tokio::test]
async fn threshold_doubles_each_cycle() {
    let llm = always_poignant();
    let store = Arc::new(InMemoryStore::new());
    let mut reflection = reflection(llm, store.clone(), 1.0);

    let mut next = 0;
    for cycle in 1..=3u32 {
        // Each message scores 1.0, so the current threshold's worth of new
        // messages is exactly enough to trigger.
        let needed = reflection.state().importance_threshold as usize;
        for _ in 0..needed {
            store.push(MemoryRecord::new(format!("event number {next}")));
            next += 1;
        }

        let result = reflection.manipulate(None).await.unwrap();
        assert!(!result.is_empty());
        assert_eq!(reflection.state().cycles, cycle);
        assert_eq!(
            reflection.state().importance_threshold,
            2f64.powi(cycle as i32)
        );
        assert_eq!(reflection.state().accumulated_importance, 0.0);
    }
}

#[tokio::test]
async fn result_reports_insights_after_cycle() {
    let store = Arc::new(InMemoryStore::with_records(vec![MemoryRecord::new(
        "My startup failed today",
    )]));
    let mut reflection = reflection(always_poignant(), store, 1.0);

    let out = reflection.manipulate(None).await.unwrap();
    let result = reflection.result().unwrap();

    assert_eq!(result["type"], "reflection");
    assert_eq!(result["importance_threshold"], 2.0);
    assert_eq!(out.content, "The agent cares about its events.");
    assert_eq!(out.metadata["manipulator"], "reflection");
}

#[tokio::test]
async fn failed_process_leaves_state_untouched() {
    let llm = Arc::new(InsightFailingLlm {
        inner: ScriptedLlm::new(["unused"])
            .with_rule("poignancy", "10")
            .with_rule("salient", "What happened?"),
    });
    let store = Arc::new(InMemoryStore::with_records(vec![MemoryRecord::new(
        "the server caught fire",
    )]));
    let mut reflection = reflection(llm, store, 1.0);

    assert!(reflection.should_run().await.unwrap());
    let before = reflection.state().clone();

    assert!(reflection.process().await.is_err());
    assert_eq!(reflection.state(), &before);
    assert_eq!(reflection.phase(), ReflectionPhase::Idle);

    // Retrying still sees the same pending importance.
    assert!(reflection.should_run().await.unwrap());
}

#[tokio::test]
async fn reflected_messages_stop_counting() {
    let store = Arc::new(InMemoryStore::with_records(vec![MemoryRecord::new(
        "first big event",
    )]));
    let mut reflection = reflection(always_poignant(), store.clone(), 1.0);
    reflection.manipulate(None).await.unwrap();

    // Old message is reflected; one new message (1.0) is below the doubled threshold.
    store.push(MemoryRecord::new("second big event"));
    assert!(!reflection.should_run().await.unwrap());
    assert!((reflection.state().accumulated_importance - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn messages_arriving_mid_cycle_stay_pending() {
    let store = Arc::new(InMemoryStore::with_records(vec![MemoryRecord::new(
        "first big event",
    )]));
    let mut reflection = reflection(always_poignant(), store.clone(), 1.0);
    assert!(reflection.should_run().await.unwrap());

    store.push(MemoryRecord::new("late big event"));
    reflection.process().await.unwrap();

    assert!(reflection.state().reflected.contains("first big event"));
    assert!(!reflection.state().reflected.contains("late big event"));
    assert!(reflection.state().counted.is_empty());

    assert!(!reflection.should_run().await.unwrap());
    assert!((reflection.state().accumulated_importance - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn immediacy_weighting_retrieves_urgent_memories() {
    // Old but urgent memory vs. recent mundane one; both equally relevant and
    // equally unimportant, so only the fast-decay immediacy term separates them.
    let now = Utc::now();
    let store = Arc::new(InMemoryStore::with_records(vec![
        MemoryRecord::new("alarm ringing loudly").at(now - Duration::hours(2)),
        MemoryRecord::new("alarm clock purchased").at(now - Duration::hours(1)),
    ]));
    let llm = Arc::new(
        ScriptedLlm::new(["insight"])
            .with_rule("poignancy", "1")
            .with_rule("immediacy of: alarm ringing", "10")
            .with_rule("immediacy of", "1")
            .with_rule("salient", "alarm"),
    );
    let config = ReflectionConfig {
        k: 1,
        ..ReflectionConfig::default().with_threshold(0.2).with_immediacy()
    };
    let mut reflection = ReflectionManipulator::new(
        config,
        llm.clone(),
        Arc::new(KeywordEmbeddings::new()),
        store,
    )
    .unwrap();

    assert_eq!(
        reflection.immediacy("alarm ringing loudly").await.unwrap(),
        1.0
    );
    reflection.manipulate(None).await.unwrap();

    let insight_prompt = llm
        .calls()
        .into_iter()
        .find(|p| p.contains("high-level insights"))
        .unwrap();
    assert!(insight_prompt.contains("alarm ringing loudly"));
    assert!(!insight_prompt.contains("alarm clock purchased"));
}
