//! Importance-triggered reflection.
//!
//! Each new message is rated for poignancy once (memoized by content). When
//! the ratings accumulated since the last reflection reach the threshold,
//! the manipulator asks the LLM for salient questions, retrieves supporting
//! memories for each question by `relevance × importance × recency`, and
//! synthesizes insights. The threshold doubles after every cycle.
//!
//! `process` performs every LLM and embedding call before touching
//! [`ReflectionState`]; a failed or abandoned cycle leaves the state as it was.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use agentverse_state::{EmbeddingService, LlmService, MemoryRecord, MemoryStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::{ManipulationError, Result, ValidationError, ValidationResult};
use crate::manipulator::{CycleManipulator, FailurePolicy, ManipulationResult, Manipulator};
use crate::obs;
use crate::scoring::{
    cosine_similarity, parse_score, recency_decay, top_k, FALLBACK_SCORE, FAST_DECAY_RATE,
};

pub const IMPORTANCE_PROMPT: &str = "On the scale of 1 to 10, where 1 is purely mundane \
(e.g., brushing teeth) and 10 is extremely poignant (e.g., a break up), \
rate the likely poignancy of the following memory: ";

pub const IMMEDIACY_PROMPT: &str = "On the scale of 1 to 10, where 1 requires no immediate attention \
and 10 needs quick response, rate the immediacy of: ";

const NAME: &str = "reflection";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionConfig {
    /// Accumulated importance that triggers the first reflection
    pub importance_threshold: f64,
    /// Memories retrieved per question
    pub k: usize,
    /// Hourly decay applied to importance
    pub decay_rate: f64,
    /// Also rate immediacy and use the fast-decay retrieval score
    pub score_immediacy: bool,
    pub max_questions: usize,
    pub max_insights: usize,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        ReflectionConfig {
            importance_threshold: 10.0,
            k: 5,
            decay_rate: crate::scoring::DEFAULT_DECAY_RATE,
            score_immediacy: false,
            max_questions: 3,
            max_insights: 5,
        }
    }
}

impl ReflectionConfig {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.importance_threshold = threshold;
        self
    }

    pub fn with_immediacy(mut self) -> Self {
        self.score_immediacy = true;
        self
    }

    pub fn validate(&self) -> ValidationResult<()> {
        if !(self.importance_threshold > 0.0) {
            return Err(ValidationError::out_of_range(
                "importance_threshold",
                self.importance_threshold,
                "> 0",
            ));
        }
        if !(self.decay_rate > 0.0 && self.decay_rate <= 1.0) {
            return Err(ValidationError::out_of_range(
                "decay_rate",
                self.decay_rate,
                "(0, 1]",
            ));
        }
        if self.k == 0 || self.max_questions == 0 || self.max_insights == 0 {
            return Err(ValidationError::InvalidOptions {
                manipulator: NAME.to_string(),
                reason: "k, max_questions and max_insights must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Mutable reflection bookkeeping, owned by one manipulator instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReflectionState {
    pub memory2importance: HashMap<String, f64>,
    pub memory2immediacy: HashMap<String, f64>,
    pub importance_threshold: f64,
    pub accumulated_importance: f64,
    pub insights: Option<Vec<String>>,
    pub initial_threshold: f64,
    pub cycles: u32,
    /// Contents already folded into a completed reflection
    pub reflected: HashSet<String>,
    /// Contents summed into `accumulated_importance` by the latest check
    pub counted: HashSet<String>,
}

impl ReflectionState {
    fn new(threshold: f64) -> Self {
        ReflectionState {
            memory2importance: HashMap::new(),
            memory2immediacy: HashMap::new(),
            importance_threshold: threshold,
            accumulated_importance: 0.0,
            insights: None,
            initial_threshold: threshold,
            cycles: 0,
            reflected: HashSet::new(),
            counted: HashSet::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionPhase {
    Idle,
    ShouldRunCheck,
    Processing,
}

pub struct ReflectionManipulator {
    config: ReflectionConfig,
    state: ReflectionState,
    phase: ReflectionPhase,
    llm: Arc<dyn LlmService>,
    embeddings: Arc<dyn EmbeddingService>,
    store: Arc<dyn MemoryStore>,
}

impl ReflectionManipulator {
    pub fn new(
        config: ReflectionConfig,
        llm: Arc<dyn LlmService>,
        embeddings: Arc<dyn EmbeddingService>,
        store: Arc<dyn MemoryStore>,
    ) -> ValidationResult<Self> {
        config.validate()?;
        Ok(ReflectionManipulator {
            state: ReflectionState::new(config.importance_threshold),
            config,
            phase: ReflectionPhase::Idle,
            llm,
            embeddings,
            store,
        })
    }

    pub fn config(&self) -> &ReflectionConfig {
        &self.config
    }

    pub fn state(&self) -> &ReflectionState {
        &self.state
    }

    pub fn phase(&self) -> ReflectionPhase {
        self.phase
    }

    /// Importance of `content` in [0, 1]; the LLM is asked at most once per content.
    pub async fn importance(&mut self, content: &str) -> Result<f64> {
        if let Some(score) = self.state.memory2importance.get(content) {
            return Ok(*score);
        }
        let score = self.rate(IMPORTANCE_PROMPT, content).await?;
        self.state
            .memory2importance
            .insert(content.to_string(), score);
        Ok(score)
    }

    /// Immediacy of `content` in [0, 1]; memoized like [`Self::importance`].
    pub async fn immediacy(&mut self, content: &str) -> Result<f64> {
        if let Some(score) = self.state.memory2immediacy.get(content) {
            return Ok(*score);
        }
        let score = self.rate(IMMEDIACY_PROMPT, content).await?;
        self.state
            .memory2immediacy
            .insert(content.to_string(), score);
        Ok(score)
    }

    async fn rate(&self, prompt: &str, content: &str) -> Result<f64> {
        let response = self
            .llm
            .generate_response(&format!("{prompt}{content}"))
            .await
            .map_err(|e| ManipulationError::service(NAME, e))?;
        Ok(parse_score(&response.content).unwrap_or_else(|| {
            warn!(response = %response.content, "Unparseable score, using fallback");
            FALLBACK_SCORE
        }))
    }

    async fn check(&mut self) -> Result<bool> {
        let messages = self
            .store
            .get_messages()
            .await
            .map_err(|e| ManipulationError::service(NAME, e))?;

        let unreflected: Vec<_> = messages
            .iter()
            .filter(|m| !self.state.reflected.contains(&m.content))
            .collect();
        let mut sum = 0.0;
        let mut counted = HashSet::new();
        for message in unreflected {
            sum += self.importance(&message.content).await?;
            if self.config.score_immediacy {
                self.immediacy(&message.content).await?;
            }
            counted.insert(message.content.clone());
        }
        self.state.accumulated_importance = sum;
        self.state.counted = counted;

        let triggered = sum >= self.state.importance_threshold;
        if triggered {
            obs::emit_reflection_triggered(sum, self.state.importance_threshold);
        }
        Ok(triggered)
    }

    /// Run one reflection cycle as of `now`.
    pub async fn process_at(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.phase = ReflectionPhase::Processing;
        let outcome = self.reflect(now).await;
        self.phase = ReflectionPhase::Idle;

        let Some(insights) = outcome? else {
            return Ok(());
        };

        // Only contents counted by the last check become reflected.
        let count = insights.len();
        self.state.insights = Some(insights);
        self.state.importance_threshold *= 2.0;
        let counted = std::mem::take(&mut self.state.counted);
        self.state.reflected.extend(counted);
        self.state.accumulated_importance = 0.0;
        self.state.cycles += 1;
        obs::emit_reflection_committed(self.state.cycles, count, self.state.importance_threshold);
        Ok(())
    }

    /// Produce insights without mutating state.
    async fn reflect(&self, now: DateTime<Utc>) -> Result<Option<Vec<String>>> {
        let messages = self
            .store
            .get_messages()
            .await
            .map_err(|e| ManipulationError::service(NAME, e))?;
        if messages.is_empty() {
            return Ok(None);
        }

        let questions = self.generate_questions(&messages).await?;
        let relevant = if questions.is_empty() {
            debug!("No questions generated, reflecting over recent messages");
            messages.clone()
        } else {
            self.retrieve_relevant(&questions, &messages, now).await?
        };

        let insights = self.generate_insights(&relevant).await?;
        Ok(Some(insights))
    }

    async fn generate_questions(&self, messages: &[MemoryRecord]) -> Result<Vec<String>> {
        let statements = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "{statements}\n\nGiven only the information above, what are the {} most salient \
             high-level questions we can answer about the subjects in the statements? \
             Answer with one question per line.",
            self.config.max_questions
        );
        let response = self
            .llm
            .generate_response(&prompt)
            .await
            .map_err(|e| ManipulationError::service(NAME, e))?;

        let mut questions = parse_lines(&response.content);
        questions.truncate(self.config.max_questions);
        Ok(questions)
    }

    async fn retrieve_relevant(
        &self,
        questions: &[String],
        messages: &[MemoryRecord],
        now: DateTime<Utc>,
    ) -> Result<Vec<MemoryRecord>> {
        let embed_err = |e| ManipulationError::service(NAME, e);

        let query_vectors = self
            .embeddings
            .get_embeddings(questions)
            .await
            .map_err(embed_err)?;

        let missing: Vec<String> = messages
            .iter()
            .filter(|m| m.embedding.is_none())
            .map(|m| m.content.clone())
            .collect();
        let fetched = if missing.is_empty() {
            Vec::new()
        } else {
            self.embeddings
                .get_embeddings(&missing)
                .await
                .map_err(embed_err)?
        };
        if fetched.len() != missing.len() || query_vectors.len() != questions.len() {
            return Err(ManipulationError::InvalidResponse {
                manipulator: NAME.to_string(),
                reason: "embedding count does not match input count".to_string(),
            });
        }

        let mut fetched = fetched.into_iter();
        let memory_vectors: Vec<Vec<f32>> = messages
            .iter()
            .map(|m| match &m.embedding {
                Some(v) => v.clone(),
                None => fetched.next().unwrap_or_default(),
            })
            .collect();

        let mut seen = HashSet::new();
        let mut relevant = Vec::new();
        for query in &query_vectors {
            let scored: Vec<(f64, MemoryRecord)> = messages
                .iter()
                .zip(&memory_vectors)
                .map(|(m, v)| {
                    let relevance = cosine_similarity(query, v);
                    (relevance * self.weight(m, now), m.clone())
                })
                .collect();
            for (_, memory) in top_k(scored, self.config.k) {
                if seen.insert(memory.content.clone()) {
                    relevant.push(memory);
                }
            }
        }
        Ok(relevant)
    }

    /// Importance × recency, or the immediacy-aware maximum when enabled.
    fn weight(&self, memory: &MemoryRecord, now: DateTime<Utc>) -> f64 {
        let importance = self
            .state
            .memory2importance
            .get(&memory.content)
            .copied()
            .or(memory.importance)
            .unwrap_or(FALLBACK_SCORE);
        let slow = recency_decay(memory.timestamp, now, self.config.decay_rate) * importance;
        if !self.config.score_immediacy {
            return slow;
        }
        let immediacy = self
            .state
            .memory2immediacy
            .get(&memory.content)
            .copied()
            .or(memory.immediacy)
            .unwrap_or(FALLBACK_SCORE);
        slow.max(recency_decay(memory.timestamp, now, FAST_DECAY_RATE) * immediacy)
    }

    async fn generate_insights(&self, relevant: &[MemoryRecord]) -> Result<Vec<String>> {
        let statements = relevant
            .iter()
            .enumerate()
            .map(|(i, m)| format!("{}. {}", i + 1, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Statements:\n{statements}\n\nWhat {} high-level insights can you infer from the \
             above statements? Answer with one insight per line.",
            self.config.max_insights
        );
        let response = self
            .llm
            .generate_response(&prompt)
            .await
            .map_err(|e| ManipulationError::service(NAME, e))?;

        let mut insights = parse_lines(&response.content);
        insights.truncate(self.config.max_insights);
        Ok(insights)
    }
}

/// Split an LLM list answer into items, stripping bullets and numbering.
fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            let line = line.trim().trim_start_matches(['-', '*', '•']).trim_start();
            let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
            let rest = &line[digits..];
            if digits > 0 && (rest.starts_with('.') || rest.starts_with(')')) {
                rest[1..].trim().to_string()
            } else {
                line.to_string()
            }
        })
        .filter(|line| !line.is_empty())
        .collect()
}

#[async_trait]
impl Manipulator for ReflectionManipulator {
    fn name(&self) -> &str {
        NAME
    }

    async fn manipulate(&mut self, _context: Option<&str>) -> Result<ManipulationResult> {
        if self.should_run().await? {
            self.process().await?;
        }

        let Some(result) = self.result() else {
            return Ok(ManipulationResult::empty(NAME)
                .with_metadata("accumulated_importance", self.state.accumulated_importance)
                .with_metadata("importance_threshold", self.state.importance_threshold));
        };
        let content = self
            .state
            .insights
            .as_deref()
            .unwrap_or_default()
            .join("\n");
        let mut out = ManipulationResult::new(content).with_metadata("manipulator", NAME);
        out.metadata.extend(result);
        Ok(out.with_metadata("empty", false))
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Propagate
    }

    fn reset(&mut self) {
        self.state = ReflectionState::new(self.state.initial_threshold);
        self.phase = ReflectionPhase::Idle;
    }
}

#[async_trait]
impl CycleManipulator for ReflectionManipulator {
    async fn should_run(&mut self) -> Result<bool> {
        self.phase = ReflectionPhase::ShouldRunCheck;
        let triggered = self.check().await;
        if !matches!(triggered, Ok(true)) {
            self.phase = ReflectionPhase::Idle;
        }
        triggered
    }

    async fn process(&mut self) -> Result<()> {
        self.process_at(Utc::now()).await
    }

    fn result(&self) -> Option<Map<String, Value>> {
        let insights = self.state.insights.as_ref().filter(|i| !i.is_empty())?;
        let mut map = Map::new();
        map.insert("insights".into(), json!(insights));
        map.insert("type".into(), json!("reflection"));
        map.insert(
            "importance_threshold".into(),
            json!(self.state.importance_threshold),
        );
        map.insert(
            "accumulated_importance".into(),
            json!(self.state.accumulated_importance),
        );
        Some(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentverse_state::fakes::{FailingLlm, InMemoryStore, KeywordEmbeddings, ScriptedLlm};

    fn build(
        llm: Arc<dyn LlmService>,
        store: Arc<InMemoryStore>,
        config: ReflectionConfig,
    ) -> ReflectionManipulator {
        ReflectionManipulator::new(config, llm, Arc::new(KeywordEmbeddings::new()), store)
            .unwrap()
    }

    #[test]
    fn test_parse_lines_strips_numbering() {
        let items = parse_lines("1. What matters?\n2) Why?\n\n- Who?\n• When?\nplain");
        assert_eq!(items, vec!["What matters?", "Why?", "Who?", "When?", "plain"]);
    }

    #[test]
    fn test_config_validation() {
        assert!(ReflectionConfig::default().validate().is_ok());
        assert!(ReflectionConfig::default().with_threshold(0.0).validate().is_err());
        let bad_decay = ReflectionConfig {
            decay_rate: 1.5,
            ..ReflectionConfig::default()
        };
        assert!(bad_decay.validate().is_err());
    }

    #[tokio::test]
    async fn test_importance_is_memoized() {
        let llm = Arc::new(ScriptedLlm::new(["7"]));
        let store = Arc::new(InMemoryStore::new());
        let mut reflection = build(llm.clone(), store, ReflectionConfig::default());

        assert_eq!(reflection.importance("lunch").await.unwrap(), 0.7);
        assert_eq!(reflection.importance("lunch").await.unwrap(), 0.7);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_score_falls_back() {
        let llm = Arc::new(ScriptedLlm::new(["quite poignant"]));
        let store = Arc::new(InMemoryStore::new());
        let mut reflection = build(llm, store, ReflectionConfig::default());

        assert_eq!(reflection.importance("x").await.unwrap(), FALLBACK_SCORE);
    }

    #[tokio::test]
    async fn test_llm_failure_propagates_and_leaves_state() {
        let store = Arc::new(InMemoryStore::with_records(vec![MemoryRecord::new("hi")]));
        let mut reflection = build(Arc::new(FailingLlm::new()), store, ReflectionConfig::default());

        assert!(reflection.should_run().await.is_err());
        assert_eq!(reflection.phase(), ReflectionPhase::Idle);
        assert!(reflection.state().memory2importance.is_empty());
    }

    #[tokio::test]
    async fn test_immediacy_scored_when_enabled() {
        let llm = Arc::new(
            ScriptedLlm::new(["5"])
                .with_rule("poignancy", "4")
                .with_rule("immediacy", "9"),
        );
        let store = Arc::new(InMemoryStore::with_records(vec![MemoryRecord::new("fire!")]));
        let mut reflection = build(llm, store, ReflectionConfig::default().with_immediacy());

        assert!(!reflection.should_run().await.unwrap());
        assert_eq!(reflection.state().memory2importance["fire!"], 0.4);
        assert_eq!(reflection.state().memory2immediacy["fire!"], 0.9);
    }

    #[tokio::test]
    async fn test_result_none_before_first_cycle() {
        let store = Arc::new(InMemoryStore::new());
        let reflection = build(Arc::new(ScriptedLlm::new(["1"])), store, ReflectionConfig::default());
        assert!(reflection.result().is_none());
    }

    #[tokio::test]
    async fn test_reset_restores_initial_threshold() {
        let llm = Arc::new(
            ScriptedLlm::new(["insight one"])
                .with_rule("poignancy", "10")
                .with_rule("salient", "What happened?"),
        );
        let store = Arc::new(InMemoryStore::with_records(vec![MemoryRecord::new("big news")]));
        let mut reflection = build(llm, store, ReflectionConfig::default().with_threshold(1.0));

        reflection.manipulate(None).await.unwrap();
        assert_eq!(reflection.state().importance_threshold, 2.0);

        reflection.reset();
        assert_eq!(reflection.state().importance_threshold, 1.0);
        assert_eq!(reflection.state().cycles, 0);
        assert!(reflection.result().is_none());
    }
}
