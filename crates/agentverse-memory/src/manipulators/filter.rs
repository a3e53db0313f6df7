//! Criteria-based memory filtering.
//!
//! Passes run cheapest first so the embedding batch in the relevance pass
//! only covers survivors:
//! recency → type → topic → length → exclude patterns → include patterns → relevance.

use std::sync::Arc;
use std::time::Instant;

use agentverse_state::{EmbeddingService, MemoryRecord, MemoryStore, ServiceError};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ManipulationError, Result, ValidationError, ValidationResult};
use crate::manipulator::{ManipulationResult, Manipulator};
use crate::obs;
use crate::scoring::cosine_similarity;

/// What a memory must satisfy to survive the filter.
///
/// Zero / empty values disable the corresponding pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    /// Minimum cosine similarity to the context (0 disables)
    pub relevance: f64,
    /// Only keep memories newer than this many seconds
    pub recency_window_secs: Option<u64>,
    /// Keep memories mentioning any of these topics
    pub topics: Vec<String>,
    pub case_sensitive: bool,
    /// Length bounds in characters (0 = unbounded)
    pub min_length: usize,
    pub max_length: usize,
    /// Each pattern keeps only matching memories
    pub include_patterns: Vec<String>,
    /// Each pattern removes matching memories
    pub exclude_patterns: Vec<String>,
    /// Keep only these `metadata.type` values
    pub include_types: Vec<String>,
    /// Drop these `metadata.type` values
    pub exclude_types: Vec<String>,
    /// Keep input order (otherwise most relevant first)
    pub preserve_order: bool,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        FilterCriteria {
            relevance: 0.0,
            recency_window_secs: None,
            topics: Vec::new(),
            case_sensitive: false,
            min_length: 0,
            max_length: 0,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            include_types: Vec::new(),
            exclude_types: Vec::new(),
            preserve_order: true,
        }
    }
}

impl FilterCriteria {
    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_relevance(mut self, floor: f64) -> Self {
        self.relevance = floor;
        self
    }

    pub fn with_recency_window(mut self, secs: u64) -> Self {
        self.recency_window_secs = Some(secs);
        self
    }

    pub fn with_length_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn include_pattern(mut self, pattern: &str) -> Self {
        self.include_patterns.push(pattern.to_string());
        self
    }

    pub fn exclude_pattern(mut self, pattern: &str) -> Self {
        self.exclude_patterns.push(pattern.to_string());
        self
    }

    pub fn ranked(mut self) -> Self {
        self.preserve_order = false;
        self
    }

    pub fn validate(&self) -> ValidationResult<()> {
        if !(0.0..=1.0).contains(&self.relevance) {
            return Err(ValidationError::out_of_range(
                "relevance",
                self.relevance,
                "[0, 1]",
            ));
        }
        if self.max_length > 0 && self.min_length > self.max_length {
            return Err(ValidationError::InvalidOptions {
                manipulator: "filter".to_string(),
                reason: format!(
                    "min_length ({}) exceeds max_length ({})",
                    self.min_length, self.max_length
                ),
            });
        }
        Ok(())
    }
}

/// Oldest timestamp kept by a recency window, or `None` when unbounded.
fn recency_cutoff(now: DateTime<Utc>, window_secs: u64) -> Option<DateTime<Utc>> {
    i64::try_from(window_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|window| now.checked_sub_signed(window))
}

/// Memories that survived filtering plus pass diagnostics.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub memories: Vec<MemoryRecord>,
    /// Relevance pass was skipped because embedding failed
    pub relevance_fail_open: bool,
}

/// Filter manipulator.
pub struct FilterManipulator {
    criteria: FilterCriteria,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    skipped_patterns: usize,
    store: Arc<dyn MemoryStore>,
    embeddings: Option<Arc<dyn EmbeddingService>>,
}

impl FilterManipulator {
    /// Build a filter. Malformed regexes are logged and skipped.
    pub fn new(
        criteria: FilterCriteria,
        store: Arc<dyn MemoryStore>,
        embeddings: Option<Arc<dyn EmbeddingService>>,
    ) -> ValidationResult<Self> {
        criteria.validate()?;
        if criteria.relevance > 0.0 && embeddings.is_none() {
            return Err(ValidationError::MissingService {
                manipulator: "filter".to_string(),
                service: "embeddings",
            });
        }

        let mut skipped_patterns = 0;
        let mut compile = |patterns: &[String]| -> Vec<Regex> {
            let mut compiled = Vec::new();
            for pattern in patterns {
                match Regex::new(pattern) {
                    Ok(re) => compiled.push(re),
                    Err(e) => {
                        warn!(pattern = %pattern, error = %e, "Skipping malformed filter pattern");
                        skipped_patterns += 1;
                    }
                }
            }
            compiled
        };
        let include = compile(&criteria.include_patterns);
        let exclude = compile(&criteria.exclude_patterns);

        Ok(FilterManipulator {
            criteria,
            include,
            exclude,
            skipped_patterns,
            store,
            embeddings,
        })
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// Number of patterns dropped at construction because they failed to compile.
    pub fn skipped_patterns(&self) -> usize {
        self.skipped_patterns
    }

    /// Filter `memories` against `context` as of `now`.
    ///
    /// The output is always a subsequence of the input (reordered only when
    /// `preserve_order` is off and the relevance pass ran).
    pub async fn filter_at(
        &self,
        memories: Vec<MemoryRecord>,
        context: Option<&str>,
        now: DateTime<Utc>,
    ) -> FilterOutcome {
        let c = &self.criteria;
        let mut kept = memories;

        // A window reaching past the representable range keeps everything.
        if let Some(cutoff) = c.recency_window_secs.and_then(|secs| recency_cutoff(now, secs)) {
            kept.retain(|m| m.timestamp >= cutoff);
        }

        if !c.include_types.is_empty() || !c.exclude_types.is_empty() {
            kept.retain(|m| {
                let kind = m
                    .metadata
                    .get("type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("message");
                (c.include_types.is_empty() || c.include_types.iter().any(|t| t == kind))
                    && !c.exclude_types.iter().any(|t| t == kind)
            });
        }

        if !c.topics.is_empty() {
            kept.retain(|m| self.mentions_topic(&m.content));
        }

        if c.min_length > 0 || c.max_length > 0 {
            kept.retain(|m| {
                let len = m.char_len();
                len >= c.min_length && (c.max_length == 0 || len <= c.max_length)
            });
        }

        for re in &self.exclude {
            kept.retain(|m| !re.is_match(&m.content));
        }
        for re in &self.include {
            kept.retain(|m| re.is_match(&m.content));
        }

        let mut outcome = FilterOutcome {
            memories: kept,
            relevance_fail_open: false,
        };
        if let (Some(context), true) = (context, c.relevance > 0.0) {
            if !outcome.memories.is_empty() {
                match self.relevance_pass(&outcome.memories, context).await {
                    Ok(memories) => outcome.memories = memories,
                    Err(e) => {
                        obs::emit_filter_fail_open("filter", &e);
                        outcome.relevance_fail_open = true;
                    }
                }
            }
        }
        outcome
    }

    /// Filter as of the current time.
    pub async fn filter(&self, memories: Vec<MemoryRecord>, context: Option<&str>) -> FilterOutcome {
        self.filter_at(memories, context, Utc::now()).await
    }

    fn mentions_topic(&self, content: &str) -> bool {
        if self.criteria.case_sensitive {
            self.criteria.topics.iter().any(|t| content.contains(t.as_str()))
        } else {
            let lowered = content.to_lowercase();
            self.criteria
                .topics
                .iter()
                .any(|t| lowered.contains(&t.to_lowercase()))
        }
    }

    async fn relevance_pass(
        &self,
        memories: &[MemoryRecord],
        context: &str,
    ) -> std::result::Result<Vec<MemoryRecord>, ServiceError> {
        let embeddings = self
            .embeddings
            .as_ref()
            .ok_or_else(|| ServiceError::embedding("no embedding service configured"))?;

        let query = embeddings.get_embedding(context).await?;

        let missing: Vec<String> = memories
            .iter()
            .filter(|m| m.embedding.is_none())
            .map(|m| m.content.clone())
            .collect();
        let mut fetched = if missing.is_empty() {
            Vec::new()
        } else {
            embeddings.get_embeddings(&missing).await?
        };
        if fetched.len() != missing.len() {
            return Err(ServiceError::embedding(format!(
                "expected {} vectors, got {}",
                missing.len(),
                fetched.len()
            )));
        }
        fetched.reverse();

        let mut scored = Vec::with_capacity(memories.len());
        for memory in memories {
            let similarity = match &memory.embedding {
                Some(v) => cosine_similarity(&query, v),
                None => fetched
                    .pop()
                    .map(|v| cosine_similarity(&query, &v))
                    .unwrap_or(0.0),
            };
            if similarity >= self.criteria.relevance {
                scored.push((similarity, memory.clone()));
            }
        }

        if !self.criteria.preserve_order {
            scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        }
        debug!(kept = scored.len(), total = memories.len(), "Relevance pass finished");
        Ok(scored.into_iter().map(|(_, m)| m).collect())
    }
}

#[async_trait]
impl Manipulator for FilterManipulator {
    fn name(&self) -> &str {
        "filter"
    }

    async fn manipulate(&mut self, context: Option<&str>) -> Result<ManipulationResult> {
        let start = Instant::now();
        let memories = self
            .store
            .get_all()
            .await
            .map_err(|e| ManipulationError::service(self.name(), e))?;
        let input_count = memories.len();

        let outcome = self.filter(memories, context).await;
        let result = if outcome.memories.is_empty() {
            ManipulationResult::empty(self.name())
        } else {
            let content = outcome
                .memories
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            ManipulationResult::new(content)
                .with_metadata("manipulator", self.name())
                .with_metadata("empty", false)
        };

        Ok(result
            .with_metadata("input_count", input_count)
            .with_metadata("kept_count", outcome.memories.len())
            .with_metadata("skipped_patterns", self.skipped_patterns)
            .with_metadata("relevance_fail_open", outcome.relevance_fail_open)
            .with_metadata("duration_ms", start.elapsed().as_millis() as u64))
    }
}
