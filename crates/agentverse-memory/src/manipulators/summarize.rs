//! One-shot bounded summary of recent memories.

use std::sync::Arc;

use agentverse_state::{LlmService, MemoryStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ManipulationError, Result, ValidationError, ValidationResult};
use crate::manipulator::{ManipulationResult, Manipulator};
use crate::manipulators::simple::most_recent;

const NAME: &str = "summarize";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizeConfig {
    pub context_size: usize,
    /// Target summary length in characters
    pub max_length: usize,
}

impl Default for SummarizeConfig {
    fn default() -> Self {
        SummarizeConfig {
            context_size: 10,
            max_length: 200,
        }
    }
}

impl SummarizeConfig {
    pub fn validate(&self) -> ValidationResult<()> {
        if self.context_size == 0 || self.max_length == 0 {
            return Err(ValidationError::InvalidOptions {
                manipulator: NAME.to_string(),
                reason: "context_size and max_length must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

pub struct SummarizeManipulator {
    config: SummarizeConfig,
    store: Arc<dyn MemoryStore>,
    llm: Option<Arc<dyn LlmService>>,
}

impl SummarizeManipulator {
    pub fn new(
        config: SummarizeConfig,
        store: Arc<dyn MemoryStore>,
        llm: Option<Arc<dyn LlmService>>,
    ) -> ValidationResult<Self> {
        config.validate()?;
        Ok(SummarizeManipulator { config, store, llm })
    }
}

const ELLIPSIS: &str = "...";

/// Fit `text` into `max_chars` characters. When anything is cut the result
/// ends with `...`, which counts towards the budget.
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let marker = ELLIPSIS.len().min(max_chars);
    let kept: String = text.chars().take(max_chars - marker).collect();
    format!("{kept}{}", &ELLIPSIS[..marker])
}

#[async_trait]
impl Manipulator for SummarizeManipulator {
    fn name(&self) -> &str {
        NAME
    }

    async fn manipulate(&mut self, _context: Option<&str>) -> Result<ManipulationResult> {
        let memories = self
            .store
            .get_all()
            .await
            .map_err(|e| ManipulationError::service(NAME, e))?;
        let recent = most_recent(memories, self.config.context_size);
        if recent.is_empty() {
            return Ok(ManipulationResult::empty(NAME));
        }

        let combined = recent
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let (summary, method) = match &self.llm {
            Some(llm) => {
                let prompt = format!(
                    "Please summarize the following conversation in {} characters or less:\n\n{combined}",
                    self.config.max_length
                );
                let response = llm
                    .generate_response(&prompt)
                    .await
                    .map_err(|e| ManipulationError::service(NAME, e))?;
                (truncate(response.content.trim(), self.config.max_length), "llm")
            }
            None => (truncate(&combined, self.config.max_length), "truncation"),
        };

        Ok(ManipulationResult::new(summary.clone())
            .with_metadata("manipulator", NAME)
            .with_metadata("context_size", recent.len())
            .with_metadata("summary_length", summary.chars().count())
            .with_metadata("summarization_method", method)
            .with_metadata("empty", false))
    }
}
