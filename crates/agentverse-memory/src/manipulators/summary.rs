//! Rolling LLM summary of the conversation.

use std::collections::HashMap;
use std::sync::Arc;

use agentverse_state::{LlmService, MemoryStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{ManipulationError, Result};
use crate::manipulator::{CycleManipulator, FailurePolicy, ManipulationResult, Manipulator};
use crate::template::safe_substitute;

pub const DEFAULT_SUMMARY_TEMPLATE: &str = "Previous summary:
${summary}

New messages:
${new_lines}

Please provide a concise summary incorporating both the previous summary and new messages.
Focus on key points and maintain continuity.
";

const NAME: &str = "summary";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Prompt with `${summary}` and `${new_lines}` placeholders
    pub prompt_template: String,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        SummaryConfig {
            prompt_template: DEFAULT_SUMMARY_TEMPLATE.to_string(),
        }
    }
}

pub struct SummaryManipulator {
    config: SummaryConfig,
    buffer: String,
    llm: Arc<dyn LlmService>,
    store: Arc<dyn MemoryStore>,
}

impl SummaryManipulator {
    pub fn new(config: SummaryConfig, llm: Arc<dyn LlmService>, store: Arc<dyn MemoryStore>) -> Self {
        SummaryManipulator {
            config,
            buffer: String::new(),
            llm,
            store,
        }
    }

    /// Current summary text (empty before the first cycle).
    pub fn buffer(&self) -> &str {
        &self.buffer
    }
}

#[async_trait]
impl Manipulator for SummaryManipulator {
    fn name(&self) -> &str {
        NAME
    }

    async fn manipulate(&mut self, _context: Option<&str>) -> Result<ManipulationResult> {
        if self.should_run().await? {
            self.process().await?;
        }
        match self.result() {
            Some(result) => {
                let mut out =
                    ManipulationResult::new(self.buffer.clone()).with_metadata("manipulator", NAME);
                out.metadata.extend(result);
                Ok(out.with_metadata("empty", false))
            }
            None => Ok(ManipulationResult::empty(NAME)),
        }
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Propagate
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }
}

#[async_trait]
impl CycleManipulator for SummaryManipulator {
    async fn should_run(&mut self) -> Result<bool> {
        let messages = self
            .store
            .get_messages()
            .await
            .map_err(|e| ManipulationError::service(NAME, e))?;
        Ok(!messages.is_empty())
    }

    async fn process(&mut self) -> Result<()> {
        let messages = self
            .store
            .get_messages()
            .await
            .map_err(|e| ManipulationError::service(NAME, e))?;
        if messages.is_empty() {
            return Ok(());
        }

        let new_lines = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let values = HashMap::from([
            ("summary".to_string(), self.buffer.clone()),
            ("new_lines".to_string(), new_lines),
        ]);
        let prompt = safe_substitute(&self.config.prompt_template, &values);

        let response = self
            .llm
            .generate_response(&prompt)
            .await
            .map_err(|e| ManipulationError::service(NAME, e))?;
        debug!(chars = response.content.len(), "Summary buffer replaced");
        self.buffer = response.content;
        Ok(())
    }

    fn result(&self) -> Option<Map<String, Value>> {
        if self.buffer.is_empty() {
            return None;
        }
        let mut map = Map::new();
        map.insert("summary".into(), json!(self.buffer));
        map.insert("type".into(), json!("summary"));
        Some(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentverse_state::fakes::{FailingLlm, InMemoryStore, ScriptedLlm};
    use agentverse_state::MemoryRecord;

    #[tokio::test]
    async fn test_prompt_carries_previous_summary() {
        let llm = Arc::new(ScriptedLlm::new(["first summary", "second summary"]));
        let store = Arc::new(InMemoryStore::with_records(vec![MemoryRecord::new("hello")]));
        let mut summary = SummaryManipulator::new(SummaryConfig::default(), llm.clone(), store.clone());

        summary.manipulate(None).await.unwrap();
        store.push(MemoryRecord::new("world"));
        let out = summary.manipulate(None).await.unwrap();

        assert_eq!(out.content, "second summary");
        let calls = llm.calls();
        assert!(calls[1].contains("Previous summary:\nfirst summary"));
        assert!(calls[1].contains("hello\nworld"));
    }

    #[tokio::test]
    async fn test_empty_store_yields_empty_result() {
        let llm = Arc::new(ScriptedLlm::new(["unused"]));
        let mut summary = SummaryManipulator::new(
            SummaryConfig::default(),
            llm.clone(),
            Arc::new(InMemoryStore::new()),
        );
        let out = summary.manipulate(None).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(out.metadata["empty"], true);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_llm_failure_keeps_buffer() {
        let store = Arc::new(InMemoryStore::with_records(vec![MemoryRecord::new("x")]));
        let mut summary =
            SummaryManipulator::new(SummaryConfig::default(), Arc::new(FailingLlm::new()), store);
        assert!(summary.manipulate(None).await.is_err());
        assert_eq!(summary.buffer(), "");
        assert_eq!(summary.failure_policy(), FailurePolicy::Propagate);
    }

    #[tokio::test]
    async fn test_custom_template() {
        let llm = Arc::new(ScriptedLlm::new(["ok"]));
        let store = Arc::new(InMemoryStore::with_records(vec![MemoryRecord::new("a")]));
        let config = SummaryConfig {
            prompt_template: "Lines: $new_lines | kept $$".to_string(),
        };
        let mut summary = SummaryManipulator::new(config, llm.clone(), store);
        summary.manipulate(None).await.unwrap();
        assert_eq!(llm.calls()[0], "Lines: a | kept $");
    }
}
