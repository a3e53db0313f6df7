//! Presentation transforms over memory records.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use agentverse_state::{LlmService, MemoryRecord, MemoryStore};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{ManipulationError, Result, ValidationError, ValidationResult};
use crate::manipulator::{ManipulationResult, Manipulator};
use crate::template::safe_substitute;

const NAME: &str = "transform";

const DEFAULT_SUMMARY_TOKENS: usize = 500;
const DEFAULT_QA_TOKENS: usize = 1000;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum FormatKind {
    #[default]
    Structured,
    Summary,
    Highlights,
    Qa,
    Custom,
}

impl FormatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatKind::Structured => "structured",
            FormatKind::Summary => "summary",
            FormatKind::Highlights => "highlights",
            FormatKind::Qa => "qa",
            FormatKind::Custom => "custom",
        }
    }

    /// Formats that call the LLM.
    pub fn needs_llm(&self) -> bool {
        matches!(self, FormatKind::Summary | FormatKind::Qa)
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> ValidationResult<Self> {
        match s {
            "structured" => Ok(FormatKind::Structured),
            "summary" => Ok(FormatKind::Summary),
            "highlights" => Ok(FormatKind::Highlights),
            "qa" => Ok(FormatKind::Qa),
            "custom" => Ok(FormatKind::Custom),
            other => Err(ValidationError::UnsupportedFormat {
                format: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for FormatKind {
    type Error = ValidationError;

    fn try_from(value: String) -> ValidationResult<Self> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformFormat {
    #[serde(rename = "type")]
    pub kind: FormatKind,
    /// Template for the custom format
    pub template: Option<String>,
    /// Token budget for LLM formats
    pub max_length: Option<usize>,
    pub style: String,
    pub include_metadata: bool,
}

impl Default for TransformFormat {
    fn default() -> Self {
        TransformFormat {
            kind: FormatKind::Structured,
            template: None,
            max_length: None,
            style: "concise".to_string(),
            include_metadata: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub format: TransformFormat,
    /// Chronological order; otherwise newest first
    pub preserve_order: bool,
    pub include_timestamps: bool,
    /// Memories per LLM prompt
    pub batch_size: usize,
}

impl Default for TransformConfig {
    fn default() -> Self {
        TransformConfig {
            format: TransformFormat::default(),
            preserve_order: true,
            include_timestamps: true,
            batch_size: 100,
        }
    }
}

impl TransformConfig {
    pub fn with_kind(mut self, kind: FormatKind) -> Self {
        self.format.kind = kind;
        self
    }

    pub fn with_template(mut self, template: &str) -> Self {
        self.format.template = Some(template.to_string());
        self
    }

    pub fn validate(&self) -> ValidationResult<()> {
        if self.batch_size == 0 {
            return Err(ValidationError::InvalidOptions {
                manipulator: NAME.to_string(),
                reason: "batch_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

pub struct TransformManipulator {
    config: TransformConfig,
    store: Arc<dyn MemoryStore>,
    llm: Option<Arc<dyn LlmService>>,
}

impl TransformManipulator {
    pub fn new(
        config: TransformConfig,
        store: Arc<dyn MemoryStore>,
        llm: Option<Arc<dyn LlmService>>,
    ) -> ValidationResult<Self> {
        config.validate()?;
        if config.format.kind.needs_llm() && llm.is_none() {
            return Err(ValidationError::MissingService {
                manipulator: NAME.to_string(),
                service: "llm",
            });
        }
        Ok(TransformManipulator { config, store, llm })
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Render `memories` in the configured format.
    pub async fn transform(&self, mut memories: Vec<MemoryRecord>, context: Option<&str>) -> Result<String> {
        if !self.config.preserve_order {
            memories.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        }
        match self.config.format.kind {
            FormatKind::Structured => self.structured(&memories),
            FormatKind::Summary => {
                let budget = self.config.format.max_length.unwrap_or(DEFAULT_SUMMARY_TOKENS);
                self.batched(&memories, budget, |combined| {
                    format!(
                        "Summarize the following content in a {} style:\n\n{combined}\n\nContext: {}",
                        self.config.format.style,
                        context.unwrap_or("None provided")
                    )
                })
                .await
            }
            FormatKind::Highlights => Ok(self.highlights(&memories)),
            FormatKind::Qa => {
                let budget = self.config.format.max_length.unwrap_or(DEFAULT_QA_TOKENS);
                self.batched(&memories, budget, |combined| {
                    format!(
                        "Generate a Q&A summary of the following content:\n\n{combined}\n\nContext: {}\nStyle: {}",
                        context.unwrap_or("None provided"),
                        self.config.format.style
                    )
                })
                .await
            }
            FormatKind::Custom => self.custom(&memories, context),
        }
    }

    fn structured(&self, memories: &[MemoryRecord]) -> Result<String> {
        let entries: Vec<Value> = memories
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let mut entry = Map::new();
                if self.config.format.include_metadata {
                    entry.extend(m.metadata.clone());
                }
                entry.insert("id".into(), json!(i + 1));
                entry.insert("content".into(), json!(m.content));
                if self.config.include_timestamps {
                    entry.insert("timestamp".into(), json!(rfc3339(m)));
                }
                Value::Object(entry)
            })
            .collect();
        Ok(serde_json::to_string_pretty(&entries)?)
    }

    fn highlights(&self, memories: &[MemoryRecord]) -> String {
        memories
            .iter()
            .map(|m| {
                if self.config.include_timestamps {
                    format!("[{}] {}", rfc3339(m), m.content)
                } else {
                    format!("• {}", m.content)
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn custom(&self, memories: &[MemoryRecord], context: Option<&str>) -> Result<String> {
        let template = self
            .config
            .format
            .template
            .as_deref()
            .ok_or_else(|| ManipulationError::MissingTemplate {
                manipulator: NAME.to_string(),
            })?;

        let mut values = HashMap::from([
            ("context".to_string(), context.unwrap_or_default().to_string()),
            ("memory_count".to_string(), memories.len().to_string()),
            (
                "current_time".to_string(),
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
        ]);
        for (i, m) in memories.iter().enumerate() {
            values.insert(format!("content_{}", i + 1), m.content.clone());
            if self.config.include_timestamps {
                values.insert(format!("timestamp_{}", i + 1), rfc3339(m));
            }
        }
        Ok(safe_substitute(template, &values))
    }

    async fn batched<F>(&self, memories: &[MemoryRecord], max_tokens: usize, prompt: F) -> Result<String>
    where
        F: Fn(&str) -> String + Send + Sync,
    {
        let llm = self.llm.as_ref().ok_or_else(|| ManipulationError::InvalidResponse {
            manipulator: NAME.to_string(),
            reason: "no LLM service configured".to_string(),
        })?;

        let mut outputs = Vec::new();
        for batch in memories.chunks(self.config.batch_size) {
            let combined = batch
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            let response = llm
                .generate_with_limit(&prompt(&combined), max_tokens)
                .await
                .map_err(|e| ManipulationError::service(NAME, e))?;
            outputs.push(response.content.trim().to_string());
        }
        Ok(outputs.join("\n\n"))
    }
}

fn rfc3339(memory: &MemoryRecord) -> String {
    memory.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl Manipulator for TransformManipulator {
    fn name(&self) -> &str {
        NAME
    }

    async fn manipulate(&mut self, context: Option<&str>) -> Result<ManipulationResult> {
        let memories = self
            .store
            .get_all()
            .await
            .map_err(|e| ManipulationError::service(NAME, e))?;
        if memories.is_empty() {
            return Ok(ManipulationResult::empty(NAME));
        }
        let original_count = memories.len();

        let content = self.transform(memories, context).await?;
        Ok(ManipulationResult::new(content)
            .with_metadata("manipulator", NAME)
            .with_metadata("empty", false)
            .with_metadata("format", serde_json::to_value(&self.config.format)?)
            .with_metadata("original_count", original_count)
            .with_metadata("context", context))
    }
}
