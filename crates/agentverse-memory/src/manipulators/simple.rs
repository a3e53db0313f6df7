//! Pass-through manipulators: the most recent memories, verbatim.

use std::sync::Arc;

use agentverse_state::{MemoryRecord, MemoryStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ManipulationError, Result, ValidationError, ValidationResult};
use crate::manipulator::{ManipulationResult, Manipulator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleConfig {
    /// Number of most recent memories to keep
    pub context_size: usize,
}

impl Default for SimpleConfig {
    fn default() -> Self {
        SimpleConfig { context_size: 5 }
    }
}

impl SimpleConfig {
    pub fn validate(&self) -> ValidationResult<()> {
        if self.context_size == 0 {
            return Err(ValidationError::InvalidOptions {
                manipulator: "simple".to_string(),
                reason: "context_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// The `k` most recent records, oldest first.
pub(crate) fn most_recent(mut memories: Vec<MemoryRecord>, k: usize) -> Vec<MemoryRecord> {
    memories.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    let skip = memories.len().saturating_sub(k);
    memories.split_off(skip)
}

pub struct SimpleManipulator {
    name: &'static str,
    config: SimpleConfig,
    store: Arc<dyn MemoryStore>,
}

impl SimpleManipulator {
    pub fn new(config: SimpleConfig, store: Arc<dyn MemoryStore>) -> ValidationResult<Self> {
        config.validate()?;
        Ok(SimpleManipulator {
            name: "simple",
            config,
            store,
        })
    }
}

#[async_trait]
impl Manipulator for SimpleManipulator {
    fn name(&self) -> &str {
        self.name
    }

    async fn manipulate(&mut self, _context: Option<&str>) -> Result<ManipulationResult> {
        let memories = self
            .store
            .get_all()
            .await
            .map_err(|e| ManipulationError::service(self.name, e))?;
        let recent = most_recent(memories, self.config.context_size);
        if recent.is_empty() {
            return Ok(ManipulationResult::empty(self.name));
        }

        let content = recent
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ManipulationResult::new(content)
            .with_metadata("manipulator", self.name)
            .with_metadata("context_size", recent.len())
            .with_metadata("empty", false))
    }
}

/// Default policy: [`SimpleManipulator`] with the default window.
pub struct BasicManipulator {
    inner: SimpleManipulator,
}

impl BasicManipulator {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        BasicManipulator {
            inner: SimpleManipulator {
                name: "basic",
                config: SimpleConfig::default(),
                store,
            },
        }
    }
}

#[async_trait]
impl Manipulator for BasicManipulator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn manipulate(&mut self, context: Option<&str>) -> Result<ManipulationResult> {
        self.inner.manipulate(context).await
    }
}
