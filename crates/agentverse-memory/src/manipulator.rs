//! Manipulator contracts and the shared result type.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// What a pipeline does when a stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log, record an empty outcome and keep going.
    Degrade,
    /// Abort the run with the error.
    Propagate,
}

/// Output of a single manipulation. Consumers depend only on `content`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManipulationResult {
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ManipulationResult {
    pub fn new(content: impl Into<String>) -> Self {
        ManipulationResult {
            content: content.into(),
            metadata: Map::new(),
        }
    }

    /// Empty result tagged with the producing manipulator.
    pub fn empty(manipulator: &str) -> Self {
        ManipulationResult::new("")
            .with_metadata("manipulator", manipulator)
            .with_metadata("empty", true)
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// A pipeline stage turning an agent's memory into bounded context.
#[async_trait]
pub trait Manipulator: Send + Sync {
    /// Stable name used in logs, metadata and pipeline reports.
    fn name(&self) -> &str;

    /// Run the manipulation against the current memory.
    async fn manipulate(&mut self, context: Option<&str>) -> Result<ManipulationResult>;

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Degrade
    }

    /// Drop any accumulated state.
    fn reset(&mut self) {}
}

/// Manipulators driven by a `should_run → process → result` cycle.
#[async_trait]
pub trait CycleManipulator: Manipulator {
    async fn should_run(&mut self) -> Result<bool>;

    async fn process(&mut self) -> Result<()>;

    /// Latest output, or `None` when nothing has been produced yet.
    fn result(&self) -> Option<Map<String, Value>>;
}
