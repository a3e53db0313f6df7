//! Explicit manipulator registry.
//!
//! The registry is an ordinary value built at the composition root: a map
//! from manipulator key to a factory that turns untyped options into a
//! configured, validated manipulator.

use std::collections::HashMap;
use std::sync::Arc;

use agentverse_state::{EmbeddingService, LlmService, MemoryStore};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{ValidationError, ValidationResult};
use crate::manipulator::{FailurePolicy, Manipulator};
use crate::manipulators::{
    BasicManipulator, FilterCriteria, FilterManipulator, FormatKind, ReflectionConfig,
    ReflectionManipulator, SimpleConfig, SimpleManipulator, SummarizeConfig,
    SummarizeManipulator, SummaryConfig, SummaryManipulator, TransformConfig,
    TransformManipulator,
};

/// One configured pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManipulatorSpec {
    /// Registry key (`filter`, `reflection`, ...)
    #[serde(rename = "type")]
    pub kind: String,
    /// Label used in reports; defaults to the manipulator name
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Override the manipulator's own failure policy
    #[serde(default)]
    pub on_failure: Option<FailurePolicy>,
    /// Manipulator-specific configuration
    #[serde(default)]
    pub options: Value,
}

fn default_enabled() -> bool {
    true
}

impl ManipulatorSpec {
    pub fn new(kind: &str) -> Self {
        ManipulatorSpec {
            kind: kind.to_string(),
            name: None,
            enabled: true,
            on_failure: None,
            options: Value::Null,
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Collaborators available to factories.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn MemoryStore>,
    pub llm: Option<Arc<dyn LlmService>>,
    pub embeddings: Option<Arc<dyn EmbeddingService>>,
}

impl Services {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Services {
            store,
            llm: None,
            embeddings: None,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmService>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_embeddings(mut self, embeddings: Arc<dyn EmbeddingService>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    pub fn require_llm(&self, manipulator: &str) -> ValidationResult<Arc<dyn LlmService>> {
        self.llm.clone().ok_or_else(|| ValidationError::MissingService {
            manipulator: manipulator.to_string(),
            service: "llm",
        })
    }

    pub fn require_embeddings(
        &self,
        manipulator: &str,
    ) -> ValidationResult<Arc<dyn EmbeddingService>> {
        self.embeddings
            .clone()
            .ok_or_else(|| ValidationError::MissingService {
                manipulator: manipulator.to_string(),
                service: "embeddings",
            })
    }
}

/// Builds a manipulator from its options.
pub type ManipulatorFactory = fn(&Value, &Services) -> ValidationResult<Box<dyn Manipulator>>;

/// Deserialize factory options, treating a missing table as all defaults.
pub fn parse_options<T>(manipulator: &str, options: &Value) -> ValidationResult<T>
where
    T: DeserializeOwned + Default,
{
    if options.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(options.clone()).map_err(|e| ValidationError::InvalidOptions {
        manipulator: manipulator.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Default)]
pub struct ManipulatorRegistry {
    factories: HashMap<String, ManipulatorFactory>,
}

impl ManipulatorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in manipulator.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, ManipulatorFactory); 7] = [
            ("basic", build_basic),
            ("simple", build_simple),
            ("filter", build_filter),
            ("reflection", build_reflection),
            ("summary", build_summary),
            ("summarize", build_summarize),
            ("transform", build_transform),
        ];
        for (kind, factory) in builtins {
            registry.factories.insert(kind.to_string(), factory);
        }
        registry
    }

    /// Register a factory. Keys are unique.
    pub fn register(&mut self, kind: &str, factory: ManipulatorFactory) -> ValidationResult<()> {
        if self.factories.contains_key(kind) {
            return Err(ValidationError::DuplicateManipulator {
                kind: kind.to_string(),
            });
        }
        self.factories.insert(kind.to_string(), factory);
        Ok(())
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered keys, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn build(
        &self,
        spec: &ManipulatorSpec,
        services: &Services,
    ) -> ValidationResult<Box<dyn Manipulator>> {
        let factory = self
            .factories
            .get(&spec.kind)
            .ok_or_else(|| ValidationError::UnknownManipulator {
                kind: spec.kind.clone(),
            })?;
        debug!(kind = %spec.kind, "Building manipulator");
        factory(&spec.options, services)
    }
}

fn build_basic(_options: &Value, services: &Services) -> ValidationResult<Box<dyn Manipulator>> {
    Ok(Box::new(BasicManipulator::new(services.store.clone())))
}

fn build_simple(options: &Value, services: &Services) -> ValidationResult<Box<dyn Manipulator>> {
    let config: SimpleConfig = parse_options("simple", options)?;
    Ok(Box::new(SimpleManipulator::new(config, services.store.clone())?))
}

fn build_filter(options: &Value, services: &Services) -> ValidationResult<Box<dyn Manipulator>> {
    let criteria: FilterCriteria = parse_options("filter", options)?;
    let embeddings = if criteria.relevance > 0.0 {
        Some(services.require_embeddings("filter")?)
    } else {
        services.embeddings.clone()
    };
    Ok(Box::new(FilterManipulator::new(
        criteria,
        services.store.clone(),
        embeddings,
    )?))
}

fn build_reflection(
    options: &Value,
    services: &Services,
) -> ValidationResult<Box<dyn Manipulator>> {
    let config: ReflectionConfig = parse_options("reflection", options)?;
    Ok(Box::new(ReflectionManipulator::new(
        config,
        services.require_llm("reflection")?,
        services.require_embeddings("reflection")?,
        services.store.clone(),
    )?))
}

fn build_summary(options: &Value, services: &Services) -> ValidationResult<Box<dyn Manipulator>> {
    let config: SummaryConfig = parse_options("summary", options)?;
    Ok(Box::new(SummaryManipulator::new(
        config,
        services.require_llm("summary")?,
        services.store.clone(),
    )))
}

fn build_summarize(
    options: &Value,
    services: &Services,
) -> ValidationResult<Box<dyn Manipulator>> {
    let config: SummarizeConfig = parse_options("summarize", options)?;
    Ok(Box::new(SummarizeManipulator::new(
        config,
        services.store.clone(),
        services.llm.clone(),
    )?))
}

fn build_transform(
    options: &Value,
    services: &Services,
) -> ValidationResult<Box<dyn Manipulator>> {
    // Surface unknown formats as such rather than as a generic options error.
    if let Some(kind) = options
        .get("format")
        .and_then(|f| f.get("type"))
        .and_then(Value::as_str)
    {
        kind.parse::<FormatKind>()?;
    }
    let config: TransformConfig = parse_options("transform", options)?;
    let llm = if config.format.kind.needs_llm() {
        Some(services.require_llm("transform")?)
    } else {
        services.llm.clone()
    };
    Ok(Box::new(TransformManipulator::new(
        config,
        services.store.clone(),
        llm,
    )?))
}
