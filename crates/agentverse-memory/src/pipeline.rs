//! Sequential manipulator pipeline.
//!
//! Stages run in declared order once per agent turn. A failing stage with
//! [`FailurePolicy::Degrade`] contributes an empty, degraded outcome and the
//! run continues; [`FailurePolicy::Propagate`] aborts the run.

use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::error::{Result, ValidationError, ValidationResult};
use crate::manipulator::{FailurePolicy, ManipulationResult, Manipulator};
use crate::obs;
use crate::registry::{ManipulatorRegistry, ManipulatorSpec, Services};

/// Pipeline definition, usually loaded from TOML:
///
/// ```toml
/// [[manipulators]]
/// type = "filter"
/// options = { topics = ["startup"] }
///
/// [[manipulators]]
/// type = "summary"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub manipulators: Vec<ManipulatorSpec>,
}

impl PipelineConfig {
    pub fn from_toml_str(raw: &str) -> ValidationResult<Self> {
        toml::from_str(raw).map_err(|e| ValidationError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> ValidationResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }
}

/// A manipulator plus its pipeline settings.
pub struct Stage {
    label: String,
    enabled: bool,
    policy: FailurePolicy,
    manipulator: Box<dyn Manipulator>,
}

impl Stage {
    pub fn new(manipulator: Box<dyn Manipulator>) -> Self {
        Stage {
            label: manipulator.name().to_string(),
            enabled: true,
            policy: manipulator.failure_policy(),
            manipulator,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Mark stage as disabled
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Outcome of one stage in one run.
#[derive(Debug, Clone, Serialize)]
pub struct StageOutcome {
    pub name: String,
    pub result: ManipulationResult,
    /// Error message when the stage degraded
    pub error: Option<String>,
    pub degraded: bool,
    pub duration_ms: u64,
}

/// Result of a complete pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: String,
    /// Whether every executed stage succeeded
    pub success: bool,
    pub outcomes: Vec<StageOutcome>,
    pub duration_ms: u64,
}

impl PipelineReport {
    /// Number of stages that produced a result.
    pub fn passed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.degraded).count()
    }

    pub fn degraded_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.degraded).count()
    }

    pub fn outcome(&self, name: &str) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    /// Non-empty stage contents joined by blank lines, ready for a prompt.
    pub fn context(&self) -> String {
        self.outcomes
            .iter()
            .map(|o| o.result.content.as_str())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Default)]
pub struct ManipulatorPipeline {
    stages: Vec<Stage>,
}

impl ManipulatorPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Append a manipulator with its default settings.
    pub fn push(&mut self, manipulator: Box<dyn Manipulator>) {
        self.stages.push(Stage::new(manipulator));
    }

    /// Build every configured stage through `registry`.
    pub fn from_config(
        config: &PipelineConfig,
        registry: &ManipulatorRegistry,
        services: &Services,
    ) -> ValidationResult<Self> {
        let mut pipeline = Self::new();
        for spec in &config.manipulators {
            let mut stage = Stage::new(registry.build(spec, services)?);
            if let Some(ref label) = spec.name {
                stage = stage.with_label(label);
            }
            if let Some(policy) = spec.on_failure {
                stage = stage.with_policy(policy);
            }
            if !spec.enabled {
                stage = stage.disabled();
            }
            pipeline.stages.push(stage);
        }
        Ok(pipeline)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Reset every stage's accumulated state.
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.manipulator.reset();
        }
    }

    /// Execute all enabled stages against `context`.
    pub async fn run(&mut self, context: Option<&str>) -> Result<PipelineReport> {
        let run_id = Uuid::new_v4().to_string();
        let span = obs::pipeline_span(&run_id);
        self.run_stages(run_id, context).instrument(span).await
    }

    async fn run_stages(&mut self, run_id: String, context: Option<&str>) -> Result<PipelineReport> {
        let start = Instant::now();
        obs::emit_pipeline_started(&run_id, self.stages.len());

        let mut outcomes = Vec::new();
        let mut all_passed = true;

        for stage in &mut self.stages {
            if !stage.enabled {
                obs::emit_stage_skipped(&stage.label);
                continue;
            }

            obs::emit_manipulation_started(&stage.label);
            let stage_start = Instant::now();
            let outcome = stage.manipulator.manipulate(context).await;
            let duration_ms = stage_start.elapsed().as_millis() as u64;

            match outcome {
                Ok(result) => {
                    obs::emit_manipulation_finished(
                        &stage.label,
                        duration_ms,
                        result.content.chars().count(),
                        result.is_empty(),
                    );
                    outcomes.push(StageOutcome {
                        name: stage.label.clone(),
                        result,
                        error: None,
                        degraded: false,
                        duration_ms,
                    });
                }
                Err(e) if stage.policy == FailurePolicy::Degrade => {
                    obs::emit_manipulation_failed(&stage.label, &e, true);
                    all_passed = false;
                    let mut result =
                        ManipulationResult::empty(&stage.label).with_metadata("degraded", true);
                    result.metadata.insert("error".into(), e.details().into());
                    outcomes.push(StageOutcome {
                        name: stage.label.clone(),
                        result,
                        error: Some(e.to_string()),
                        degraded: true,
                        duration_ms,
                    });
                }
                Err(e) => {
                    obs::emit_manipulation_failed(&stage.label, &e, false);
                    obs::emit_pipeline_finished(
                        &run_id,
                        start.elapsed().as_millis() as u64,
                        outcomes.len() + 1,
                        false,
                    );
                    return Err(e);
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_pipeline_finished(&run_id, duration_ms, outcomes.len(), all_passed);
        info!(run_id = %run_id, degraded = !all_passed, "Pipeline run complete");

        Ok(PipelineReport {
            run_id,
            success: all_passed,
            outcomes,
            duration_ms,
        })
    }
}
