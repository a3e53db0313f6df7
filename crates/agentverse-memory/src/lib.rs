//! AgentVerse Memory Library
//!
//! Turns an agent's raw conversational memory into bounded, purpose-specific
//! prompt context. Manipulators (filter, reflection, summary, summarize,
//! transform, simple, basic) are built through an explicit registry and run
//! as stages of a [`ManipulatorPipeline`].

pub mod error;
pub mod manipulator;
pub mod manipulators;
pub mod obs;
pub mod pipeline;
pub mod registry;
pub mod scoring;
pub mod telemetry;
pub mod template;

pub use error::{ManipulationError, Result, ValidationError, ValidationResult};

pub use manipulator::{CycleManipulator, FailurePolicy, ManipulationResult, Manipulator};

pub use manipulators::{
    BasicManipulator, FilterCriteria, FilterManipulator, FilterOutcome, FormatKind,
    ReflectionConfig, ReflectionManipulator, ReflectionPhase, ReflectionState, SimpleConfig,
    SimpleManipulator, SummarizeConfig, SummarizeManipulator, SummaryConfig, SummaryManipulator,
    TransformConfig, TransformFormat, TransformManipulator, DEFAULT_SUMMARY_TEMPLATE,
    IMMEDIACY_PROMPT, IMPORTANCE_PROMPT,
};

pub use pipeline::{ManipulatorPipeline, PipelineConfig, PipelineReport, Stage, StageOutcome};

pub use registry::{ManipulatorFactory, ManipulatorRegistry, ManipulatorSpec, Services};

pub use telemetry::{init_tracing, level_for};

pub use obs::{
    emit_filter_fail_open, emit_manipulation_failed, emit_manipulation_finished,
    emit_manipulation_started, emit_pipeline_finished, emit_pipeline_started,
    emit_reflection_committed, emit_reflection_triggered, emit_stage_skipped, pipeline_span,
};

pub use agentverse_state::{
    EmbeddingService, LlmResponse, LlmService, MemoryRecord, MemoryStore, ServiceError,
};
