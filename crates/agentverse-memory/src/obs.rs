//! Structured observability hooks for memory pipeline lifecycle events.
//!
//! This module provides:
//! - A run-scoped tracing span via `pipeline_span`
//! - Emission functions for key events: pipeline start/finish, stage
//!   start/finish/failure, reflection triggers and filter fail-open
//!
//! Events are emitted at `info!` level, failures at `warn!`.
//! Filter with `RUST_LOG`; pass `--json` to the CLI for JSON output.

use tracing::{info, warn};

/// Run-scoped span for one pipeline run.
///
/// Attach with [`tracing::Instrument`] so every stage event carries the run id
/// across await points.
///
/// # Example
///
/// ```ignore
/// pipeline_body().instrument(pipeline_span("6f1c...")).await
/// ```
pub fn pipeline_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("agentverse.pipeline", run_id = %run_id)
}

/// Emit event: pipeline run started.
pub fn emit_pipeline_started(run_id: &str, stage_count: usize) {
    info!(event = "pipeline.started", run_id = %run_id, stage_count = stage_count);
}

/// Emit event: pipeline run finished.
pub fn emit_pipeline_finished(run_id: &str, duration_ms: u64, stages_run: usize, success: bool) {
    info!(
        event = "pipeline.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        stages_run = stages_run,
        success = success,
    );
}

/// Emit event: a disabled stage was skipped.
pub fn emit_stage_skipped(manipulator: &str) {
    info!(event = "pipeline.stage_skipped", manipulator = %manipulator);
}

pub fn emit_manipulation_started(manipulator: &str) {
    info!(event = "manipulation.started", manipulator = %manipulator);
}

/// Emit event: manipulation finished with output size.
pub fn emit_manipulation_finished(manipulator: &str, duration_ms: u64, chars: usize, empty: bool) {
    info!(
        event = "manipulation.finished",
        manipulator = %manipulator,
        duration_ms = duration_ms,
        chars = chars,
        empty = empty,
    );
}

/// Emit event: manipulation failed (warning level).
pub fn emit_manipulation_failed(manipulator: &str, error: &dyn std::fmt::Display, degraded: bool) {
    warn!(
        event = "manipulation.failed",
        manipulator = %manipulator,
        error = %error,
        degraded = degraded,
    );
}

/// Emit event: accumulated importance crossed the reflection threshold.
pub fn emit_reflection_triggered(accumulated_importance: f64, importance_threshold: f64) {
    info!(
        event = "reflection.triggered",
        accumulated_importance = accumulated_importance,
        importance_threshold = importance_threshold,
    );
}

/// Emit event: a reflection cycle committed its insights.
pub fn emit_reflection_committed(cycle: u32, insights: usize, next_threshold: f64) {
    info!(
        event = "reflection.committed",
        cycle = cycle,
        insights = insights,
        next_threshold = next_threshold,
    );
}

/// Emit event: relevance filtering skipped because embeddings failed.
pub fn emit_filter_fail_open(manipulator: &str, error: &dyn std::fmt::Display) {
    warn!(event = "filter.fail_open", manipulator = %manipulator, error = %error);
}
