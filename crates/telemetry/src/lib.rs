//! Per-turn stage profiling for DiaryCoach.
//!
//! Every coaching turn opens a [`Trace`]; each pipeline stage (relevance
//! scoring, context fetch, formatting, the LLM call, protocol tracking)
//! records a [`Span`] into it. The [`Profiler`] is an ordinary value shared
//! through `Arc`, never a global.

pub mod engine;
pub mod model;

pub use engine::Profiler;
pub use model::{Span, SpanKind, StageSummary, Trace};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("unknown trace id: {0}")]
    UnknownTrace(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
