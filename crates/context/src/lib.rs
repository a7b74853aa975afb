//! Context relevance and budgeted injection for DiaryCoach.
//!
//! Each turn flows through three stages, each returning an immutable step
//! result:
//!
//! 1. **Score** ([`relevance`]): the trailing window of turns is matched
//!    against per-source pattern rules, producing [`RelevanceScores`].
//! 2. **Fetch** ([`fetch`]): every fetcher whose gate opens retrieves
//!    [`ContextItem`]s. Failures degrade to "no context" and are recorded
//!    in the step, never returned.
//! 3. **Format** ([`formatter`]): items are packed into a character budget
//!    in priority order todos → documents → memory.
//!
//! [`pipeline::ContextPipeline`] threads the three together.

pub mod fetch;
pub mod formatter;
pub mod pipeline;
pub mod relevance;
pub mod source;
pub mod text;

pub use fetch::{ContextFetcher, FetchOutcome, FetchRequest};
pub use formatter::{ContextAttribution, FormattedContext};
pub use pipeline::{ContextPipeline, FetchStep, PipelineOutput, ScoreStep};
pub use relevance::{PatternRule, RelevanceScorer};
pub use source::{ContextItem, ContextSource, RelevanceScores};

use std::path::PathBuf;

/// Errors raised inside the context pipeline.
///
/// Only [`ContextError::InvalidPattern`] ever reaches a caller (at scorer
/// construction). Fetch errors are caught by the gate and recorded.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("invalid {family} pattern '{pattern}': {reason}")]
    InvalidPattern {
        family: ContextSource,
        pattern: String,
        reason: String,
    },

    #[error("failed to read {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("memory store error: {0}")]
    Memory(#[from] diarycoach_core::MemoryError),

    #[error("todo source error: {0}")]
    Todos(String),
}
