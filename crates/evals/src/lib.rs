//! Coaching self-evaluation for DiaryCoach.
//!
//! After a session the coach grades itself with a handful of LLM-judged
//! analyzers run side by side on a [`ParallelExecutor`]. Every analyzer
//! degrades to a neutral 0.5 on failure, so evaluation never blocks the
//! coaching reply. [`DeepThoughtsGenerator`] writes the longer reflective
//! report on request.

pub mod analyzer;
pub mod deep_thoughts;
pub mod executor;
pub mod summary;

pub use analyzer::{Analyzer, EvalScore, LlmAnalyzer, default_analyzers, parse_evaluation};
pub use deep_thoughts::{DeepThoughtsGenerator, DeepThoughtsReport, ReportInput};
pub use executor::{ParallelExecutor, TaskResult};
pub use summary::{EvaluationSummary, evaluate_all};
