//! The per-turn context pipeline: score → fetch → format.
//!
//! Each stage returns an immutable step value that the next stage reads.
//! Nothing is cached between turns; scores are always recomputed from the
//! current window.

use crate::fetch::{
    ContextFetcher, DEFAULT_THRESHOLD, DocumentFetcher, FetchOutcome, FetchRequest, MemoryFetcher,
    StaticTodoSource, TodoFetcher, gated_fetch,
};
use crate::formatter::{self, DEFAULT_BUDGET, FormattedContext};
use crate::relevance::RelevanceScorer;
use crate::source::{ContextItem, ContextSource, RelevanceScores};
use diarycoach_config::ContextConfig;
use diarycoach_core::{ConversationTurn, MemoryStore};
use diarycoach_telemetry::{Profiler, Span, SpanKind};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

// ── Step results ──────────────────────────────────────────────────────────

/// Output of the scoring stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreStep {
    /// The trailing window that was scored.
    pub window: Vec<ConversationTurn>,
    pub scores: RelevanceScores,
}

/// Output of the fetch stage: one outcome per registered fetcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FetchStep {
    pub outcomes: Vec<FetchOutcome>,
}

impl FetchStep {
    pub fn outcome(&self, source: ContextSource) -> Option<&FetchOutcome> {
        self.outcomes.iter().find(|o| o.source == source)
    }

    /// Whether `source` was gated in and fetched successfully.
    pub fn fetched(&self, source: ContextSource) -> bool {
        self.outcome(source).is_some_and(|o| o.fetched)
    }

    pub fn items(&self, source: ContextSource) -> &[ContextItem] {
        self.outcome(source).map(|o| o.items.as_slice()).unwrap_or(&[])
    }

    /// Every fetched item in fetcher order.
    pub fn all_items(&self) -> Vec<ContextItem> {
        self.outcomes.iter().flat_map(|o| o.items.iter().cloned()).collect()
    }

    /// Sources whose fetch failed, with the error text.
    pub fn errors(&self) -> Vec<(ContextSource, &str)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.error.as_deref().map(|e| (o.source, e)))
            .collect()
    }
}

/// Everything one pipeline run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutput {
    pub score: ScoreStep,
    pub fetch: FetchStep,
    pub context: FormattedContext,
}

// ── Pipeline ──────────────────────────────────────────────────────────────

pub struct ContextPipeline {
    scorer: RelevanceScorer,
    fetchers: Vec<Arc<dyn ContextFetcher>>,
    threshold: f32,
    budget: usize,
    enabled: bool,
    profiler: Option<Arc<Profiler>>,
}

impl ContextPipeline {
    /// A pipeline with no fetchers.
    pub fn new(scorer: RelevanceScorer) -> Self {
        Self {
            scorer,
            fetchers: Vec::new(),
            threshold: DEFAULT_THRESHOLD,
            budget: DEFAULT_BUDGET,
            enabled: true,
            profiler: None,
        }
    }

    /// The standard pipeline for a `[context]` config section: built-in
    /// todos, documents when a directory is configured, and memory recall
    /// when a store is given.
    pub fn from_config(config: &ContextConfig, memory: Option<Arc<dyn MemoryStore>>) -> Self {
        let scorer = RelevanceScorer::new()
            .with_window(config.window_turns)
            .with_heuristic(config.heuristic_scoring);

        let mut pipeline = Self::new(scorer)
            .with_threshold(config.relevance_threshold)
            .with_budget(config.budget_chars)
            .with_enabled(config.enabled)
            .with_fetcher(Arc::new(
                TodoFetcher::new(Arc::new(StaticTodoSource::builtin()))
                    .with_max_items(config.max_todos),
            ));

        if let Some(dir) = &config.documents_dir {
            pipeline = pipeline.with_fetcher(Arc::new(
                DocumentFetcher::new(dir.clone())
                    .with_max_documents(config.max_documents)
                    .with_min_score(config.min_document_score)
                    .with_chunk_chars(config.chunk_chars),
            ));
        }

        if let Some(store) = memory {
            pipeline = pipeline.with_fetcher(Arc::new(
                MemoryFetcher::new(store).with_max_results(config.max_memories),
            ));
        }

        pipeline
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ContextFetcher>) -> Self {
        self.fetchers.push(fetcher);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_profiler(mut self, profiler: Arc<Profiler>) -> Self {
        self.profiler = Some(profiler);
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn fetcher_sources(&self) -> Vec<ContextSource> {
        self.fetchers.iter().map(|f| f.source()).collect()
    }

    // ── Stages ────────────────────────────────────────────────────────

    pub fn score(&self, transcript: &[ConversationTurn]) -> ScoreStep {
        let start = transcript.len().saturating_sub(self.scorer.window());
        let window = transcript[start..].to_vec();
        let scores = self.scorer.score(&window);
        ScoreStep { window, scores }
    }

    /// Run every fetcher behind its gate, in registration order.
    pub async fn fetch(&self, step: &ScoreStep, trace_id: Option<&str>) -> FetchStep {
        let request = FetchRequest::new(&step.window, &step.scores);
        let mut outcomes = Vec::with_capacity(self.fetchers.len());
        for fetcher in &self.fetchers {
            let span = Span::new(SpanKind::ContextFetch, fetcher.source().as_str());
            let outcome = gated_fetch(fetcher.as_ref(), &request, self.threshold).await;
            self.record(
                trace_id,
                span.with_meta("fetched", outcome.fetched)
                    .with_meta("items", outcome.items.len())
                    .finished(outcome.error.is_none()),
            );
            outcomes.push(outcome);
        }
        FetchStep { outcomes }
    }

    pub fn format(&self, score: &ScoreStep, fetch: &FetchStep) -> FormattedContext {
        formatter::build(&fetch.all_items(), &score.scores, self.budget)
    }

    /// Score, fetch and format for the current transcript.
    ///
    /// When `trace_id` names a trace in the attached profiler, one span is
    /// recorded per stage.
    pub async fn run(
        &self,
        transcript: &[ConversationTurn],
        trace_id: Option<&str>,
    ) -> PipelineOutput {
        if !self.enabled {
            return PipelineOutput {
                score: ScoreStep {
                    window: Vec::new(),
                    scores: RelevanceScores::zero(),
                },
                fetch: FetchStep::default(),
                context: FormattedContext::default(),
            };
        }

        let span = Span::new(SpanKind::RelevanceScoring, "scorer");
        let score = self.score(transcript);
        self.record(trace_id, span.finished(true));

        let fetch = self.fetch(&score, trace_id).await;

        let span = Span::new(SpanKind::ContextFormat, "formatter");
        let context = self.format(&score, &fetch);
        self.record(
            trace_id,
            span.with_meta("chars", context.text.len()).finished(true),
        );

        debug!(
            sources = ?context.attribution.sources_used,
            chars = context.text.len(),
            budget = self.budget,
            "Context assembled"
        );

        PipelineOutput {
            score,
            fetch,
            context,
        }
    }

    fn record(&self, trace_id: Option<&str>, span: Span) {
        if let (Some(profiler), Some(trace_id)) = (&self.profiler, trace_id) {
            if let Err(e) = profiler.record_span(trace_id, span) {
                warn!(error = %e, "Failed to record pipeline span");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{TodoItem, TodoSource};
    use crate::ContextError;
    use async_trait::async_trait;
    use diarycoach_core::MemoryRecord;
    use diarycoach_memory::InMemoryStore;

    struct BrokenTodos;

    #[async_trait]
    impl TodoSource for BrokenTodos {
        async fn todos(&self) -> Result<Vec<TodoItem>, ContextError> {
            Err(ContextError::Todos("todo service unreachable".into()))
        }
    }

    fn transcript(texts: &[&str]) -> Vec<ConversationTurn> {
        texts.iter().map(|t| ConversationTurn::user(*t)).collect()
    }

    fn default_pipeline() -> ContextPipeline {
        let store: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::with_records([MemoryRecord::new(
            "delegation",
            "Hand the onboarding doc to Sam",
        )]));
        ContextPipeline::from_config(&ContextConfig::default(), Some(store))
    }

    #[tokio::test]
    async fn low_score_skips_todos() {
        let pipeline = default_pipeline();
        let out = pipeline.run(&transcript(&["good morning"]), None).await;

        assert!(out.score.scores.get(ContextSource::Todos) < pipeline.threshold());
        assert!(!out.fetch.fetched(ContextSource::Todos));
        assert!(out.fetch.items(ContextSource::Todos).is_empty());
        assert!(out.fetch.outcome(ContextSource::Todos).unwrap().skip_reason.is_some());
    }

    #[tokio::test]
    async fn high_score_fetches_matching_todos() {
        let pipeline = default_pipeline();
        let out = pipeline
            .run(
                &transcript(&[
                    "my todo list today: the budget presentation is due, top priority task",
                ]),
                None,
            )
            .await;

        assert!(out.fetch.fetched(ContextSource::Todos));
        let todos = out.fetch.items(ContextSource::Todos);
        assert_eq!(todos[0].id, "todo-1");
        assert!(out.context.text.contains("Finish the Q3 budget presentation"));
        assert_eq!(out.context.attribution.sources_used, vec![ContextSource::Todos]);
    }

    #[tokio::test]
    async fn recall_request_injects_memory() {
        let pipeline = default_pipeline();
        let out = pipeline
            .run(&transcript(&["remember our delegation talk?"]), None)
            .await;

        assert!(out.fetch.fetched(ContextSource::Memory));
        assert!(out.context.text.contains("I remember we talked about delegation"));
    }

    #[tokio::test]
    async fn fetch_failure_degrades_to_no_context() {
        let pipeline = ContextPipeline::new(RelevanceScorer::new())
            .with_fetcher(Arc::new(TodoFetcher::new(Arc::new(BrokenTodos))));
        let out = pipeline
            .run(&transcript(&["todo list, tasks, priorities, deadlines today"]), None)
            .await;

        assert!(!out.fetch.fetched(ContextSource::Todos));
        assert_eq!(out.fetch.errors().len(), 1);
        assert!(out.fetch.errors()[0].1.contains("unreachable"));
        assert!(out.context.is_empty());
    }

    #[tokio::test]
    async fn spans_recorded_per_stage() {
        let profiler = Arc::new(Profiler::new());
        let pipeline = default_pipeline().with_profiler(profiler.clone());
        let trace_id = profiler.start_trace("session");
        pipeline.run(&transcript(&["good morning"]), Some(&trace_id)).await;

        let trace = profiler.get_trace(&trace_id).unwrap();
        assert_eq!(trace.count_of(SpanKind::RelevanceScoring), 1);
        assert_eq!(trace.count_of(SpanKind::ContextFetch), 2);
        assert_eq!(trace.count_of(SpanKind::ContextFormat), 1);
    }

    #[tokio::test]
    async fn disabled_pipeline_returns_nothing() {
        let config = ContextConfig {
            enabled: false,
            ..ContextConfig::default()
        };
        let pipeline = ContextPipeline::from_config(&config, None);
        let out = pipeline.run(&transcript(&["todo tasks priority today"]), None).await;
        assert!(out.fetch.outcomes.is_empty());
        assert!(out.context.is_empty());
    }

    #[test]
    fn score_uses_trailing_window() {
        let pipeline = ContextPipeline::new(RelevanceScorer::new().with_window(2));
        let step = pipeline.score(&transcript(&["a", "b", "c"]));
        assert_eq!(step.window.len(), 2);
        assert_eq!(step.window[0].content, "b");
    }

    #[test]
    fn from_config_registers_documents_when_configured() {
        let config = ContextConfig {
            documents_dir: Some("/tmp/notes".into()),
            ..ContextConfig::default()
        };
        let pipeline = ContextPipeline::from_config(&config, None);
        assert_eq!(
            pipeline.fetcher_sources(),
            vec![ContextSource::Todos, ContextSource::Documents]
        );
    }
}
