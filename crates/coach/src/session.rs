//! One coaching conversation, end to end.

use crate::CoachError;
use crate::command::SessionCommand;
use crate::persona::{PERSONA, build_system_prompt};
use diarycoach_config::{AppConfig, ContextConfig};
use diarycoach_context::text::keywords;
use diarycoach_context::{ContextAttribution, ContextPipeline, RelevanceScores};
use diarycoach_core::{
    ConversationTurn, MemoryRecord, MemoryStore, Provider, ProviderRequest, SessionId, Transcript,
};
use diarycoach_evals::{
    Analyzer, DeepThoughtsGenerator, EvaluationSummary, ParallelExecutor, ReportInput,
    default_analyzers, evaluate_all,
};
use diarycoach_protocol::ProtocolTracker;
use diarycoach_providers::RetryProvider;
use diarycoach_telemetry::{Profiler, Span, SpanKind};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shown in place of a coach reply when a turn fails.
const APOLOGY: &str = "I'm sorry, something went wrong on my side and I couldn't respond just now. \
Could you say that again?";

/// What a coaching turn produced, for callers that want more than the text.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub reply: String,
    pub scores: RelevanceScores,
    pub attribution: ContextAttribution,
    /// Nudge queued for the next turn's system prompt.
    pub nudge: Option<String>,
    pub protocol_state: usize,
}

/// The result of handling one line of input.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutput {
    Reply(String),
    Evaluation(String),
    Report(String),
    Exit,
}

impl SessionOutput {
    pub fn text(&self) -> &str {
        match self {
            Self::Reply(s) | Self::Evaluation(s) | Self::Report(s) => s,
            Self::Exit => "",
        }
    }
}

pub struct CoachSession {
    id: SessionId,
    transcript: Transcript,
    provider: Arc<dyn Provider>,
    model: String,
    analysis_model: String,
    temperature: f32,
    max_tokens: u32,
    pipeline: ContextPipeline,
    tracker: ProtocolTracker,
    pending_nudge: Option<String>,
    profiler: Arc<Profiler>,
    memory: Option<Arc<dyn MemoryStore>>,
    save_sessions: bool,
    /// Id and content of the last record stored this session.
    last_saved: Option<(String, String)>,
    analyzers: Vec<Arc<dyn Analyzer>>,
    executor: ParallelExecutor,
    evaluation_enabled: bool,
}

impl CoachSession {
    /// A session with default context settings, the morning ritual and the
    /// standard analyzers, all backed by `provider`.
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        let model = model.into();
        let profiler = Arc::new(Profiler::new());
        Self {
            id: SessionId::new(),
            transcript: Transcript::new(),
            analyzers: default_analyzers(provider.clone(), &model),
            provider,
            analysis_model: model.clone(),
            model,
            temperature: 0.7,
            max_tokens: 1024,
            pipeline: ContextPipeline::from_config(&ContextConfig::default(), None)
                .with_profiler(profiler.clone()),
            tracker: ProtocolTracker::morning(),
            pending_nudge: None,
            profiler,
            memory: None,
            save_sessions: false,
            last_saved: None,
            executor: ParallelExecutor::default(),
            evaluation_enabled: true,
        }
    }

    /// Build a session from application config.
    ///
    /// `provider` is wrapped in a [`RetryProvider`]; the memory store named
    /// by `[memory]` backs both recall and end-of-session saving.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
    ) -> Result<Self, CoachError> {
        config.validate()?;

        let provider: Arc<dyn Provider> =
            Arc::new(RetryProvider::from_config(provider, &config.retry));
        let profiler = Arc::new(if config.telemetry.enabled {
            Profiler::new()
        } else {
            Profiler::disabled()
        });
        let memory = diarycoach_memory::open_store(&config.memory);
        let pipeline = ContextPipeline::from_config(&config.context, Some(memory.clone()))
            .with_profiler(profiler.clone());
        let tracker = ProtocolTracker::from_config(&config.protocol)?;

        info!(
            model = %config.model,
            memory = memory.name(),
            sources = ?pipeline.fetcher_sources(),
            "Coaching session configured"
        );

        Ok(Self {
            id: SessionId::new(),
            transcript: Transcript::new(),
            analyzers: default_analyzers(provider.clone(), config.analysis_model()),
            provider,
            model: config.model.clone(),
            analysis_model: config.analysis_model().to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            pipeline,
            tracker,
            pending_nudge: None,
            profiler,
            memory: Some(memory),
            save_sessions: config.memory.save_sessions,
            last_saved: None,
            executor: ParallelExecutor::from_config(&config.evaluation),
            evaluation_enabled: config.evaluation.enabled,
        })
    }

    pub fn with_pipeline(mut self, pipeline: ContextPipeline) -> Self {
        self.pipeline = pipeline.with_profiler(self.profiler.clone());
        self
    }

    pub fn with_tracker(mut self, tracker: ProtocolTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Store a record of the session here on wrap-up.
    pub fn with_memory(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(store);
        self.save_sessions = true;
        self
    }

    pub fn with_analyzers(mut self, analyzers: Vec<Arc<dyn Analyzer>>) -> Self {
        self.analyzers = analyzers;
        self
    }

    pub fn with_executor(mut self, executor: ParallelExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_profiler(mut self, profiler: Arc<Profiler>) -> Self {
        self.pipeline = self.pipeline.with_profiler(profiler.clone());
        self.profiler = profiler;
        self
    }

    // ── Accessors ──

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn tracker(&self) -> &ProtocolTracker {
        &self.tracker
    }

    pub fn pending_nudge(&self) -> Option<&str> {
        self.pending_nudge.as_deref()
    }

    pub fn profiler(&self) -> &Arc<Profiler> {
        &self.profiler
    }

    // ── Input handling ──

    /// Classify `input` and act on it. Never fails.
    pub async fn handle(&mut self, input: &str) -> SessionOutput {
        match SessionCommand::classify(input) {
            SessionCommand::Exit => SessionOutput::Exit,
            SessionCommand::WrapUp => SessionOutput::Evaluation(self.wrap_up().await),
            SessionCommand::DeepReport => SessionOutput::Report(self.deep_report().await),
            SessionCommand::Message(text) => SessionOutput::Reply(self.respond(&text).await),
        }
    }

    /// Run a coaching turn, turning any failure into an apology.
    pub async fn respond(&mut self, user_text: &str) -> String {
        match self.process_turn(user_text).await {
            Ok(outcome) => outcome.reply,
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Turn failed");
                APOLOGY.to_string()
            }
        }
    }

    /// Run one coaching turn.
    ///
    /// On error the transcript, tracker and pending nudge are left exactly
    /// as they were.
    pub async fn process_turn(&mut self, user_text: &str) -> Result<TurnOutcome, CoachError> {
        let trace_id = self.profiler.start_trace(self.id.to_string());
        let result = self.run_turn(user_text, &trace_id).await;

        let turn_span = Span::new(SpanKind::Turn, "turn").finished(result.is_ok());
        if let Err(e) = self.profiler.record_span(&trace_id, turn_span) {
            debug!(error = %e, "Turn span not recorded");
        }
        self.profiler.end_trace(&trace_id);
        result
    }

    async fn run_turn(
        &mut self,
        user_text: &str,
        trace_id: &str,
    ) -> Result<TurnOutcome, CoachError> {
        let user_turn = ConversationTurn::user(user_text);
        let mut turns = self.transcript.turns().to_vec();
        turns.push(user_turn.clone());

        let context = self.pipeline.run(&turns, Some(trace_id)).await;
        for (source, error) in context.fetch.errors() {
            debug!(%source, error, "Context source degraded");
        }

        let system = build_system_prompt(
            PERSONA,
            &self.tracker.status_line(),
            &context.context.text,
            self.pending_nudge.as_deref(),
        );
        let request = ProviderRequest::new(self.model.clone(), turns)
            .with_system(system)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let llm_span = Span::new(SpanKind::LlmCall, self.provider.name().to_string());
        let response = self.provider.generate(request).await;
        self.record(trace_id, llm_span.finished(response.is_ok()));
        let response = response?;

        let reply = response.content.trim().to_string();
        if reply.is_empty() {
            return Err(CoachError::EmptyReply);
        }

        let before = self.tracker.current_state_number();
        let nudge = self.tracker.observe(user_text, &reply);
        let after = self.tracker.current_state_number();
        self.record(
            trace_id,
            Span::new(SpanKind::ProtocolTracking, "tracker")
                .with_meta("from", before)
                .with_meta("to", after)
                .with_meta("nudged", nudge.is_some())
                .finished(true),
        );

        self.transcript.push(user_turn);
        self.transcript.push(ConversationTurn::agent(reply.clone()));
        self.pending_nudge = nudge.clone();

        info!(
            session_id = %self.id,
            turns = self.transcript.len(),
            protocol_state = after,
            context_chars = context.context.text.len(),
            "Turn complete"
        );

        Ok(TurnOutcome {
            reply,
            scores: context.score.scores,
            attribution: context.context.attribution,
            nudge,
            protocol_state: after,
        })
    }

    fn record(&self, trace_id: &str, span: Span) {
        if let Err(e) = self.profiler.record_span(trace_id, span) {
            debug!(error = %e, "Span not recorded");
        }
    }

    // ── End of session ──

    /// Run the analyzers over the transcript so far.
    pub async fn evaluate(&self) -> EvaluationSummary {
        if !self.evaluation_enabled || self.transcript.is_empty() {
            return EvaluationSummary::default();
        }
        let trace_id = self.profiler.start_trace(self.id.to_string());
        let span = Span::new(SpanKind::Evaluation, "analyzers");
        let summary = evaluate_all(&self.analyzers, &self.transcript, &self.executor).await;
        self.record(
            &trace_id,
            span.with_meta("failures", summary.failures()).finished(summary.failures() == 0),
        );
        self.profiler.end_trace(&trace_id);
        summary
    }

    /// Evaluate the session and remember it. Returns the rendered summary.
    pub async fn wrap_up(&mut self) -> String {
        let summary = self.evaluate().await;
        self.save_session().await;
        summary.render()
    }

    /// Evaluate and write a Deep Thoughts report.
    pub async fn deep_report(&mut self) -> String {
        let summary = self.evaluate().await;
        let generator =
            DeepThoughtsGenerator::new(self.provider.clone(), self.analysis_model.clone());
        let input = ReportInput::new(&self.transcript)
            .with_problem(self.tracker.problem())
            .with_crux(self.tracker.crux())
            .with_evaluation(&summary);
        let report = generator.generate(input).await;
        self.save_session().await;
        report.content
    }

    /// Store a record built from the tracked problem and crux.
    ///
    /// Nothing is stored when saving is off, no store is attached or no
    /// problem was identified. A record identical to the last one saved in
    /// this session is not stored again; its id is returned instead.
    pub async fn save_session(&mut self) -> Option<String> {
        if !self.save_sessions {
            return None;
        }
        let store = self.memory.as_ref()?;
        let problem = self.tracker.problem()?;

        let topic = keywords(problem).into_iter().take(3).collect::<Vec<_>>().join(" ");
        let summary = match self.tracker.crux() {
            Some(crux) => format!("{problem} The crux: {crux}."),
            None => problem.to_string(),
        };
        let mut record = MemoryRecord::new(topic, summary).with_content(self.transcript.render());
        record.tags = vec!["session".into(), "morning".into()];

        let fingerprint = format!("{}\n{}\n{}", record.topic, record.summary, record.content);
        if let Some((id, last)) = &self.last_saved {
            if *last == fingerprint {
                debug!(session_id = %self.id, memory_id = %id, "Session unchanged since last save");
                return Some(id.clone());
            }
        }

        match store.store(record).await {
            Ok(id) => {
                info!(session_id = %self.id, memory_id = %id, "Session saved to memory");
                self.last_saved = Some((id.clone(), fingerprint));
                Some(id)
            }
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Failed to save session");
                None
            }
        }
    }

    /// Start over: new id, empty transcript, fresh tracker, no nudge.
    pub fn reset(&mut self) {
        self.id = SessionId::new();
        self.transcript = Transcript::new();
        self.tracker.reset();
        self.pending_nudge = None;
        self.last_saved = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use diarycoach_core::{ProviderError, ProviderResponse};
    use diarycoach_memory::InMemoryStore;
    use std::sync::Mutex;

    /// Replies from a script; records every request.
    struct ScriptedProvider {
        replies: Mutex<Vec<Result<String, ProviderError>>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn last_system(&self) -> String {
            self.requests
                .lock()
                .unwrap()
                .last()
                .and_then(|r| r.system.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            let model = request.model.clone();
            self.requests.lock().unwrap().push(request);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(ProviderError::NotConfigured("script exhausted".into())));
            reply.map(|content| ProviderResponse {
                content,
                model,
                usage: None,
            })
        }
    }

    #[tokio::test]
    async fn turn_appends_exchange_and_tracks_protocol() {
        let provider = ScriptedProvider::new(vec![Ok("Good morning! What's on your mind?".into())]);
        let mut session = CoachSession::new(provider.clone(), "test-model");

        let outcome = session.process_turn("good morning").await.unwrap();

        assert_eq!(outcome.reply, "Good morning! What's on your mind?");
        assert_eq!(outcome.protocol_state, 1);
        assert_eq!(session.transcript().len(), 2);
        let system = provider.last_system();
        assert!(system.starts_with("You are DiaryCoach"));
        assert!(system.contains("Morning protocol: not started"));
    }

    #[tokio::test]
    async fn failed_turn_apologises_and_leaves_state_untouched() {
        let provider =
            ScriptedProvider::new(vec![Err(ProviderError::AuthenticationFailed("bad key".into()))]);
        let mut session = CoachSession::new(provider, "test-model");

        let reply = session.respond("good morning").await;

        assert!(reply.starts_with("I'm sorry"));
        assert!(session.transcript().is_empty());
        assert_eq!(session.tracker().current_state_number(), 0);
    }

    #[tokio::test]
    async fn empty_reply_is_an_error() {
        let provider = ScriptedProvider::new(vec![Ok("   ".into())]);
        let mut session = CoachSession::new(provider, "test-model");
        let err = session.process_turn("gm").await.unwrap_err();
        assert!(matches!(err, CoachError::EmptyReply));
    }

    #[tokio::test]
    async fn nudge_reaches_the_next_system_prompt() {
        let replies = (0..6).map(|_| Ok("Tell me more.".to_string())).collect();
        let provider = ScriptedProvider::new(replies);
        let mut session = CoachSession::new(provider.clone(), "test-model");

        session.respond("gm").await;
        for _ in 0..4 {
            session.respond("hmm, not sure").await;
        }
        let nudge = session.pending_nudge().map(str::to_string);
        assert!(nudge.as_deref().is_some_and(|n| n.starts_with("[NUDGE:")));

        session.respond("still thinking").await;
        assert!(provider.last_system().contains(nudge.as_deref().unwrap()));
    }

    #[tokio::test]
    async fn turn_is_traced_per_stage() {
        let provider = ScriptedProvider::new(vec![Ok("Morning!".into())]);
        let mut session = CoachSession::new(provider, "test-model");
        session.process_turn("gm").await.unwrap();

        let traces = session.profiler().recent_traces(1);
        let trace = &traces[0];
        assert_eq!(trace.count_of(SpanKind::RelevanceScoring), 1);
        assert_eq!(trace.count_of(SpanKind::LlmCall), 1);
        assert_eq!(trace.count_of(SpanKind::ProtocolTracking), 1);
        assert_eq!(trace.count_of(SpanKind::Turn), 1);
    }

    #[tokio::test]
    async fn commands_do_not_reach_the_coach() {
        let provider = ScriptedProvider::new(vec![]);
        let mut session = CoachSession::new(provider.clone(), "test-model");

        assert_eq!(session.handle("quit").await, SessionOutput::Exit);
        let output = session.handle("wrap up").await;
        assert_eq!(output, SessionOutput::Evaluation("No evaluation was run.".into()));
        assert!(provider.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn wrap_up_then_deep_report_saves_once() {
        let provider = ScriptedProvider::new(vec![
            Ok("Morning!".into()),
            Ok("What makes it hard?".into()),
            Ok("# Deep Thoughts\n\nStart with the first hour.".into()),
        ]);
        let store = Arc::new(InMemoryStore::new());
        let mut session = CoachSession::new(provider, "test-model")
            .with_analyzers(Vec::new())
            .with_memory(store.clone());

        session.respond("gm").await;
        session.respond("I need to figure out my week").await;
        session.handle("wrap up").await;
        let SessionOutput::Report(report) = session.handle("deep report").await else {
            panic!("expected a report");
        };

        assert!(report.contains("first hour"));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reset_clears_the_conversation() {
        let provider = ScriptedProvider::new(vec![Ok("Morning!".into())]);
        let mut session = CoachSession::new(provider, "test-model");
        session.respond("gm").await;
        let old_id = session.id().clone();

        session.reset();

        assert!(session.transcript().is_empty());
        assert_eq!(session.tracker().current_state_number(), 0);
        assert!(session.pending_nudge().is_none());
        assert_ne!(session.id(), &old_id);
    }
}
