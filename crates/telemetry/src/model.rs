//! Data model for stage spans, turn traces, and per-stage summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Span ──────────────────────────────────────────────────────────────────

/// The pipeline stage a span measures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// Relevance scoring over the trailing window.
    RelevanceScoring,
    /// One gated source fetch.
    ContextFetch,
    /// Budgeted formatting of fetched items.
    ContextFormat,
    /// A provider generation call.
    LlmCall,
    /// Protocol tracker observation.
    ProtocolTracking,
    /// Self-evaluation or report generation.
    Evaluation,
    /// Top-level turn (user message → coach reply).
    Turn,
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RelevanceScoring => write!(f, "relevance_scoring"),
            Self::ContextFetch => write!(f, "context_fetch"),
            Self::ContextFormat => write!(f, "context_format"),
            Self::LlmCall => write!(f, "llm_call"),
            Self::ProtocolTracking => write!(f, "protocol_tracking"),
            Self::Evaluation => write!(f, "evaluation"),
            Self::Turn => write!(f, "turn"),
        }
    }
}

/// A single timed stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub id: String,
    pub kind: SpanKind,
    /// Human-readable label (e.g. source name, model name).
    pub label: String,
    pub started_at: DateTime<Utc>,
    /// None while running.
    pub ended_at: Option<DateTime<Utc>>,
    /// Computed on end.
    pub duration_ms: Option<u64>,
    pub success: Option<bool>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Span {
    /// Start a span now.
    pub fn new(kind: SpanKind, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            label: label.into(),
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            success: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Attach a metadata value.
    pub fn with_meta(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Mark the span as ended with the given success status.
    pub fn end(&mut self, success: bool) {
        let now = Utc::now();
        self.ended_at = Some(now);
        self.duration_ms = Some(
            now.signed_duration_since(self.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
        self.success = Some(success);
    }

    /// End the span and hand it back, for one-expression recording.
    pub fn finished(mut self, success: bool) -> Self {
        self.end(success);
        self
    }
}

// ── Trace ─────────────────────────────────────────────────────────────────

/// All spans recorded for one coaching turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub id: String,
    /// Session this trace belongs to.
    pub session_id: String,
    pub spans: Vec<Span>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Trace {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            spans: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn add_span(&mut self, span: Span) {
        self.spans.push(span);
    }

    pub fn end(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    pub fn count_of(&self, kind: SpanKind) -> usize {
        self.spans.iter().filter(|s| s.kind == kind).count()
    }

    pub fn failures(&self) -> usize {
        self.spans.iter().filter(|s| s.success == Some(false)).count()
    }
}

// ── Summary ───────────────────────────────────────────────────────────────

/// Aggregate timing for one stage across every recorded trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub count: usize,
    pub failures: usize,
    pub total_ms: u64,
    pub max_ms: u64,
}

impl StageSummary {
    pub fn mean_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms as f64 / self.count as f64
        }
    }

    pub(crate) fn add(&mut self, span: &Span) {
        let ms = span.duration_ms.unwrap_or(0);
        self.count += 1;
        self.total_ms += ms;
        self.max_ms = self.max_ms.max(ms);
        if span.success == Some(false) {
            self.failures += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_end_sets_duration() {
        let mut span = Span::new(SpanKind::LlmCall, "claude");
        assert!(span.duration_ms.is_none());
        span.end(true);
        assert!(span.ended_at.is_some());
        assert!(span.duration_ms.is_some());
        assert_eq!(span.success, Some(true));
    }

    #[test]
    fn span_metadata() {
        let span = Span::new(SpanKind::ContextFetch, "todos").with_meta("items", 3);
        assert_eq!(span.metadata["items"], 3);
    }

    #[test]
    fn trace_counts() {
        let mut trace = Trace::new("session-1");
        trace.add_span(Span::new(SpanKind::ContextFetch, "todos").finished(true));
        trace.add_span(Span::new(SpanKind::ContextFetch, "documents").finished(false));
        trace.add_span(Span::new(SpanKind::LlmCall, "claude").finished(true));
        assert_eq!(trace.count_of(SpanKind::ContextFetch), 2);
        assert_eq!(trace.failures(), 1);
    }

    #[test]
    fn summary_mean() {
        let mut summary = StageSummary::default();
        assert_eq!(summary.mean_ms(), 0.0);
        let mut a = Span::new(SpanKind::Turn, "a");
        a.duration_ms = Some(10);
        let mut b = Span::new(SpanKind::Turn, "b");
        b.duration_ms = Some(30);
        b.success = Some(false);
        summary.add(&a);
        summary.add(&b);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.max_ms, 30);
        assert_eq!(summary.failures, 1);
        assert!((summary.mean_ms() - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn kind_display_matches_serde() {
        let json = serde_json::to_string(&SpanKind::RelevanceScoring).unwrap();
        assert_eq!(json, format!("\"{}\"", SpanKind::RelevanceScoring));
    }
}
