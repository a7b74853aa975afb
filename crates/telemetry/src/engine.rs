//! Thread-safe profiler: collects per-turn traces and serves stage summaries.

use crate::TelemetryError;
use crate::model::*;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Oldest completed traces are pruned past this many.
const MAX_TRACES: usize = 1_000;

/// Collects spans for every turn of every session it is handed to.
///
/// Construct one per process (or per test) and share it as
/// `Arc<Profiler>`. A disabled profiler accepts every call and records
/// nothing.
pub struct Profiler {
    enabled: bool,
    traces: RwLock<Vec<Trace>>,
}

impl Profiler {
    pub fn new() -> Self {
        Self {
            enabled: true,
            traces: RwLock::new(Vec::new()),
        }
    }

    /// A profiler that drops everything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            traces: RwLock::new(Vec::new()),
        }
    }

    // ── Trace management ──────────────────────────────────────────────

    /// Start a new trace for a turn, returning its id.
    pub fn start_trace(&self, session_id: impl Into<String>) -> String {
        let trace = Trace::new(session_id);
        let id = trace.id.clone();
        if !self.enabled {
            return id;
        }

        let mut traces = self.traces.write().unwrap_or_else(PoisonError::into_inner);
        if traces.len() >= MAX_TRACES {
            let drain_count = MAX_TRACES / 10;
            let mut removed = 0;
            traces.retain(|t| {
                if removed >= drain_count || t.ended_at.is_none() {
                    return true;
                }
                removed += 1;
                false
            });
        }
        traces.push(trace);
        id
    }

    pub fn end_trace(&self, trace_id: &str) {
        let mut traces = self.traces.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(trace) = traces.iter_mut().find(|t| t.id == trace_id) {
            trace.end();
        }
    }

    /// Record a finished span into a trace.
    pub fn record_span(&self, trace_id: &str, span: Span) -> Result<(), TelemetryError> {
        if !self.enabled {
            return Ok(());
        }
        tracing::trace!(
            stage = %span.kind,
            label = %span.label,
            duration_ms = span.duration_ms.unwrap_or(0),
            "Span recorded"
        );
        let mut traces = self.traces.write().unwrap_or_else(PoisonError::into_inner);
        match traces.iter_mut().find(|t| t.id == trace_id) {
            Some(trace) => {
                trace.add_span(span);
                Ok(())
            }
            None => Err(TelemetryError::UnknownTrace(trace_id.to_string())),
        }
    }

    // ── Queries ───────────────────────────────────────────────────────

    pub fn get_trace(&self, trace_id: &str) -> Option<Trace> {
        let traces = self.traces.read().unwrap_or_else(PoisonError::into_inner);
        traces.iter().find(|t| t.id == trace_id).cloned()
    }

    /// The most recent `limit` traces, newest first.
    pub fn recent_traces(&self, limit: usize) -> Vec<Trace> {
        let traces = self.traces.read().unwrap_or_else(PoisonError::into_inner);
        traces.iter().rev().take(limit).cloned().collect()
    }

    pub fn traces_for_session(&self, session_id: &str) -> Vec<Trace> {
        let traces = self.traces.read().unwrap_or_else(PoisonError::into_inner);
        traces
            .iter()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect()
    }

    pub fn trace_count(&self) -> usize {
        self.traces.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Count and timing per stage across every recorded trace.
    pub fn stage_summary(&self) -> BTreeMap<SpanKind, StageSummary> {
        let traces = self.traces.read().unwrap_or_else(PoisonError::into_inner);
        let mut summary: BTreeMap<SpanKind, StageSummary> = BTreeMap::new();
        for span in traces.iter().flat_map(|t| t.spans.iter()) {
            summary.entry(span.kind).or_default().add(span);
        }
        summary
    }

    /// Plain-text table of [`Profiler::stage_summary`].
    pub fn render_summary(&self) -> String {
        let summary = self.stage_summary();
        if summary.is_empty() {
            return "No stages recorded.".into();
        }
        let mut out = String::from("stage                count   total_ms   mean_ms   max_ms\n");
        for (kind, s) in &summary {
            out.push_str(&format!(
                "{:<20} {:>5} {:>10} {:>9.1} {:>8}\n",
                kind.to_string(),
                s.count,
                s.total_ms,
                s.mean_ms(),
                s.max_ms
            ));
        }
        out
    }

    /// All traces as pretty JSON.
    pub fn export_json(&self) -> Result<String, TelemetryError> {
        let traces = self.traces.read().unwrap_or_else(PoisonError::into_inner);
        Ok(serde_json::to_string_pretty(&*traces)?)
    }

    pub fn clear(&self) {
        self.traces.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timed(kind: SpanKind, label: &str, ms: u64, success: bool) -> Span {
        let mut span = Span::new(kind, label);
        span.end(success);
        span.duration_ms = Some(ms);
        span
    }

    #[test]
    fn start_and_end_trace() {
        let profiler = Profiler::new();
        let id = profiler.start_trace("session-1");
        assert!(profiler.get_trace(&id).unwrap().ended_at.is_none());
        profiler.end_trace(&id);
        assert!(profiler.get_trace(&id).unwrap().ended_at.is_some());
    }

    #[test]
    fn record_span_into_trace() {
        let profiler = Profiler::new();
        let id = profiler.start_trace("session-1");
        profiler
            .record_span(&id, timed(SpanKind::RelevanceScoring, "scorer", 2, true))
            .unwrap();
        let trace = profiler.get_trace(&id).unwrap();
        assert_eq!(trace.spans.len(), 1);
        assert_eq!(trace.spans[0].kind, SpanKind::RelevanceScoring);
    }

    #[test]
    fn unknown_trace_is_an_error() {
        let profiler = Profiler::new();
        let err = profiler
            .record_span("missing", timed(SpanKind::Turn, "turn", 1, true))
            .unwrap_err();
        assert!(matches!(err, TelemetryError::UnknownTrace(_)));
    }

    #[test]
    fn stage_summary_aggregates_across_traces() {
        let profiler = Profiler::new();
        for ms in [10, 30] {
            let id = profiler.start_trace("session-1");
            profiler
                .record_span(&id, timed(SpanKind::LlmCall, "claude", ms, true))
                .unwrap();
            profiler
                .record_span(&id, timed(SpanKind::ContextFetch, "todos", 1, false))
                .unwrap();
            profiler.end_trace(&id);
        }

        let summary = profiler.stage_summary();
        let llm = &summary[&SpanKind::LlmCall];
        assert_eq!(llm.count, 2);
        assert_eq!(llm.total_ms, 40);
        assert!((llm.mean_ms() - 20.0).abs() < f64::EPSILON);
        assert_eq!(summary[&SpanKind::ContextFetch].failures, 2);

        let table = profiler.render_summary();
        assert!(table.contains("llm_call"));
        assert!(table.contains("context_fetch"));
    }

    #[test]
    fn traces_for_session_filters() {
        let profiler = Profiler::new();
        profiler.start_trace("a");
        profiler.start_trace("b");
        profiler.start_trace("a");
        assert_eq!(profiler.traces_for_session("a").len(), 2);
        assert_eq!(profiler.recent_traces(1)[0].session_id, "a");
    }

    #[test]
    fn disabled_profiler_records_nothing() {
        let profiler = Profiler::disabled();
        let id = profiler.start_trace("session-1");
        assert!(profiler
            .record_span(&id, timed(SpanKind::Turn, "turn", 5, true))
            .is_ok());
        assert_eq!(profiler.trace_count(), 0);
        assert_eq!(profiler.render_summary(), "No stages recorded.");
    }

    #[test]
    fn export_json_contains_spans() {
        let profiler = Profiler::new();
        let id = profiler.start_trace("session-1");
        profiler
            .record_span(&id, timed(SpanKind::ProtocolTracking, "tracker", 1, true))
            .unwrap();
        let json = profiler.export_json().unwrap();
        assert!(json.contains("protocol_tracking"));
    }
}
