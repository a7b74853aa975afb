//! Source fetchers and the gate that wraps them.
//!
//! A fetcher only runs when its gate opens. The default gate is a plain
//! threshold on the source's relevance score. Whatever happens inside the
//! fetch (I/O failure, missing directory, store error) the caller gets a
//! [`FetchOutcome`] back, never an error.

pub mod documents;
pub mod memory;
pub mod todos;

pub use documents::DocumentFetcher;
pub use memory::MemoryFetcher;
pub use todos::{StaticTodoSource, TodoFetcher, TodoItem, TodoSource};

use crate::ContextError;
use crate::source::{ContextItem, ContextSource, RelevanceScores};
use async_trait::async_trait;
use diarycoach_core::{ConversationTurn, Role};
use serde::Serialize;
use tracing::{debug, warn};

/// Default gate threshold: a source is fetched only above this score.
pub const DEFAULT_THRESHOLD: f32 = 0.6;

/// Everything a fetcher may look at for one turn.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    /// The trailing window the scores were computed from.
    pub window: &'a [ConversationTurn],
    pub scores: &'a RelevanceScores,
}

impl<'a> FetchRequest<'a> {
    pub fn new(window: &'a [ConversationTurn], scores: &'a RelevanceScores) -> Self {
        Self { window, scores }
    }

    /// Text of the most recent user turn in the window ("" if none).
    pub fn latest_user_text(&self) -> &'a str {
        self.window
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .unwrap_or("")
    }

    /// Every turn of the window joined by newlines.
    pub fn window_text(&self) -> String {
        self.window
            .iter()
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Result of one gated fetch. This doubles as the usage-tracking record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchOutcome {
    pub source: ContextSource,
    /// True only when the gate opened and the fetch succeeded.
    pub fetched: bool,
    pub items: Vec<ContextItem>,
    /// Why the gate stayed closed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// Why the fetch failed after the gate opened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchOutcome {
    fn skipped(source: ContextSource, reason: String) -> Self {
        Self {
            source,
            fetched: false,
            items: Vec::new(),
            skip_reason: Some(reason),
            error: None,
        }
    }

    fn failed(source: ContextSource, error: String) -> Self {
        Self {
            source,
            fetched: false,
            items: Vec::new(),
            skip_reason: None,
            error: Some(error),
        }
    }

    fn succeeded(source: ContextSource, items: Vec<ContextItem>) -> Self {
        Self {
            source,
            fetched: true,
            items,
            skip_reason: None,
            error: None,
        }
    }
}

/// A conditional source of context items.
#[async_trait]
pub trait ContextFetcher: Send + Sync {
    fn source(&self) -> ContextSource;

    /// Decide whether to fetch. `Err` carries the skip reason.
    fn gate(&self, request: &FetchRequest<'_>, threshold: f32) -> Result<(), String> {
        let score = request.scores.get(self.source());
        if score > threshold {
            Ok(())
        } else {
            Err(format!(
                "{} relevance {score:.2} not above threshold {threshold:.2}",
                self.source()
            ))
        }
    }

    /// Retrieve items. Only called once the gate has opened.
    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<Vec<ContextItem>, ContextError>;
}

/// Run `fetcher` behind its gate, catching every failure.
pub async fn gated_fetch(
    fetcher: &dyn ContextFetcher,
    request: &FetchRequest<'_>,
    threshold: f32,
) -> FetchOutcome {
    let source = fetcher.source();

    if let Err(reason) = fetcher.gate(request, threshold) {
        debug!(source = %source, reason = %reason, "Context fetch skipped");
        return FetchOutcome::skipped(source, reason);
    }

    match fetcher.fetch(request).await {
        Ok(items) => {
            debug!(source = %source, items = items.len(), "Context fetched");
            FetchOutcome::succeeded(source, items)
        }
        Err(e) => {
            warn!(source = %source, error = %e, "Context fetch failed, continuing without it");
            FetchOutcome::failed(source, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CountingFetcher {
        calls: Mutex<usize>,
        fail: bool,
    }

    impl CountingFetcher {
        fn new(fail: bool) -> Self {
            Self {
                calls: Mutex::new(0),
                fail,
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ContextFetcher for CountingFetcher {
        fn source(&self) -> ContextSource {
            ContextSource::Todos
        }

        async fn fetch(
            &self,
            _request: &FetchRequest<'_>,
        ) -> Result<Vec<ContextItem>, ContextError> {
            *self.calls.lock().unwrap() += 1;
            if self.fail {
                return Err(ContextError::Todos("backend unavailable".into()));
            }
            Ok(vec![ContextItem::new(ContextSource::Todos, "t1", "Ship the deck", 1.0)])
        }
    }

    #[tokio::test]
    async fn below_threshold_is_skipped() {
        let fetcher = CountingFetcher::new(false);
        let scores = RelevanceScores::from_pairs([(ContextSource::Todos, 0.2)]);
        let window = [ConversationTurn::user("hello")];
        let request = FetchRequest::new(&window, &scores);
        let outcome = gated_fetch(&fetcher, &request, DEFAULT_THRESHOLD).await;

        assert!(!outcome.fetched);
        assert!(outcome.items.is_empty());
        assert!(outcome.skip_reason.unwrap().contains("0.20"));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn threshold_is_exclusive() {
        let fetcher = CountingFetcher::new(false);
        let scores = RelevanceScores::from_pairs([(ContextSource::Todos, 0.6)]);
        let outcome = gated_fetch(&fetcher, &FetchRequest::new(&[], &scores), 0.6).await;
        assert!(!outcome.fetched);
    }

    #[tokio::test]
    async fn above_threshold_fetches() {
        let fetcher = CountingFetcher::new(false);
        let scores = RelevanceScores::from_pairs([(ContextSource::Todos, 0.9)]);
        let request = FetchRequest::new(&[], &scores);
        let outcome = gated_fetch(&fetcher, &request, DEFAULT_THRESHOLD).await;
        assert!(outcome.fetched);
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn failure_is_recorded_not_propagated() {
        let fetcher = CountingFetcher::new(true);
        let scores = RelevanceScores::from_pairs([(ContextSource::Todos, 0.9)]);
        let request = FetchRequest::new(&[], &scores);
        let outcome = gated_fetch(&fetcher, &request, DEFAULT_THRESHOLD).await;
        assert!(!outcome.fetched);
        assert!(outcome.items.is_empty());
        assert!(outcome.error.unwrap().contains("backend unavailable"));
        assert!(outcome.skip_reason.is_none());
    }

    #[test]
    fn latest_user_text_skips_agent_turns() {
        let window = [
            ConversationTurn::user("first"),
            ConversationTurn::agent("reply"),
        ];
        let scores = RelevanceScores::zero();
        let request = FetchRequest::new(&window, &scores);
        assert_eq!(request.latest_user_text(), "first");
        assert_eq!(request.window_text(), "first\nreply");
    }
}
