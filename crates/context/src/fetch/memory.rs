//! Memory fetcher: explicit recall of earlier conversations.
//!
//! Unlike the other fetchers this one is gated on intent, not on the
//! relevance threshold: it opens only when the latest user turn asks the
//! coach to remember something ("remember our delegation talk", "what did
//! we decide last time"). Once open it scores every stored record:
//!
//! - 0.5 × fraction of search terms found in the record
//! - +0.3 when a search term names the record's topic
//! - +0.2 for records from the last week, +0.1 for the last month
//!
//! A request with no topical terms ("what did we talk about last time?")
//! falls back to the most recent records, scored by recency alone.

use super::{ContextFetcher, FetchRequest};
use crate::ContextError;
use crate::source::{ContextItem, ContextSource};
use crate::text::{keywords, words};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diarycoach_core::{MemoryRecord, MemoryStore};
use regex_lite::Regex;
use std::sync::{Arc, LazyLock};

pub const DEFAULT_MAX_MEMORIES: usize = 3;

const OVERLAP_WEIGHT: f32 = 0.5;
const TOPIC_BONUS: f32 = 0.3;
const WEEK_BONUS: f32 = 0.2;
const MONTH_BONUS: f32 = 0.1;

static RECALL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bremember (?:when|what|our|that|the|how)\b",
        r"\bdo you remember\b",
        r"\brecall\b",
        r"\bwhat did (?:we|i) (?:say|talk about|discuss|decide)\b",
        r"\blast time we\b",
        r"\bwe (?:talked|spoke|chatted) about\b",
        r"\bwe discussed\b",
        r"\byou (?:said|mentioned|told me)\b",
        r"\bremind me (?:what|about|of|how)\b",
        r"\b(?:our|that) (?:previous|earlier|last) (?:talk|conversation|chat|session)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("recall pattern compiles"))
    .collect()
});

/// Words that say "recall" rather than what to recall.
const RECALL_WORDS: &[&str] = &[
    "remember", "recall", "remind", "talk", "talked", "talking", "conversation", "conversations",
    "discuss", "discussed", "discussion", "chat", "chatted", "session", "said", "spoke",
    "mentioned", "told", "last", "time", "previous", "earlier", "decide", "decided", "say",
];

/// Whether `text` explicitly asks the coach to remember something.
pub fn is_recall_request(text: &str) -> bool {
    let lower = text.to_lowercase();
    RECALL_PATTERNS.iter().any(|p| p.is_match(&lower))
}

/// Topical search terms of a recall request.
pub fn search_terms(text: &str) -> Vec<String> {
    keywords(text)
        .into_iter()
        .filter(|w| !RECALL_WORDS.contains(&w.as_str()))
        .collect()
}

fn recency_bonus(record: &MemoryRecord, now: DateTime<Utc>) -> f32 {
    match now.signed_duration_since(record.created_at).num_days() {
        d if d <= 7 => WEEK_BONUS,
        d if d <= 30 => MONTH_BONUS,
        _ => 0.0,
    }
}

/// Score one record against the search terms.
///
/// With terms, records with neither term overlap nor a topic match score
/// 0.0 whatever their age. Without terms the score is the recency bonus.
pub fn score_record(record: &MemoryRecord, terms: &[String], now: DateTime<Utc>) -> f32 {
    if terms.is_empty() {
        return recency_bonus(record, now);
    }
    let haystack = words(&format!(
        "{} {} {} {}",
        record.topic,
        record.summary,
        record.content,
        record.tags.join(" ")
    ));
    let found = terms.iter().filter(|t| haystack.contains(t)).count();
    let overlap = OVERLAP_WEIGHT * found as f32 / terms.len() as f32;

    let topic = record.topic.to_lowercase();
    let topic_words = words(&topic);
    let topic_bonus = if terms.iter().any(|t| topic_words.contains(t) || *t == topic) {
        TOPIC_BONUS
    } else {
        0.0
    };

    if overlap == 0.0 && topic_bonus == 0.0 {
        return 0.0;
    }

    (overlap + topic_bonus + recency_bonus(record, now)).clamp(0.0, 1.0)
}

/// Canned recall line for one record.
pub fn render_recall(record: &MemoryRecord) -> String {
    format!(
        "I remember we talked about {} on {}: {}",
        record.topic,
        record.created_at.format("%B %-d, %Y"),
        record.summary
    )
}

pub struct MemoryFetcher {
    store: Arc<dyn MemoryStore>,
    max_results: usize,
}

impl MemoryFetcher {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self {
            store,
            max_results: DEFAULT_MAX_MEMORIES,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Rank stored records for `query`, best first.
    ///
    /// A query without topical terms returns the newest records.
    pub async fn recall(
        &self,
        query: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<(f32, MemoryRecord)>, ContextError> {
        let terms = search_terms(query);
        let generic = terms.is_empty();
        let mut ranked: Vec<(f32, MemoryRecord)> = self
            .store
            .all()
            .await?
            .into_iter()
            .map(|r| (score_record(&r, &terms, now), r))
            .filter(|(score, _)| generic || *score > 0.0)
            .collect();
        if generic {
            ranked.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at));
        } else {
            ranked.sort_by(|a, b| {
                b.0.total_cmp(&a.0)
                    .then_with(|| b.1.created_at.cmp(&a.1.created_at))
            });
        }
        ranked.truncate(self.max_results);
        Ok(ranked)
    }
}

#[async_trait]
impl ContextFetcher for MemoryFetcher {
    fn source(&self) -> ContextSource {
        ContextSource::Memory
    }

    /// Opens on an explicit recall phrase, whatever the relevance score.
    fn gate(&self, request: &FetchRequest<'_>, _threshold: f32) -> Result<(), String> {
        if is_recall_request(request.latest_user_text()) {
            Ok(())
        } else {
            Err("no explicit recall request in the latest user turn".into())
        }
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<Vec<ContextItem>, ContextError> {
        let ranked = self.recall(request.latest_user_text(), Utc::now()).await?;
        Ok(ranked
            .into_iter()
            .map(|(score, record)| {
                ContextItem::new(ContextSource::Memory, &record.id, render_recall(&record), score)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::gated_fetch;
    use crate::source::RelevanceScores;
    use chrono::Duration;
    use diarycoach_core::ConversationTurn;
    use diarycoach_memory::InMemoryStore;

    fn record(topic: &str, summary: &str, days_ago: i64) -> MemoryRecord {
        MemoryRecord::new(topic, summary).with_created_at(Utc::now() - Duration::days(days_ago))
    }

    #[test]
    fn recall_phrases_detected() {
        assert!(is_recall_request("Remember our delegation talk?"));
        assert!(is_recall_request("what did we decide about hiring"));
        assert!(is_recall_request("Last time we spoke you said to block mornings"));
        assert!(!is_recall_request("good morning"));
        assert!(!is_recall_request("I need to figure out my week"));
    }

    #[test]
    fn search_terms_drop_recall_words() {
        assert_eq!(search_terms("remember our delegation talk"), vec!["delegation"]);
    }

    #[test]
    fn delegation_record_scores_high() {
        let terms = search_terms("remember our delegation talk");
        let rec = record("delegation", "Hand the onboarding doc to Sam", 60);
        let score = score_record(&rec, &terms, Utc::now());
        // full overlap + topic match, too old for a recency bonus
        assert!((score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn recency_bonus_tiers() {
        let terms = vec!["sleep".to_string()];
        let now = Utc::now();
        let week = score_record(&record("sleep", "Bed by eleven", 3), &terms, now);
        let month = score_record(&record("sleep", "Bed by eleven", 20), &terms, now);
        let old = score_record(&record("sleep", "Bed by eleven", 90), &terms, now);
        assert!((week - 1.0).abs() < 1e-6);
        assert!((month - 0.9).abs() < 1e-6);
        assert!((old - 0.8).abs() < 1e-6);
    }

    #[test]
    fn unrelated_recent_record_scores_zero() {
        let terms = vec!["delegation".to_string()];
        let score = score_record(&record("sleep", "Bed by eleven", 0), &terms, Utc::now());
        assert_eq!(score, 0.0);
    }

    #[tokio::test]
    async fn delegation_memory_returned_first() {
        let store = Arc::new(InMemoryStore::with_records([
            record("sleep", "Bed by eleven on weeknights", 2),
            record("delegation", "Hand the onboarding doc to Sam", 10),
            record("hiring", "Delegation of interviews to the leads", 40),
        ]));
        let fetcher = MemoryFetcher::new(store);
        let window = [ConversationTurn::user("remember our delegation talk")];
        let scores = RelevanceScores::zero();
        let outcome = gated_fetch(&fetcher, &FetchRequest::new(&window, &scores), 0.6).await;

        assert!(outcome.fetched);
        assert_eq!(outcome.items.len(), 2);
        assert!(outcome.items[0].content.contains("delegation"));
        assert!(outcome.items[0].content.starts_with("I remember we talked about delegation on "));
        assert!(outcome.items[0].score > 0.3);
        assert!(outcome.items[0].score > outcome.items[1].score);
    }

    #[tokio::test]
    async fn gate_ignores_threshold_but_requires_recall_phrase() {
        let store =
            Arc::new(InMemoryStore::with_records([record("focus", "No slack before ten", 1)]));
        let fetcher = MemoryFetcher::new(store);
        let scores = RelevanceScores::from_pairs([(ContextSource::Memory, 1.0)]);

        let window = [ConversationTurn::user("focus is hard")];
        let outcome = gated_fetch(&fetcher, &FetchRequest::new(&window, &scores), 0.6).await;
        assert!(!outcome.fetched);
        assert!(outcome.skip_reason.is_some());
    }

    #[tokio::test]
    async fn generic_recall_returns_most_recent_sessions() {
        let store = Arc::new(InMemoryStore::with_records([
            record("hiring", "Interview loop for the lead role", 45),
            record("sleep", "Bed by eleven on weeknights", 1),
            record("delegation", "Hand the onboarding doc to Sam", 12),
            record("budget", "Call finance before noon", 90),
        ]));
        let fetcher = MemoryFetcher::new(store);
        let window = [ConversationTurn::user("What did we talk about last time?")];
        assert!(search_terms(window[0].content.as_str()).is_empty());

        let scores = RelevanceScores::zero();
        let outcome = gated_fetch(&fetcher, &FetchRequest::new(&window, &scores), 0.6).await;
        assert!(outcome.fetched);
        assert_eq!(outcome.items.len(), DEFAULT_MAX_MEMORIES);
        assert!(outcome.items[0].content.contains("about sleep"));
        assert!(outcome.items[1].content.contains("about delegation"));
        assert!(outcome.items[2].content.contains("about hiring"));

        let ranked = fetcher
            .recall("do you remember what we discussed?", Utc::now())
            .await
            .unwrap();
        assert_eq!(ranked.len(), DEFAULT_MAX_MEMORIES);
        assert_eq!(ranked[0].1.topic, "sleep");
    }

    #[tokio::test]
    async fn top_three_only() {
        let store = Arc::new(InMemoryStore::with_records(
            (0..5).map(|i| record("focus", &format!("Focus idea {i}"), i)),
        ));
        let fetcher = MemoryFetcher::new(store);
        let ranked = fetcher.recall("do you remember my focus plan", Utc::now()).await.unwrap();
        assert_eq!(ranked.len(), DEFAULT_MAX_MEMORIES);
    }
}
