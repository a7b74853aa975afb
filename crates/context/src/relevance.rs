//! Relevance scoring: which context sources matter for this turn.
//!
//! Scoring rules are data: a table of [`PatternRule`]s mapping a regex to a
//! source. For each source the scorer counts matches over the lower-cased
//! trailing window:
//!
//! ```text
//! pattern = min(0.25 × matches, 0.8) + 0.15 × distinct_rules_matched
//! ```
//!
//! clamped to [0, 1]. With the heuristic pass enabled, an independent
//! keyword score is blended in as `0.4 × pattern + 0.6 × heuristic`.
//!
//! Scoring is pure: the same window always yields the same scores.

use crate::ContextError;
use crate::source::{ContextSource, RelevanceScores};
use diarycoach_core::ConversationTurn;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const PER_MATCH: f32 = 0.25;
const MATCH_CAP: f32 = 0.8;
const PER_DISTINCT_RULE: f32 = 0.15;
const PATTERN_WEIGHT: f32 = 0.4;
const HEURISTIC_WEIGHT: f32 = 0.6;
const PER_KEYWORD_HIT: f32 = 0.35;

/// Default number of trailing turns considered.
pub const DEFAULT_WINDOW: usize = 5;

/// One scoring rule: text matching `pattern` is evidence for `source`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRule {
    pub source: ContextSource,
    pub pattern: String,
}

impl PatternRule {
    pub fn new(source: ContextSource, pattern: impl Into<String>) -> Self {
        Self {
            source,
            pattern: pattern.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    source: ContextSource,
    regex: Regex,
}

/// The built-in rule table. Patterns run against lower-cased text.
pub fn builtin_rules() -> Vec<PatternRule> {
    use ContextSource::*;
    [
        (Todos, r"\b(?:todos?|to-dos?|tasks?|checklist|to do list)\b"),
        (Todos, r"\b(?:priorit(?:y|ies|ize)|urgent|deadlines?|due)\b"),
        (Todos, r"\b(?:today|morning|tomorrow|this week)\b"),
        (Todos, r"\b(?:get done|working on|focus on|what should i)\b"),
        (Todos, r"\b(?:finish|ship|complete|deliver)(?:ed|ing|es|s)?\b"),
        (Documents, r"\b(?:docs?|documents?|notes?|files?)\b"),
        (Documents, r"\b(?:wrote|written|draft|journal|diary|entry)\b"),
        (Documents, r"\b(?:framework|principles?|values|strategy|vision)\b"),
        (Documents, r"\b(?:according to|in my notes|look up|i noted)\b"),
        (Memory, r"\b(?:remember|recall|remind(?:s|ed)? me)\b"),
        (Memory, r"\b(?:last time|last week|yesterday|previously|earlier)\b"),
        (Memory, r"\b(?:we talked|we discussed|we spoke|our (?:talk|conversation|chat|session))\b"),
        (Memory, r"\b(?:again|keep coming back|same as before)\b"),
        (Calendar, r"\b(?:meetings?|calls?|appointments?|1:1|one-on-one|standup)\b"),
        (Calendar, r"\b(?:schedule[ds]?|calendar|booked|busy)\b"),
        (Calendar, r"\b(?:morning|afternoon|evening|today|tomorrow)\b"),
        (Calendar, r"\b(?:\d{1,2}(?::\d{2})?\s?(?:am|pm)|noon)\b"),
    ]
    .into_iter()
    .map(|(source, pattern)| PatternRule::new(source, pattern))
    .collect()
}

static BUILTIN_COMPILED: LazyLock<Vec<CompiledRule>> = LazyLock::new(|| {
    compile(&builtin_rules()).expect("built-in relevance patterns compile")
});

/// Keywords for the heuristic pass, matched as substrings.
fn heuristic_keywords(source: ContextSource) -> &'static [&'static str] {
    match source {
        ContextSource::Todos => &[
            "todo", "task", "priority", "deadline", "plan", "finish", "list", "get done",
        ],
        ContextSource::Documents => &[
            "document", "notes", "wrote", "written", "article", "journal", "framework", "read",
        ],
        ContextSource::Memory => &[
            "remember", "recall", "last time", "talked about", "discussed", "before", "mentioned",
        ],
        ContextSource::Calendar => &[
            "meeting", "calendar", "schedule", "appointment", "call", "event", "morning",
        ],
    }
}

fn compile(rules: &[PatternRule]) -> Result<Vec<CompiledRule>, ContextError> {
    rules
        .iter()
        .map(|rule| {
            Regex::new(&rule.pattern)
                .map(|regex| CompiledRule {
                    source: rule.source,
                    regex,
                })
                .map_err(|e| ContextError::InvalidPattern {
                    family: rule.source,
                    pattern: rule.pattern.clone(),
                    reason: e.to_string(),
                })
        })
        .collect()
}

/// Scores the trailing window of a conversation per source.
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    rules: Vec<CompiledRule>,
    window: usize,
    heuristic: bool,
}

impl RelevanceScorer {
    /// Scorer over the built-in rule table, pattern pass only.
    pub fn new() -> Self {
        Self {
            rules: BUILTIN_COMPILED.clone(),
            window: DEFAULT_WINDOW,
            heuristic: false,
        }
    }

    /// Scorer over a custom rule table. Every pattern is compiled here, so
    /// an invalid one fails now rather than at scoring time.
    pub fn with_rules(rules: &[PatternRule]) -> Result<Self, ContextError> {
        Ok(Self {
            rules: compile(rules)?,
            window: DEFAULT_WINDOW,
            heuristic: false,
        })
    }

    /// Number of trailing turns to consider (at least 1).
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    /// Blend in the heuristic keyword pass.
    pub fn with_heuristic(mut self, enabled: bool) -> Self {
        self.heuristic = enabled;
        self
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Score the last `window` turns of `turns`.
    pub fn score(&self, turns: &[ConversationTurn]) -> RelevanceScores {
        let start = turns.len().saturating_sub(self.window);
        let text = turns[start..]
            .iter()
            .map(|t| t.content.to_lowercase())
            .collect::<Vec<_>>()
            .join("\n");
        self.score_text(&text)
    }

    /// Score already-concatenated text. The text is lower-cased here.
    pub fn score_text(&self, text: &str) -> RelevanceScores {
        let text = text.to_lowercase();
        let mut scores = RelevanceScores::zero();
        if text.trim().is_empty() {
            return scores;
        }

        for source in ContextSource::ALL {
            let pattern = self.pattern_score(source, &text);
            let score = if self.heuristic {
                PATTERN_WEIGHT * pattern + HEURISTIC_WEIGHT * heuristic_score(source, &text)
            } else {
                pattern
            };
            scores.set(source, score);
        }
        scores
    }

    fn pattern_score(&self, source: ContextSource, text: &str) -> f32 {
        let mut matches = 0usize;
        let mut distinct = 0usize;
        for rule in self.rules.iter().filter(|r| r.source == source) {
            let n = rule.regex.find_iter(text).count();
            if n > 0 {
                matches += n;
                distinct += 1;
            }
        }
        let raw = (PER_MATCH * matches as f32).min(MATCH_CAP) + PER_DISTINCT_RULE * distinct as f32;
        raw.clamp(0.0, 1.0)
    }
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self::new()
    }
}

fn heuristic_score(source: ContextSource, text: &str) -> f32 {
    let hits = heuristic_keywords(source)
        .iter()
        .filter(|kw| text.contains(*kw))
        .count();
    (hits as f32 * PER_KEYWORD_HIT).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turns(texts: &[&str]) -> Vec<ConversationTurn> {
        texts.iter().map(|t| ConversationTurn::user(*t)).collect()
    }

    #[test]
    fn builtin_rules_compile() {
        assert!(RelevanceScorer::with_rules(&builtin_rules()).is_ok());
    }

    #[test]
    fn empty_input_scores_zero_everywhere() {
        let scores = RelevanceScorer::new().score(&[]);
        for source in ContextSource::ALL {
            assert_eq!(scores.get(source), 0.0);
        }
    }

    #[test]
    fn good_morning_raises_todos_and_calendar() {
        let scorer = RelevanceScorer::new();
        let morning = scorer.score(&turns(&["good morning"]));
        let neutral = scorer.score(&turns(&["I'm feeling overwhelmed"]));

        assert!(morning.get(ContextSource::Todos) > neutral.get(ContextSource::Todos));
        assert!(morning.get(ContextSource::Calendar) > neutral.get(ContextSource::Calendar));
        assert!(neutral.get(ContextSource::Todos) < 0.3);
    }

    #[test]
    fn single_match_formula() {
        let scores = RelevanceScorer::new().score(&turns(&["good morning"]));
        // one match of one rule: 0.25 + 0.15
        assert!((scores.get(ContextSource::Todos) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn match_count_is_capped() {
        let rules = [PatternRule::new(ContextSource::Todos, r"\btask\b")];
        let scorer = RelevanceScorer::with_rules(&rules).unwrap();
        let scores = scorer.score_text("task task task task task task");
        // min(1.5, 0.8) + 0.15
        assert!((scores.get(ContextSource::Todos) - 0.95).abs() < 1e-6);
    }

    #[test]
    fn scores_stay_in_unit_range() {
        let scorer = RelevanceScorer::new().with_heuristic(true);
        let noisy = "todo tasks priority deadline today morning finish \
                     meetings calendar schedule 9am remember last time we talked notes draft";
        let scores = scorer.score_text(&noisy.repeat(5));
        for (_, v) in scores.iter() {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn scoring_is_idempotent() {
        let scorer = RelevanceScorer::new().with_heuristic(true);
        let window = turns(&["gm", "I have a meeting at 10am and three tasks due"]);
        assert_eq!(scorer.score(&window), scorer.score(&window));
    }

    #[test]
    fn only_trailing_window_counts() {
        let scorer = RelevanceScorer::new().with_window(2);
        let window = turns(&["my todo list is huge", "hmm", "okay"]);
        assert_eq!(scorer.score(&window).get(ContextSource::Todos), 0.0);
        assert!(RelevanceScorer::new().score(&window).get(ContextSource::Todos) > 0.0);
    }

    #[test]
    fn scoring_is_case_insensitive() {
        let scorer = RelevanceScorer::new();
        assert_eq!(scorer.score_text("GOOD MORNING"), scorer.score_text("good morning"));
    }

    #[test]
    fn heuristic_blend_weights() {
        let rules = [PatternRule::new(ContextSource::Memory, r"\bremember\b")];
        let scorer = RelevanceScorer::with_rules(&rules)
            .unwrap()
            .with_heuristic(true);
        let scores = scorer.score_text("remember");
        // pattern 0.4, heuristic 0.35
        let expected = 0.4 * 0.4 + 0.6 * 0.35;
        assert!((scores.get(ContextSource::Memory) - expected).abs() < 1e-6);
    }

    #[test]
    fn invalid_custom_pattern_is_rejected() {
        let rules = [PatternRule::new(ContextSource::Documents, "(unclosed")];
        let err = RelevanceScorer::with_rules(&rules).unwrap_err();
        match err {
            ContextError::InvalidPattern { family, pattern, .. } => {
                assert_eq!(family, ContextSource::Documents);
                assert_eq!(pattern, "(unclosed");
            }
            other => panic!("Expected InvalidPattern, got: {other:?}"),
        }
    }

    #[test]
    fn custom_rules_replace_builtins() {
        let rules = [PatternRule::new(ContextSource::Calendar, r"\bdentist\b")];
        let scorer = RelevanceScorer::with_rules(&rules).unwrap();
        let scores = scorer.score_text("good morning, dentist later");
        assert_eq!(scores.get(ContextSource::Todos), 0.0);
        assert!(scores.get(ContextSource::Calendar) > 0.0);
    }
}
