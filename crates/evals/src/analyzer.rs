//! LLM-judged coaching analyzers.
//!
//! Each analyzer asks the model one question about the transcript and
//! expects a reply of the form:
//!
//! ```text
//! SCORE: 0.8
//! REASONING: The coach named the problem early and checked it back.
//! ```
//!
//! Anything else (provider error, missing score) becomes a neutral 0.5
//! with a reasoning line starting "Evaluation failed".

use async_trait::async_trait;
use diarycoach_core::{ConversationTurn, Provider, ProviderRequest, Transcript};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use tracing::warn;

/// Score used whenever an evaluation cannot be completed.
pub const FALLBACK_SCORE: f32 = 0.5;

static SCORE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*\**score\**\s*:\s*\**\s*([0-9]+(?:\.[0-9]+)?)(\s*/\s*10)?")
        .expect("score pattern compiles")
});

static REASONING_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\**reasoning\**\s*:\s*\**\s*(.+)").expect("reasoning pattern compiles")
});

/// One analyzer's verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalScore {
    pub analyzer: String,
    /// In [0, 1].
    pub score: f32,
    pub reasoning: String,
    /// True when this is the neutral fallback rather than a real verdict.
    pub failed: bool,
}

impl EvalScore {
    pub fn new(analyzer: impl Into<String>, score: f32, reasoning: impl Into<String>) -> Self {
        Self {
            analyzer: analyzer.into(),
            score: score.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
            failed: false,
        }
    }

    /// The neutral stand-in for an evaluation that could not run.
    pub fn fallback(analyzer: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self {
            analyzer: analyzer.into(),
            score: FALLBACK_SCORE,
            reasoning: format!("Evaluation failed: {cause}"),
            failed: true,
        }
    }
}

/// Parse a `SCORE:` / `REASONING:` reply into `(score, reasoning)`.
///
/// Scores above 1 and up to 10 (or written `n/10`) are read as a ten-point
/// scale. Returns `None` when no usable score is present.
pub fn parse_evaluation(reply: &str) -> Option<(f32, String)> {
    let caps = SCORE_LINE.captures(reply)?;
    let mut score: f32 = caps[1].parse().ok()?;
    if caps.get(2).is_some() || (score > 1.0 && score <= 10.0) {
        score /= 10.0;
    }
    if !(0.0..=1.0).contains(&score) {
        return None;
    }
    let reasoning = REASONING_LINE
        .captures(reply)
        .map(|c| c[1].trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| "No reasoning given.".to_string());
    Some((score, reasoning))
}

/// Something that grades a finished (or in-progress) session.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;

    /// Never fails: problems are folded into a fallback [`EvalScore`].
    async fn analyze(&self, transcript: &Transcript) -> EvalScore;
}

/// An analyzer defined by a criterion and rubric, judged by an LLM.
pub struct LlmAnalyzer {
    name: String,
    criterion: String,
    rubric: String,
    provider: Arc<dyn Provider>,
    model: String,
}

impl LlmAnalyzer {
    pub fn new(
        name: impl Into<String>,
        criterion: impl Into<String>,
        rubric: impl Into<String>,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            criterion: criterion.into(),
            rubric: rubric.into(),
            provider,
            model: model.into(),
        }
    }

    fn prompt(&self, transcript: &Transcript) -> String {
        format!(
            "Evaluate this coaching conversation on one criterion.\n\n\
             Criterion: {}\n\
             Rubric: {}\n\n\
             Conversation:\n{}\n\n\
             Reply with exactly two lines:\n\
             SCORE: <number between 0.0 and 1.0>\n\
             REASONING: <one or two sentences>",
            self.criterion,
            self.rubric,
            transcript.render()
        )
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, transcript: &Transcript) -> EvalScore {
        if transcript.is_empty() {
            return EvalScore::fallback(&self.name, "empty transcript");
        }
        let request = ProviderRequest::new(
            self.model.clone(),
            vec![ConversationTurn::user(self.prompt(transcript))],
        )
        .with_system("You are a strict, fair evaluator of coaching conversations.")
        .with_temperature(0.0)
        .with_max_tokens(300);

        match self.provider.generate(request).await {
            Ok(response) => match parse_evaluation(&response.content) {
                Some((score, reasoning)) => EvalScore::new(&self.name, score, reasoning),
                None => {
                    warn!(analyzer = %self.name, "Evaluator reply had no usable SCORE line");
                    EvalScore::fallback(&self.name, "could not parse evaluator reply")
                }
            },
            Err(e) => {
                warn!(analyzer = %self.name, error = %e, "Evaluator call failed");
                EvalScore::fallback(&self.name, e)
            }
        }
    }
}

/// The standard coaching analyzers.
pub fn default_analyzers(provider: Arc<dyn Provider>, model: &str) -> Vec<Arc<dyn Analyzer>> {
    [
        (
            "problem_definition",
            "Did the coach help the user name one specific problem to work on?",
            "1.0 = a concrete, user-owned problem was stated and confirmed; \
             0.0 = no problem surfaced.",
        ),
        (
            "crux_identification",
            "Did the coach help find the crux: the one thing that makes the problem hard?",
            "1.0 = a crux was named and the user agreed; 0.5 = circled it; 0.0 = never explored.",
        ),
        (
            "actionability",
            "Did the session end with a concrete action the user committed to?",
            "1.0 = specific action with a time; 0.5 = vague intention; 0.0 = nothing actionable.",
        ),
        (
            "question_quality",
            "Were the coach's questions open, short and one at a time?",
            "1.0 = consistently open single questions; 0.0 = leading, stacked or advice-heavy.",
        ),
        (
            "protocol_adherence",
            "Did the coach follow the morning ritual: problem, crux, options, commitment, close?",
            "1.0 = every phase in order; 0.5 = some phases skipped; 0.0 = no structure.",
        ),
    ]
    .into_iter()
    .map(|(name, criterion, rubric)| {
        Arc::new(LlmAnalyzer::new(name, criterion, rubric, provider.clone(), model))
            as Arc<dyn Analyzer>
    })
    .collect()
}
