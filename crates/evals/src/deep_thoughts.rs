//! Deep Thoughts: a longer reflective report written after a session.

use crate::summary::EvaluationSummary;
use diarycoach_core::{ConversationTurn, Provider, ProviderRequest, Transcript};
use std::sync::Arc;
use tracing::{info, warn};

const SYSTEM_PROMPT: &str = "You are a thoughtful executive coach writing a private \
reflection for your client after a morning session. Be specific, warm and brief.";

/// Everything the report is written from.
#[derive(Debug, Clone, Copy)]
pub struct ReportInput<'a> {
    pub transcript: &'a Transcript,
    pub problem: Option<&'a str>,
    pub crux: Option<&'a str>,
    pub evaluation: Option<&'a EvaluationSummary>,
}

impl<'a> ReportInput<'a> {
    pub fn new(transcript: &'a Transcript) -> Self {
        Self {
            transcript,
            problem: None,
            crux: None,
            evaluation: None,
        }
    }

    pub fn with_problem(mut self, problem: Option<&'a str>) -> Self {
        self.problem = problem;
        self
    }

    pub fn with_crux(mut self, crux: Option<&'a str>) -> Self {
        self.crux = crux;
        self
    }

    pub fn with_evaluation(mut self, evaluation: &'a EvaluationSummary) -> Self {
        self.evaluation = Some(evaluation);
        self
    }
}

/// Generated report text.
#[derive(Debug, Clone, PartialEq)]
pub struct DeepThoughtsReport {
    pub content: String,
    /// True when the model call failed and `content` is the fallback body.
    pub fallback: bool,
}

pub struct DeepThoughtsGenerator {
    provider: Arc<dyn Provider>,
    model: String,
    max_tokens: u32,
}

impl DeepThoughtsGenerator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: 1500,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn prompt(input: &ReportInput<'_>) -> String {
        let mut prompt = String::from(
            "Write a Deep Thoughts report on this coaching session with three short parts:\n\
             1. What the session was really about\n\
             2. Patterns worth noticing\n\
             3. One question to sit with today\n\n",
        );
        if let Some(problem) = input.problem {
            prompt.push_str(&format!("Problem: {problem}\n"));
        }
        if let Some(crux) = input.crux {
            prompt.push_str(&format!("Crux: {crux}\n"));
        }
        if let Some(evaluation) = input.evaluation {
            prompt.push_str(&format!("\n{}\n", evaluation.render()));
        }
        prompt.push_str(&format!("\nConversation:\n{}", input.transcript.render()));
        prompt
    }

    /// Write the report. Never fails; a provider error yields the fallback body.
    pub async fn generate(&self, input: ReportInput<'_>) -> DeepThoughtsReport {
        let request = ProviderRequest::new(
            self.model.clone(),
            vec![ConversationTurn::user(Self::prompt(&input))],
        )
        .with_system(SYSTEM_PROMPT)
        .with_max_tokens(self.max_tokens);

        match self.provider.generate(request).await {
            Ok(response) if !response.content.trim().is_empty() => {
                info!(chars = response.content.len(), "Deep Thoughts report generated");
                DeepThoughtsReport {
                    content: response.content.trim().to_string(),
                    fallback: false,
                }
            }
            Ok(_) => {
                warn!("Deep Thoughts reply was empty");
                Self::fallback(&input, "empty reply")
            }
            Err(e) => {
                warn!(error = %e, "Deep Thoughts generation failed");
                Self::fallback(&input, &e.to_string())
            }
        }
    }

    fn fallback(input: &ReportInput<'_>, cause: &str) -> DeepThoughtsReport {
        let mut content =
            format!("# Deep Thoughts\n\nThe full report could not be written ({cause}).\n");
        content.push_str(&format!(
            "\nProblem: {}\nCrux: {}\n",
            input.problem.unwrap_or("not identified"),
            input.crux.unwrap_or("not identified"),
        ));
        if let Some(evaluation) = input.evaluation {
            content.push_str(&format!("\n{}\n", evaluation.render()));
        }
        DeepThoughtsReport {
            content,
            fallback: true,
        }
    }
}
