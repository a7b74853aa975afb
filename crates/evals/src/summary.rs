//! Running the analyzer set and summarising the verdicts.

use crate::analyzer::{Analyzer, EvalScore};
use crate::executor::{ParallelExecutor, TaskResult};
use diarycoach_core::Transcript;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// All verdicts for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub scores: Vec<EvalScore>,
}

impl EvaluationSummary {
    /// Mean score, or `None` when nothing was evaluated.
    pub fn overall(&self) -> Option<f32> {
        if self.scores.is_empty() {
            return None;
        }
        Some(self.scores.iter().map(|s| s.score).sum::<f32>() / self.scores.len() as f32)
    }

    pub fn failures(&self) -> usize {
        self.scores.iter().filter(|s| s.failed).count()
    }

    pub fn score_for(&self, analyzer: &str) -> Option<&EvalScore> {
        self.scores.iter().find(|s| s.analyzer == analyzer)
    }

    /// Human-readable block shown when a session ends.
    pub fn render(&self) -> String {
        let Some(overall) = self.overall() else {
            return "No evaluation was run.".to_string();
        };
        let mut out = format!("Session evaluation (overall {overall:.2})\n");
        for score in &self.scores {
            out.push_str(&format!(
                "- {}: {:.2}. {}\n",
                score.analyzer, score.score, score.reasoning
            ));
        }
        out.trim_end().to_string()
    }
}

/// Run every analyzer over `transcript` on `executor`.
///
/// A timed-out analyzer contributes a fallback score so the summary always
/// has one entry per analyzer, in the analyzers' order.
pub async fn evaluate_all(
    analyzers: &[Arc<dyn Analyzer>],
    transcript: &Transcript,
    executor: &ParallelExecutor,
) -> EvaluationSummary {
    let tasks: Vec<_> = analyzers
        .iter()
        .map(|analyzer| analyzer.analyze(transcript))
        .collect();
    let results = executor.run(tasks).await;

    let scores: Vec<EvalScore> = analyzers
        .iter()
        .zip(results)
        .map(|(analyzer, result)| match result {
            TaskResult::Completed { value, .. } => value,
            TaskResult::TimedOut { after } => EvalScore::fallback(
                analyzer.name(),
                format!("timed out after {}ms", after.as_millis()),
            ),
        })
        .collect();

    let summary = EvaluationSummary { scores };
    info!(
        analyzers = summary.scores.len(),
        failures = summary.failures(),
        overall = summary.overall().unwrap_or_default(),
        "Session evaluated"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedAnalyzer {
        name: &'static str,
        score: f32,
        delay: Duration,
    }

    #[async_trait]
    impl Analyzer for FixedAnalyzer {
        fn name(&self) -> &str {
            self.name
        }

        async fn analyze(&self, _transcript: &Transcript) -> EvalScore {
            tokio::time::sleep(self.delay).await;
            EvalScore::new(self.name, self.score, "fixed")
        }
    }

    fn fixed(name: &'static str, score: f32, delay_secs: u64) -> Arc<dyn Analyzer> {
        Arc::new(FixedAnalyzer {
            name,
            score,
            delay: Duration::from_secs(delay_secs),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn summary_averages_and_marks_timeouts() {
        let analyzers = vec![fixed("a", 1.0, 0), fixed("b", 0.6, 0), fixed("slow", 0.9, 30)];
        let executor = ParallelExecutor::new(4, Duration::from_secs(5));
        let summary = evaluate_all(&analyzers, &Transcript::new(), &executor).await;

        assert_eq!(summary.scores.len(), 3);
        let slow = summary.score_for("slow").unwrap();
        assert!(slow.failed);
        assert!(slow.reasoning.contains("timed out"));
        assert_eq!(summary.failures(), 1);
        assert!((summary.overall().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn render_lists_each_analyzer() {
        let summary = EvaluationSummary {
            scores: vec![
                EvalScore::new("actionability", 0.8, "Clear next step."),
                EvalScore::fallback("empathy", "network"),
            ],
        };
        let text = summary.render();
        assert!(text.starts_with("Session evaluation (overall 0.65)"));
        assert!(text.contains("- actionability: 0.80. Clear next step."));
        assert!(text.contains("- empathy: 0.50. Evaluation failed: network"));
    }

    #[test]
    fn empty_summary_renders_placeholder() {
        let summary = EvaluationSummary::default();
        assert!(summary.overall().is_none());
        assert_eq!(summary.render(), "No evaluation was run.");
    }
}
