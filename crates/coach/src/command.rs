//! Classification of typed input into session commands.

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Leave without evaluating.
    Exit,
    /// End the session: evaluate and remember it.
    WrapUp,
    /// Evaluate and write a Deep Thoughts report.
    DeepReport,
    /// Anything else is a coaching message.
    Message(String),
}

const EXIT: &[&str] = &["exit", "quit", "bye", "goodbye"];

const WRAP_UP: &[&str] = &[
    "stop",
    "wrap up",
    "wrap it up",
    "end session",
    "end the session",
    "finish session",
    "done for today",
    "that's all",
];

const DEEP_REPORT: &[&str] = &[
    "deep report",
    "full report",
    "deep thoughts",
    "detailed report",
    "deep dive report",
];

impl SessionCommand {
    /// Classify one line of input.
    ///
    /// Commands must make up the whole input (ignoring case, surrounding
    /// whitespace and trailing punctuation), so "I can't stop procrastinating"
    /// stays a message.
    pub fn classify(input: &str) -> Self {
        let normalized = input
            .trim()
            .trim_end_matches(['.', '!', '?'])
            .trim()
            .to_lowercase();

        if EXIT.contains(&normalized.as_str()) {
            Self::Exit
        } else if DEEP_REPORT.contains(&normalized.as_str()) {
            Self::DeepReport
        } else if WRAP_UP.contains(&normalized.as_str()) {
            Self::WrapUp
        } else {
            Self::Message(input.trim().to_string())
        }
    }
}
