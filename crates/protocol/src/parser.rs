//! Protocol description parser.
//!
//! Recognised layout (case-insensitive, anything else is ignored):
//!
//! ```text
//! ## State 1: Find the Problem
//! Completion indicators: problem is, struggling with
//! Transition triggers: what's the crux
//! ```
//!
//! Phases are numbered 1..N in document order. A phase without a
//! `Completion indicators:` line gets defaults derived from its title
//! when the title mentions a problem or a crux.

use crate::ProtocolError;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^#{2,3}\s*(?:state|phase)\s+\d+\s*[:.\-]\s*(.+?)\s*$")
        .expect("heading pattern compiles")
});

const PROBLEM_DEFAULTS: &[&str] = &[
    "need to figure out",
    "problem is",
    "struggling with",
    "biggest challenge",
    "i need to",
    "working on",
];

const CRUX_DEFAULTS: &[&str] = &[
    "crux is",
    "crux seems to be",
    "root cause",
    "core issue",
    "really about",
];

/// The built-in five-phase morning ritual.
pub const MORNING_PROTOCOL: &str = "\
# Morning Ritual

## State 1: Find the Problem
Ask which single problem, if solved today, would make the biggest difference.
Completion indicators: need to figure out, problem is, struggling with, biggest challenge, i need to, working on
Transition triggers: what's the crux, let's find the crux, what makes this hard

## State 2: Identify the Crux
Dig for the one thing that makes the problem hard.
Completion indicators: crux is, crux seems to be, root cause, core issue, really about
Transition triggers: what options, what could you try, let's explore

## State 3: Explore Options
Generate two or three ways through the crux.
Completion indicators: i could, one option, another option, alternatively, what if i
Transition triggers: which will you commit to, what will you do, let's commit

## State 4: Commit to Action
Pick one concrete action for today.
Completion indicators: i will, i'll, i commit, my plan is, going to
Transition triggers: before we finish, one last thing, to close

## State 5: Close the Ritual
Reflect the commitment back and close warmly.
Completion indicators: thank you, thanks, feeling ready, i'm ready, let's go
Transition triggers: have a great day, go get it, see you tomorrow
";

/// One phase of a protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolState {
    /// 1-based position.
    pub number: usize,
    pub title: String,
    /// Lower-cased phrases that mark the phase as done.
    pub completion_indicators: BTreeSet<String>,
    /// Lower-cased phrases in the coach's reply that move on.
    pub transition_triggers: BTreeSet<String>,
}

impl ProtocolState {
    fn title_mentions(&self, word: &str) -> bool {
        self.title.to_lowercase().contains(word)
    }

    /// Whether this phase looks for the user's problem.
    pub fn is_problem_phase(&self) -> bool {
        self.title_mentions("problem")
    }

    /// Whether this phase looks for the crux.
    pub fn is_crux_phase(&self) -> bool {
        self.title_mentions("crux")
    }
}

/// A parsed, read-only protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    states: Vec<ProtocolState>,
}

impl Protocol {
    /// Parse a protocol description.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let mut states: Vec<ProtocolState> = Vec::new();

        for line in text.lines() {
            let trimmed = line.trim();
            if let Some(caps) = HEADING.captures(trimmed) {
                states.push(ProtocolState {
                    number: states.len() + 1,
                    title: caps[1].to_string(),
                    completion_indicators: BTreeSet::new(),
                    transition_triggers: BTreeSet::new(),
                });
                continue;
            }

            let Some(current) = states.last_mut() else {
                continue;
            };
            if let Some(list) = labelled_list(trimmed, "completion indicators") {
                current.completion_indicators.extend(list);
            } else if let Some(list) = labelled_list(trimmed, "transition triggers") {
                current.transition_triggers.extend(list);
            }
        }

        if states.is_empty() {
            return Err(ProtocolError::NoStates);
        }

        for state in &mut states {
            if state.completion_indicators.is_empty() {
                let defaults: &[&str] = if state.is_problem_phase() {
                    PROBLEM_DEFAULTS
                } else if state.is_crux_phase() {
                    CRUX_DEFAULTS
                } else {
                    &[]
                };
                state
                    .completion_indicators
                    .extend(defaults.iter().map(|s| s.to_string()));
            }
        }

        Ok(Self { states })
    }

    /// Read and parse a protocol file.
    pub fn from_file(path: &Path) -> Result<Self, ProtocolError> {
        let text = std::fs::read_to_string(path).map_err(|e| ProtocolError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&text)
    }

    /// The built-in morning ritual.
    pub fn morning() -> Self {
        Self::parse(MORNING_PROTOCOL).expect("built-in morning protocol parses")
    }

    pub fn states(&self) -> &[ProtocolState] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Phase by 1-based number.
    pub fn state(&self, number: usize) -> Option<&ProtocolState> {
        number.checked_sub(1).and_then(|i| self.states.get(i))
    }
}

/// `Label: a, b, "c"` → `{a, b, c}` (lower-cased), tolerating list bullets
/// and bold markers around the label.
fn labelled_list(line: &str, label: &str) -> Option<Vec<String>> {
    let line = line.trim_start_matches(['-', '*', ' ']);
    let (head, rest) = line.split_once(':')?;
    if head.trim_matches(['*', ' ']).to_lowercase() != label {
        return None;
    }
    Some(
        rest.trim_start_matches(['*', ' '])
            .split(',')
            .map(|s| s.trim().trim_matches(['"', '\'', '`']).trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}
