//! Protocol tracker: a forward-only state machine over conversation turns.
//!
//! State 0 means the ritual has not started; states 1..N are the protocol's
//! phases. Per observed turn at most one transition happens:
//!
//! - `0 → 1` when the user greets ("morning", "gm").
//! - `k → k+1` when the user or coach text contains a completion indicator
//!   of phase k, or the coach text contains one of its transition triggers.
//!
//! The current state never decreases and a completed phase stays
//! completed. When a phase runs for more than `nudge_after` exchanges the
//! tracker returns a nudge for the next system prompt instead of forcing a
//! transition.
//!
//! The problem is only recorded from user text that matches a problem
//! indicator. If the coach moved the ritual on first, later user turns can
//! still fill it in; the crux is retried the same way until one is found.

use crate::ProtocolError;
use crate::parser::{Protocol, ProtocolState};
use diarycoach_config::ProtocolConfig;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;
use tracing::{debug, info};

pub const DEFAULT_NUDGE_AFTER: u32 = 3;

static GREETING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:morning|gm)\b").expect("greeting pattern compiles")
});

static CRUX_TEMPLATES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)crux (?:is|seems to be) ([^.!?]+)",
        r"(?i)root cause (?:is|seems to be) ([^.!?]+)",
        r"(?i)core issue (?:is|seems to be) ([^.!?]+)",
        r"(?i)(?:it's|it is) really about ([^.!?]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("crux pattern compiles"))
    .collect()
});

/// Mutable per-session tracker state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerState {
    /// 0 = not started, otherwise the 1-based phase in progress.
    pub current_state_number: usize,
    /// Exchanges observed per phase.
    pub exchanges: BTreeMap<usize, u32>,
    /// First user text that matched a problem-phase indicator, verbatim.
    pub problem: Option<String>,
    /// Crux phrase pulled from the conversation.
    pub crux: Option<String>,
    pub completed: BTreeSet<usize>,
}

pub struct ProtocolTracker {
    protocol: Protocol,
    nudge_after: u32,
    state: TrackerState,
}

impl ProtocolTracker {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            nudge_after: DEFAULT_NUDGE_AFTER,
            state: TrackerState::default(),
        }
    }

    /// Tracker over the built-in morning ritual.
    pub fn morning() -> Self {
        Self::new(Protocol::morning())
    }

    /// Tracker for a `[protocol]` config section.
    pub fn from_config(config: &ProtocolConfig) -> Result<Self, ProtocolError> {
        let protocol = match &config.description_file {
            Some(path) => Protocol::from_file(path)?,
            None => Protocol::morning(),
        };
        Ok(Self::new(protocol).with_nudge_after(config.nudge_after))
    }

    pub fn with_nudge_after(mut self, nudge_after: u32) -> Self {
        self.nudge_after = nudge_after;
        self
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn current_state_number(&self) -> usize {
        self.state.current_state_number
    }

    /// The phase in progress (None before the greeting).
    pub fn current_phase(&self) -> Option<&ProtocolState> {
        self.protocol.state(self.state.current_state_number)
    }

    pub fn problem(&self) -> Option<&str> {
        self.state.problem.as_deref()
    }

    pub fn crux(&self) -> Option<&str> {
        self.state.crux.as_deref()
    }

    /// Every phase has been completed.
    pub fn is_complete(&self) -> bool {
        !self.protocol.is_empty() && self.state.completed.len() == self.protocol.len()
    }

    /// Forget everything; the next turn starts a fresh ritual.
    pub fn reset(&mut self) {
        self.state = TrackerState::default();
    }

    /// Observe one exchange (user turn plus coach reply) and return a nudge
    /// for the next system prompt, if one is due.
    pub fn observe(&mut self, user_text: &str, agent_text: &str) -> Option<String> {
        if self.state.current_state_number == 0 {
            if GREETING.is_match(user_text) && !self.protocol.is_empty() {
                self.state.current_state_number = 1;
                info!(phase = 1, title = %self.protocol.states()[0].title, "Protocol started");
            }
            return None;
        }
        self.fill_missing_slots(user_text, agent_text);
        if self.is_complete() {
            return None;
        }

        let number = self.state.current_state_number;
        let phase = self.protocol.state(number)?.clone();
        let exchanges = {
            let count = self.state.exchanges.entry(number).or_insert(0);
            *count += 1;
            *count
        };

        if phase_completed(&phase, user_text, agent_text) {
            self.complete_phase(&phase, user_text, agent_text);
            return None;
        }

        if exchanges > self.nudge_after {
            let target = self.protocol.state(number + 1).unwrap_or(&phase);
            let nudge = format!("[NUDGE: progress to {}]", target.title);
            debug!(phase = number, exchanges, nudge = %nudge, "Protocol nudge");
            return Some(nudge);
        }
        None
    }

    /// Retry problem and crux capture for phases already completed without
    /// them.
    fn fill_missing_slots(&mut self, user_text: &str, agent_text: &str) {
        for phase in self.protocol.states() {
            if !self.state.completed.contains(&phase.number) {
                continue;
            }
            if phase.is_problem_phase()
                && self.state.problem.is_none()
                && user_indicates(phase, user_text)
            {
                debug!(phase = phase.number, "Problem recorded after phase completion");
                self.state.problem = Some(user_text.to_string());
            }
            if phase.is_crux_phase() && self.state.crux.is_none() {
                self.state.crux = extract_crux(agent_text).or_else(|| extract_crux(user_text));
                if self.state.crux.is_some() {
                    debug!(phase = phase.number, "Crux recorded after phase completion");
                }
            }
        }
    }

    fn complete_phase(&mut self, phase: &ProtocolState, user_text: &str, agent_text: &str) {
        if phase.is_problem_phase()
            && self.state.problem.is_none()
            && user_indicates(phase, user_text)
        {
            self.state.problem = Some(user_text.to_string());
        }
        if phase.is_crux_phase() && self.state.crux.is_none() {
            self.state.crux = extract_crux(agent_text).or_else(|| extract_crux(user_text));
        }

        self.state.completed.insert(phase.number);
        if phase.number < self.protocol.len() {
            self.state.current_state_number = phase.number + 1;
        }
        info!(
            completed = phase.number,
            title = %phase.title,
            current = self.state.current_state_number,
            "Protocol phase completed"
        );
    }

    /// One-line status for the system prompt.
    pub fn status_line(&self) -> String {
        match self.current_phase() {
            _ if self.is_complete() => "Morning protocol: complete.".to_string(),
            None => "Morning protocol: not started (waiting for a greeting).".to_string(),
            Some(phase) => format!(
                "Morning protocol: phase {}/{}: {}.",
                phase.number,
                self.protocol.len(),
                phase.title
            ),
        }
    }
}

fn phase_completed(phase: &ProtocolState, user_text: &str, agent_text: &str) -> bool {
    let user = user_text.to_lowercase();
    let agent = agent_text.to_lowercase();
    phase
        .completion_indicators
        .iter()
        .any(|i| user.contains(i.as_str()) || agent.contains(i.as_str()))
        || phase
            .transition_triggers
            .iter()
            .any(|t| agent.contains(t.as_str()))
}

fn user_indicates(phase: &ProtocolState, user_text: &str) -> bool {
    let user = user_text.to_lowercase();
    phase
        .completion_indicators
        .iter()
        .any(|i| user.contains(i.as_str()))
}

/// Pull a crux phrase out of `text` using the crux templates.
pub fn extract_crux(text: &str) -> Option<String> {
    CRUX_TEMPLATES.iter().find_map(|re| {
        re.captures(text)
            .map(|c| c[1].trim().to_string())
            .filter(|s| !s.is_empty())
    })
}
