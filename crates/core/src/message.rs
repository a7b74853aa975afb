//! Conversation turns and the session transcript.
//!
//! User types a message → the coach generates a reply → both are appended
//! to the transcript as [`ConversationTurn`]s. Turns are never edited once
//! appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a coaching session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person being coached
    User,
    /// The coach
    Agent,
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    /// Create a user turn stamped now.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create an agent turn stamped now.
    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only, ordered record of a session's turns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<ConversationTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn. There is no way to remove or edit one.
    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The last `n` turns (fewer if the transcript is shorter).
    pub fn window(&self, n: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// The most recent user turn, if any.
    pub fn last_user_turn(&self) -> Option<&ConversationTurn> {
        self.turns.iter().rev().find(|t| t.role == Role::User)
    }

    /// Render as `User: ...` / `Coach: ...` lines for analysis prompts.
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|t| {
                let speaker = match t.role {
                    Role::User => "User",
                    Role::Agent => "Coach",
                };
                format!("{speaker}: {}", t.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_turn() {
        let turn = ConversationTurn::user("good morning");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.content, "good morning");
    }

    #[test]
    fn window_returns_trailing_turns() {
        let mut t = Transcript::new();
        for i in 0..8 {
            t.push(ConversationTurn::user(format!("turn {i}")));
        }
        let w = t.window(5);
        assert_eq!(w.len(), 5);
        assert_eq!(w[0].content, "turn 3");
        assert_eq!(w[4].content, "turn 7");
    }

    #[test]
    fn window_larger_than_transcript() {
        let mut t = Transcript::new();
        t.push(ConversationTurn::user("only"));
        assert_eq!(t.window(5).len(), 1);
        assert!(Transcript::new().window(5).is_empty());
    }

    #[test]
    fn last_user_turn_skips_agent() {
        let mut t = Transcript::new();
        t.push(ConversationTurn::user("first"));
        t.push(ConversationTurn::agent("reply"));
        assert_eq!(t.last_user_turn().unwrap().content, "first");
    }

    #[test]
    fn render_labels_speakers() {
        let mut t = Transcript::new();
        t.push(ConversationTurn::user("gm"));
        t.push(ConversationTurn::agent("Morning!"));
        assert_eq!(t.render(), "User: gm\nCoach: Morning!");
    }

    #[test]
    fn turn_serialization_roundtrip() {
        let turn = ConversationTurn::agent("What matters today?");
        let json = serde_json::to_string(&turn).unwrap();
        assert!(json.contains("\"agent\""));
        let back: ConversationTurn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, turn);
    }
}
