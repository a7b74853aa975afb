//! The DiaryCoach session loop.
//!
//! A [`CoachSession`] owns one conversation. Each coaching turn:
//!
//! 1. **Context**: the relevance pipeline scores the recent window and
//!    injects todos, notes and remembered sessions within a budget
//! 2. **Prompt**: persona + protocol status + context + any pending nudge
//! 3. **Generate**: one call to the configured provider (retried on
//!    transient failures)
//! 4. **Track**: the protocol tracker observes the exchange and may leave
//!    a nudge for the next turn
//!
//! Typed input is first classified into a [`SessionCommand`], so "wrap up"
//! and "deep report" never reach the model as coaching messages.

pub mod command;
pub mod persona;
pub mod session;

pub use command::SessionCommand;
pub use session::{CoachSession, SessionOutput, TurnOutcome};

use diarycoach_config::ConfigError;
use diarycoach_core::ProviderError;
use diarycoach_protocol::ProtocolError;

/// Errors raised while building a session or running a turn.
#[derive(Debug, thiserror::Error)]
pub enum CoachError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Coach reply was empty")]
    EmptyReply,
}
