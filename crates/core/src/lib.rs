//! # DiaryCoach Core
//!
//! Domain types, traits, and error definitions for the DiaryCoach agent.
//! Every other crate depends inward on this one.
//!
//! The seams live here as traits:
//! - [`Provider`] generates text from an LLM backend
//! - [`MemoryStore`] holds records of earlier coaching sessions
//!
//! Implementations and test doubles live in their respective crates.

pub mod error;
pub mod memory;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use error::{MemoryError, ProviderError};
pub use memory::{MemoryRecord, MemoryStore};
pub use message::{ConversationTurn, Role, SessionId, Transcript};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
