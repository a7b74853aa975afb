//! Coaching protocol parsing and phase tracking.
//!
//! A protocol is a short markdown document of numbered phases, each with
//! completion indicators and transition triggers. The [`ProtocolTracker`]
//! walks a conversation through those phases one turn at a time and emits a
//! nudge when a phase drags on.

pub mod parser;
pub mod tracker;

pub use parser::{MORNING_PROTOCOL, Protocol, ProtocolState};
pub use tracker::{ProtocolTracker, TrackerState};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("protocol description contains no '## State N: Title' headings")]
    NoStates,

    #[error("failed to read protocol file {path}: {reason}")]
    Io { path: PathBuf, reason: String },
}
