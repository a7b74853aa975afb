//! Provider wrappers for DiaryCoach.
//!
//! Concrete LLM clients live outside this workspace; everything here wraps
//! a `diarycoach_core::Provider` and is itself a `Provider`.

pub mod retry;

pub use retry::RetryProvider;
