//! Memory trait: records of earlier coaching sessions.
//!
//! Each record summarises one past conversation under a topic. The explicit
//! recall fetcher scores these records when the user asks the coach to
//! remember something.

use crate::error::MemoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A remembered conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique ID for this record
    pub id: String,

    /// Short topic label (e.g. "delegation")
    pub topic: String,

    /// One-line summary used in recall responses
    pub summary: String,

    /// Longer free text searched for keyword overlap
    #[serde(default)]
    pub content: String,

    /// Tags for categorization
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// When the conversation happened
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// A record stamped now with an empty id (stores assign one).
    pub fn new(topic: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            topic: topic.into(),
            summary: summary.into(),
            content: String::new(),
            tags: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Storage for memory records.
///
/// Implementations: in-memory (tests, ephemeral sessions), JSONL file.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The backend name (e.g., "in_memory", "file").
    fn name(&self) -> &str;

    /// Store a record, returning its id.
    async fn store(&self, record: MemoryRecord) -> Result<String, MemoryError>;

    /// Every record, oldest first.
    async fn all(&self) -> Result<Vec<MemoryRecord>, MemoryError>;

    /// Total record count.
    async fn count(&self) -> Result<usize, MemoryError>;

    /// Remove every record.
    async fn clear(&self) -> Result<(), MemoryError>;
}
