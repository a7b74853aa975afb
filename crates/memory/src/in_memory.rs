//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use diarycoach_core::error::MemoryError;
use diarycoach_core::memory::{MemoryRecord, MemoryStore};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A store that keeps records in a Vec, oldest first.
pub struct InMemoryStore {
    records: Arc<RwLock<Vec<MemoryRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// A store pre-populated with `records` (ids assigned where missing).
    pub fn with_records(records: impl IntoIterator<Item = MemoryRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|mut r| {
                if r.id.is_empty() {
                    r.id = Uuid::new_v4().to_string();
                }
                r
            })
            .collect();
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn store(&self, mut record: MemoryRecord) -> Result<String, MemoryError> {
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        let id = record.id.clone();
        self.records.write().await.push(record);
        Ok(id)
    }

    async fn all(&self) -> Result<Vec<MemoryRecord>, MemoryError> {
        Ok(self.records.read().await.clone())
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.records.read().await.len())
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        self.records.write().await.clear();
        Ok(())
    }
}
