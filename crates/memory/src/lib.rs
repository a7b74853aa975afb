//! Memory store implementations for DiaryCoach.

pub mod file_backend;
pub mod in_memory;

pub use file_backend::FileStore;
pub use in_memory::InMemoryStore;

use diarycoach_config::MemoryConfig;
use diarycoach_core::MemoryStore;
use std::sync::Arc;

/// Open the store selected by the `[memory]` config section.
///
/// The file backend falls back to [`FileStore::default_path`] when no path
/// is configured.
pub fn open_store(config: &MemoryConfig) -> Arc<dyn MemoryStore> {
    match config.backend.as_str() {
        "file" => {
            let path = config.path.clone().unwrap_or_else(FileStore::default_path);
            Arc::new(FileStore::new(path))
        }
        _ => Arc::new(InMemoryStore::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_store_defaults_to_in_memory() {
        let store = open_store(&MemoryConfig::default());
        assert_eq!(store.name(), "in_memory");
    }

    #[test]
    fn open_store_file_backend() {
        let tmp = tempfile::tempdir().unwrap();
        let config = MemoryConfig {
            backend: "file".into(),
            path: Some(tmp.path().join("memories.jsonl")),
            save_sessions: true,
        };
        assert_eq!(open_store(&config).name(), "file");
    }
}
