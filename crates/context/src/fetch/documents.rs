//! Document fetcher: markdown notes from a directory.
//!
//! Every `.md` file in the configured directory is scored against the
//! recent conversation:
//!
//! - keyword score: fraction of conversation keywords found in the file
//! - phrase bonus: +0.2 per adjacent keyword pair found verbatim (max 0.4)
//! - filename bonus: +0.3 when a keyword appears in the file stem
//!
//! The best files above the minimum score are chunked and returned. File
//! contents are cached by (path, mtime); files that disappear from the
//! directory drop out of the cache on the next fetch.

use super::{ContextFetcher, FetchRequest};
use crate::ContextError;
use crate::source::{ContextItem, ContextSource};
use crate::text::{chunk, keywords, words};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;
use tracing::{debug, warn};

pub const DEFAULT_MAX_DOCUMENTS: usize = 2;
pub const DEFAULT_MIN_SCORE: f32 = 0.3;
pub const DEFAULT_CHUNK_CHARS: usize = 600;

const PHRASE_BONUS: f32 = 0.2;
const PHRASE_BONUS_CAP: f32 = 0.4;
const FILENAME_BONUS: f32 = 0.3;

#[derive(Clone)]
struct CachedDocument {
    modified: SystemTime,
    content: Arc<str>,
}

pub struct DocumentFetcher {
    dir: PathBuf,
    max_documents: usize,
    min_score: f32,
    chunk_chars: usize,
    cache: Mutex<HashMap<PathBuf, CachedDocument>>,
}

impl DocumentFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_documents: DEFAULT_MAX_DOCUMENTS,
            min_score: DEFAULT_MIN_SCORE,
            chunk_chars: DEFAULT_CHUNK_CHARS,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_max_documents(mut self, max_documents: usize) -> Self {
        self.max_documents = max_documents;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_chunk_chars(mut self, chunk_chars: usize) -> Self {
        self.chunk_chars = chunk_chars;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of files currently held in the content cache.
    pub fn cached_files(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// `.md` files in the directory, sorted by name.
    async fn list_markdown(&self) -> Result<Vec<PathBuf>, ContextError> {
        let io_err = |e: std::io::Error| ContextError::Io {
            path: self.dir.clone(),
            reason: e.to_string(),
        };
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(io_err)?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("md") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// File content, from cache when the mtime is unchanged.
    async fn load(&self, path: &Path) -> Result<Arc<str>, ContextError> {
        let io_err = |e: std::io::Error| ContextError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        let modified = tokio::fs::metadata(path)
            .await
            .and_then(|m| m.modified())
            .map_err(io_err)?;

        let cached = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .filter(|c| c.modified == modified)
            .map(|c| c.content.clone());
        if let Some(content) = cached {
            return Ok(content);
        }

        let content: Arc<str> = tokio::fs::read_to_string(path).await.map_err(io_err)?.into();
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).insert(
            path.to_path_buf(),
            CachedDocument {
                modified,
                content: content.clone(),
            },
        );
        Ok(content)
    }

    /// Drop cache entries for files no longer in the directory.
    fn prune_cache(&self, listed: &[PathBuf]) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let before = cache.len();
        cache.retain(|path, _| listed.contains(path));
        if cache.len() < before {
            debug!(evicted = before - cache.len(), "Pruned deleted documents from cache");
        }
    }
}

/// Adjacent keyword pairs of `text`, as "a b" strings.
fn phrases(text: &str) -> Vec<String> {
    let kept: Vec<String> = words(text)
        .into_iter()
        .filter(|w| w.chars().count() >= 3)
        .collect();
    let mut out: Vec<String> = Vec::new();
    for pair in kept.windows(2) {
        let phrase = format!("{} {}", pair[0], pair[1]);
        if !out.contains(&phrase) {
            out.push(phrase);
        }
    }
    out
}

/// Score a document against the conversation text.
pub fn score_document(file_stem: &str, content: &str, conversation: &str) -> f32 {
    let terms = keywords(conversation);
    if terms.is_empty() {
        return 0.0;
    }
    let body = content.to_lowercase();
    let body_words = words(&body);

    let found = terms.iter().filter(|t| body_words.contains(t)).count();
    let keyword_score = found as f32 / terms.len() as f32;

    let phrase_hits = phrases(conversation)
        .iter()
        .filter(|p| body.contains(p.as_str()))
        .count();
    let phrase_bonus = (phrase_hits as f32 * PHRASE_BONUS).min(PHRASE_BONUS_CAP);

    let stem_words = words(&file_stem.replace(['-', '_'], " "));
    let filename_bonus = if terms.iter().any(|t| stem_words.contains(t)) {
        FILENAME_BONUS
    } else {
        0.0
    };

    (keyword_score + phrase_bonus + filename_bonus).clamp(0.0, 1.0)
}

#[async_trait]
impl ContextFetcher for DocumentFetcher {
    fn source(&self) -> ContextSource {
        ContextSource::Documents
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<Vec<ContextItem>, ContextError> {
        let conversation = request.window_text();
        let mut scored: Vec<(f32, String, Arc<str>)> = Vec::new();

        let paths = self.list_markdown().await?;
        self.prune_cache(&paths);

        for path in paths {
            let content = match self.load(&path).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable document");
                    continue;
                }
            };
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let score = score_document(&stem, &content, &conversation);
            debug!(document = %name, score, "Document scored");
            if score >= self.min_score {
                scored.push((score, name, content));
            }
        }

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        scored.truncate(self.max_documents);

        Ok(scored
            .into_iter()
            .map(|(score, name, content)| {
                ContextItem::new(
                    ContextSource::Documents,
                    name,
                    chunk(&content, self.chunk_chars),
                    score,
                )
            })
            .collect())
    }
}
