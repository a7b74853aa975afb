//! Context sources, the items they produce, and per-turn relevance scores.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A place background context can come from.
///
/// Ordering follows injection priority: todos first, calendar last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextSource {
    Todos,
    Documents,
    Memory,
    Calendar,
}

impl ContextSource {
    /// Every known source.
    pub const ALL: [ContextSource; 4] =
        [Self::Todos, Self::Documents, Self::Memory, Self::Calendar];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todos => "todos",
            Self::Documents => "documents",
            Self::Memory => "memory",
            Self::Calendar => "calendar",
        }
    }
}

impl std::fmt::Display for ContextSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One piece of fetched context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub source: ContextSource,
    /// Stable identifier within the source (todo id, file name, record id).
    pub id: String,
    pub content: String,
    /// Fetcher-local relevance of this item in [0, 1].
    pub score: f32,
}

impl ContextItem {
    pub fn new(
        source: ContextSource,
        id: impl Into<String>,
        content: impl Into<String>,
        score: f32,
    ) -> Self {
        Self {
            source,
            id: id.into(),
            content: content.into(),
            score: score.clamp(0.0, 1.0),
        }
    }
}

/// Relevance of every known source for one turn.
///
/// Always complete: every [`ContextSource`] has an entry, 0.0 when nothing
/// matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceScores(BTreeMap<ContextSource, f32>);

impl RelevanceScores {
    /// Every source at 0.0.
    pub fn zero() -> Self {
        Self(ContextSource::ALL.iter().map(|s| (*s, 0.0)).collect())
    }

    /// Build from explicit values; missing sources are 0.0 and values are
    /// clamped to [0, 1].
    pub fn from_pairs(pairs: impl IntoIterator<Item = (ContextSource, f32)>) -> Self {
        let mut scores = Self::zero();
        for (source, score) in pairs {
            scores.set(source, score);
        }
        scores
    }

    pub fn get(&self, source: ContextSource) -> f32 {
        self.0.get(&source).copied().unwrap_or(0.0)
    }

    pub(crate) fn set(&mut self, source: ContextSource, score: f32) {
        self.0.insert(source, score.clamp(0.0, 1.0));
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContextSource, f32)> + '_ {
        self.0.iter().map(|(s, v)| (*s, *v))
    }

    /// The highest-scoring source, if any scored above zero.
    pub fn top(&self) -> Option<(ContextSource, f32)> {
        self.iter()
            .filter(|(_, v)| *v > 0.0)
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

impl Default for RelevanceScores {
    fn default() -> Self {
        Self::zero()
    }
}
