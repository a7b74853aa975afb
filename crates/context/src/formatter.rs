//! Budgeted context formatting: fetched items into one prompt block.
//!
//! Sections are filled greedily in fixed priority order:
//!
//! 1. **Todos**: `## Relevant todos`
//! 2. **Documents**: `## From your notes`
//! 3. **Memory**: `## From earlier conversations`
//!
//! Each item is one `- ` line. When an item does not fit the remaining
//! budget it is cut at its last sentence break and everything after it
//! (the rest of that section and every later section) is omitted.
//!
//! # Invariant
//!
//! `FormattedContext::text.len() <= budget`, always.

use crate::source::{ContextItem, ContextSource, RelevanceScores};
use crate::text::truncate_at_sentence;
use serde::Serialize;
use std::collections::BTreeMap;

/// Default character budget for injected context.
pub const DEFAULT_BUDGET: usize = 2000;

const SECTION_ORDER: [ContextSource; 3] = [
    ContextSource::Todos,
    ContextSource::Documents,
    ContextSource::Memory,
];

fn section_title(source: ContextSource) -> &'static str {
    match source {
        ContextSource::Todos => "Relevant todos",
        ContextSource::Documents => "From your notes",
        ContextSource::Memory => "From earlier conversations",
        ContextSource::Calendar => "Calendar",
    }
}

// ── Types ─────────────────────────────────────────────────────────────────

/// One item that made it into the formatted text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributedItem {
    pub source: ContextSource,
    pub id: String,
    pub score: f32,
    /// Whether the item was cut to fit.
    pub truncated: bool,
}

/// What went into the context block and why. For inspection only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContextAttribution {
    /// Sources with at least one item included, in priority order.
    pub sources_used: Vec<ContextSource>,
    pub items: Vec<AttributedItem>,
    /// Relevance score of each used source for this turn.
    pub trigger_scores: BTreeMap<ContextSource, f32>,
    /// Items left out because the budget ran out.
    pub omitted_items: usize,
    pub used_chars: usize,
    pub budget: usize,
}

/// The formatted context block with its attribution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormattedContext {
    pub text: String,
    pub attribution: ContextAttribution,
}

impl FormattedContext {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

// ── Build ─────────────────────────────────────────────────────────────────

/// Pack `items` into at most `budget` characters.
///
/// Items keep their relative order within a section. Calendar items have no
/// section and are ignored.
pub fn build(items: &[ContextItem], scores: &RelevanceScores, budget: usize) -> FormattedContext {
    let mut text = String::new();
    let mut attribution = ContextAttribution {
        budget,
        ..Default::default()
    };
    let mut exhausted = false;

    for source in SECTION_ORDER {
        let section_items: Vec<&ContextItem> = items
            .iter()
            .filter(|i| i.source == source && !i.content.trim().is_empty())
            .collect();
        if section_items.is_empty() {
            continue;
        }
        if exhausted {
            attribution.omitted_items += section_items.len();
            continue;
        }

        let separator = if text.is_empty() { "" } else { "\n\n" };
        let mut section = format!("{separator}## {}\n", section_title(source));
        let mut included: Vec<AttributedItem> = Vec::new();

        for (idx, item) in section_items.iter().enumerate() {
            let bullet = if included.is_empty() { "- " } else { "\n- " };
            let remaining = budget.saturating_sub(text.len() + section.len() + bullet.len());
            let (content, truncated) = truncate_at_sentence(&item.content, remaining);

            if !content.trim().is_empty() {
                section.push_str(bullet);
                section.push_str(content);
                included.push(AttributedItem {
                    source,
                    id: item.id.clone(),
                    score: item.score,
                    truncated,
                });
            }

            if truncated || content.trim().is_empty() {
                let placed = usize::from(!content.trim().is_empty());
                attribution.omitted_items += section_items.len() - idx - placed;
                exhausted = true;
                break;
            }
        }

        if !included.is_empty() {
            text.push_str(&section);
            attribution.sources_used.push(source);
            attribution.trigger_scores.insert(source, scores.get(source));
            attribution.items.extend(included);
        }
    }

    attribution.used_chars = text.len();
    FormattedContext { text, attribution }
}
