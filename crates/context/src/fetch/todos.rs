//! Todo fetcher: open tasks that overlap with what the user just said.

use super::{ContextFetcher, FetchRequest};
use crate::ContextError;
use crate::source::{ContextItem, ContextSource};
use crate::text::keywords;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default number of todos returned.
pub const DEFAULT_MAX_TODOS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub high_priority: bool,
}

impl TodoItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            tags: Vec::new(),
            high_priority: false,
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn high_priority(mut self) -> Self {
        self.high_priority = true;
        self
    }

    fn render(&self) -> String {
        if self.high_priority {
            format!("{} (high priority)", self.title)
        } else {
            self.title.clone()
        }
    }
}

/// Where candidate todos come from.
#[async_trait]
pub trait TodoSource: Send + Sync {
    async fn todos(&self) -> Result<Vec<TodoItem>, ContextError>;
}

/// A fixed list of todos.
pub struct StaticTodoSource {
    items: Vec<TodoItem>,
}

impl StaticTodoSource {
    pub fn new(items: Vec<TodoItem>) -> Self {
        Self { items }
    }

    /// The sample list used when no todo integration is configured.
    pub fn builtin() -> Self {
        Self::new(vec![
            TodoItem::new("todo-1", "Finish the Q3 budget presentation")
                .with_tags(&["work", "finance", "deck"])
                .high_priority(),
            TodoItem::new("todo-2", "Review the hiring plan with the team")
                .with_tags(&["work", "hiring", "team"]),
            TodoItem::new("todo-3", "Delegate the onboarding doc to Sam")
                .with_tags(&["work", "delegation"])
                .high_priority(),
            TodoItem::new("todo-4", "Book a dentist appointment")
                .with_tags(&["health", "personal"]),
            TodoItem::new("todo-5", "Write the weekly update email")
                .with_tags(&["work", "writing"]),
            TodoItem::new("todo-6", "Plan the weekend hike with family")
                .with_tags(&["personal", "family"]),
        ])
    }
}

#[async_trait]
impl TodoSource for StaticTodoSource {
    async fn todos(&self) -> Result<Vec<TodoItem>, ContextError> {
        Ok(self.items.clone())
    }
}

/// Fetches todos whose words overlap the latest user turn.
pub struct TodoFetcher {
    source: Arc<dyn TodoSource>,
    max_items: usize,
}

impl TodoFetcher {
    pub fn new(source: Arc<dyn TodoSource>) -> Self {
        Self {
            source,
            max_items: DEFAULT_MAX_TODOS,
        }
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }
}

/// Fraction of `query` keywords found in the todo's title or tags.
fn overlap(todo: &TodoItem, query: &[String]) -> f32 {
    if query.is_empty() {
        return 0.0;
    }
    let mut vocab = keywords(&todo.title);
    vocab.extend(todo.tags.iter().map(|t| t.to_lowercase()));
    let hits = query.iter().filter(|q| vocab.contains(q)).count();
    hits as f32 / query.len() as f32
}

#[async_trait]
impl ContextFetcher for TodoFetcher {
    fn source(&self) -> ContextSource {
        ContextSource::Todos
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<Vec<ContextItem>, ContextError> {
        let query = keywords(request.latest_user_text());
        let mut ranked: Vec<(f32, TodoItem)> = self
            .source
            .todos()
            .await?
            .into_iter()
            .map(|todo| (overlap(&todo, &query), todo))
            .filter(|(score, _)| *score > 0.0)
            .collect();

        ranked.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| b.1.high_priority.cmp(&a.1.high_priority))
        });
        ranked.truncate(self.max_items);

        Ok(ranked
            .into_iter()
            .map(|(score, todo)| {
                ContextItem::new(ContextSource::Todos, &todo.id, todo.render(), score)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RelevanceScores;
    use diarycoach_core::ConversationTurn;

    async fn fetch_for(fetcher: &TodoFetcher, text: &str) -> Vec<ContextItem> {
        let window = [ConversationTurn::user(text)];
        let scores = RelevanceScores::zero();
        fetcher.fetch(&FetchRequest::new(&window, &scores)).await.unwrap()
    }

    #[tokio::test]
    async fn filters_by_keyword_overlap() {
        let fetcher = TodoFetcher::new(Arc::new(StaticTodoSource::builtin()));
        let items = fetch_for(&fetcher, "I keep putting off the budget presentation").await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "todo-1");
        assert!(items[0].content.contains("high priority"));
    }

    #[tokio::test]
    async fn no_overlap_yields_nothing() {
        let fetcher = TodoFetcher::new(Arc::new(StaticTodoSource::builtin()));
        assert!(fetch_for(&fetcher, "good morning").await.is_empty());
    }

    #[tokio::test]
    async fn ties_broken_by_priority() {
        let source = StaticTodoSource::new(vec![
            TodoItem::new("low", "Tidy work inbox").with_tags(&["work"]),
            TodoItem::new("high", "Prepare work offsite")
                .with_tags(&["work"])
                .high_priority(),
        ]);
        let fetcher = TodoFetcher::new(Arc::new(source));
        let items = fetch_for(&fetcher, "work stuff").await;
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "low"]);
    }

    #[tokio::test]
    async fn higher_overlap_ranks_first() {
        let source = StaticTodoSource::new(vec![
            TodoItem::new("one", "Email the team").high_priority(),
            TodoItem::new("two", "Email the hiring team about offers"),
        ]);
        let fetcher = TodoFetcher::new(Arc::new(source));
        let items = fetch_for(&fetcher, "hiring email offers").await;
        assert_eq!(items[0].id, "two");
        assert!(items[0].score > items[1].score);
    }

    #[tokio::test]
    async fn truncated_to_max_items() {
        let source = StaticTodoSource::new(
            (0..8)
                .map(|i| TodoItem::new(format!("t{i}"), format!("Work item {i}")))
                .collect(),
        );
        let fetcher = TodoFetcher::new(Arc::new(source));
        assert_eq!(fetch_for(&fetcher, "work").await.len(), DEFAULT_MAX_TODOS);
        let fetcher = fetcher.with_max_items(2);
        assert_eq!(fetch_for(&fetcher, "work").await.len(), 2);
    }
}
