//! Bounded-concurrency task runner with a per-task timeout.

use diarycoach_config::EvaluationConfig;
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Result of one task run through the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskResult<T> {
    Completed { value: T, duration: Duration },
    TimedOut { after: Duration },
}

impl<T> TaskResult<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn value(self) -> Option<T> {
        match self {
            Self::Completed { value, .. } => Some(value),
            Self::TimedOut { .. } => None,
        }
    }
}

/// Runs independent futures with at most `max_concurrency` in flight.
///
/// Results come back in input order regardless of completion order.
#[derive(Debug, Clone)]
pub struct ParallelExecutor {
    max_concurrency: usize,
    timeout: Duration,
}

impl Default for ParallelExecutor {
    fn default() -> Self {
        Self::new(4, Duration::from_secs(5))
    }
}

impl ParallelExecutor {
    pub fn new(max_concurrency: usize, timeout: Duration) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            timeout,
        }
    }

    pub fn from_config(config: &EvaluationConfig) -> Self {
        Self::new(config.max_concurrency, Duration::from_secs(config.timeout_secs))
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn run<F, T>(&self, tasks: Vec<F>) -> Vec<TaskResult<T>>
    where
        F: Future<Output = T>,
    {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let count = tasks.len();

        let futures = tasks.into_iter().enumerate().map(|(index, task)| {
            let semaphore = semaphore.clone();
            async move {
                // The semaphore is never closed, so acquisition only fails on a bug.
                let _permit = semaphore.acquire().await.ok();
                let started = Instant::now();
                match tokio::time::timeout(self.timeout, task).await {
                    Ok(value) => TaskResult::Completed {
                        value,
                        duration: started.elapsed(),
                    },
                    Err(_) => {
                        warn!(
                            task = index,
                            timeout_ms = self.timeout.as_millis() as u64,
                            "Task timed out"
                        );
                        TaskResult::TimedOut {
                            after: started.elapsed(),
                        }
                    }
                }
            }
        });

        let results = join_all(futures).await;
        debug!(
            tasks = count,
            completed = results.iter().filter(|r| r.is_completed()).count(),
            "Parallel run finished"
        );
        results
    }
}
