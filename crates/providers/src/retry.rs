//! Provider retry: exponential backoff around a single provider.
//!
//! Transient failures (rate limits, network faults, timeouts, 5xx) are
//! retried with a doubling delay. Anything else is returned immediately.
//! Once every attempt has failed the caller receives
//! `ProviderError::RetriesExhausted` carrying the last error.

use async_trait::async_trait;
use diarycoach_config::RetryConfig;
use diarycoach_core::error::ProviderError;
use diarycoach_core::provider::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A provider that retries its inner provider on transient failure.
pub struct RetryProvider {
    name: String,
    inner: Arc<dyn Provider>,
    max_attempts: u32,
    base_delay: Duration,
    attempt_timeout: Option<Duration>,
}

impl RetryProvider {
    /// Wrap `inner` with the default policy (3 attempts, 1s base delay).
    pub fn new(inner: Arc<dyn Provider>) -> Self {
        Self::from_config(inner, &RetryConfig::default())
    }

    /// Wrap `inner` with the policy from the `[retry]` config section.
    pub fn from_config(inner: Arc<dyn Provider>, config: &RetryConfig) -> Self {
        Self {
            name: format!("retry({})", inner.name()),
            inner,
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            attempt_timeout: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Bound every individual attempt; an expired attempt counts as a
    /// transient `Timeout` failure.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based): base × 2^(attempt-1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    async fn attempt(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        match self.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.inner.generate(request)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(format!(
                    "Provider '{}' timed out after {}ms",
                    self.inner.name(),
                    limit.as_millis()
                ))),
            },
            None => self.inner.generate(request).await,
        }
    }
}

#[async_trait]
impl Provider for RetryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let provider_name = self.inner.name();
        let mut attempt = 1;

        loop {
            match self.attempt(request.clone()).await {
                Ok(response) => {
                    if attempt > 1 {
                        info!(provider = %provider_name, attempt, "Retry: provider recovered");
                    }
                    return Ok(response);
                }
                Err(e) if !e.is_transient() => {
                    warn!(
                        provider = %provider_name,
                        error = %e,
                        "Retry: permanent failure, not retrying"
                    );
                    return Err(e);
                }
                Err(e) if attempt >= self.max_attempts => {
                    warn!(
                        provider = %provider_name,
                        attempts = attempt,
                        error = %e,
                        "Retry: attempts exhausted"
                    );
                    return Err(ProviderError::RetriesExhausted {
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = self.backoff(attempt);
                    warn!(
                        provider = %provider_name,
                        attempt,
                        total = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retry: transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
