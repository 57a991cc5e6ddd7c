//! Retry wrapper — bounded exponential backoff around a backend.
//!
//! Transient failures (service unreachable, rate limits, timeouts) are
//! retried up to a configured attempt bound; everything else surfaces
//! immediately. The last error is returned once attempts are exhausted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quill_core::ModelBackend;
use quill_core::backend::{BackendRequest, ModelTurn, TurnFragment};
use quill_core::error::BackendError;
use tracing::warn;

/// A backend decorator that retries transient failures with backoff.
pub struct RetryBackend {
    inner: Arc<dyn quill_core::ModelBackend>,
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryBackend {
    pub fn new(inner: Arc<dyn quill_core::ModelBackend>, max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Wrap with the default schedule: 3 attempts, 500ms base delay.
    pub fn with_defaults(inner: Arc<dyn quill_core::ModelBackend>) -> Self {
        Self::new(inner, 3, Duration::from_millis(500))
    }

    /// Delay before the next attempt: exponential, except a rate-limit
    /// response dictates its own minimum wait.
    fn delay_for(&self, attempt: u32, error: &BackendError) -> Duration {
        let backoff = self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1));
        if let BackendError::RateLimited { retry_after_secs } = error {
            backoff.max(Duration::from_secs(*retry_after_secs))
        } else {
            backoff
        }
    }
}

#[async_trait]
impl quill_core::ModelBackend for RetryBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn send(
        &self,
        request: BackendRequest,
    ) -> std::result::Result<ModelTurn, BackendError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.inner.send(request.clone()).await {
                Ok(turn) => return Ok(turn),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt, &e);
                    warn!(
                        backend = %self.inner.name(),
                        attempt,
                        max = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Backend failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn stream(
        &self,
        request: BackendRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<TurnFragment, BackendError>>,
        BackendError,
    > {
        // Only establishing the stream is retried; a stream that breaks
        // mid-flight is surfaced, since fragments are non-restartable.
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.inner.stream(request.clone()).await {
                Ok(rx) => return Ok(rx),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt, &e);
                    warn!(
                        backend = %self.inner.name(),
                        attempt,
                        max = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Backend stream failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, BackendError> {
        self.inner.list_models().await
    }

    async fn health_check(&self) -> std::result::Result<bool, BackendError> {
        self.inner.health_check().await
    }
}
