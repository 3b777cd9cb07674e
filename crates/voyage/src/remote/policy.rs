//! Retry and throttling policy shared by every remote call.
//!
//! Two independent mechanisms:
//! - writes are spaced by a minimum interval ([`WriteThrottle`]), reads are
//!   optionally paced by an [`ApiRateLimiter`];
//! - rate-limit responses are retried with exponential backoff
//!   (`base_delay * 2^(attempt-1)`, no jitter) up to `max_retries` times.
//!
//! Every other error class propagates on the first occurrence.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use super::errors::{RemoteError, Result};
use super::throttle::{ApiRateLimiter, WriteThrottle};
use crate::migrate::{DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_RETRIES, DEFAULT_MIN_REQUEST_INTERVAL_MS};
use crate::migrate::{MigrationProgress, ProgressCallback, emit};

/// Configuration for retry operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Delay before the first retry; doubled for every following one.
    pub base_delay: Duration,
    /// Maximum number of retries (not counting the initial attempt).
    pub max_retries: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(base_delay: Duration, max_retries: usize) -> Self {
        Self {
            base_delay,
            max_retries,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Build the exponential backoff strategy for this configuration.
    #[must_use]
    pub fn into_backoff(self) -> ExponentialBuilder {
        let retries = u32::try_from(self.max_retries).unwrap_or(u32::MAX);
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.delay_for_attempt(retries.max(1)))
            .with_factor(2.0)
            .with_max_times(self.max_retries)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    Read,
    Write,
}

/// Policy wrapping outbound calls with throttling and rate-limit retries.
///
/// Clones share the same write throttle and read limiter, so one policy per
/// destination connection bounds the whole run.
#[derive(Clone)]
pub struct RemoteCallPolicy {
    throttle: WriteThrottle,
    retry: RetryConfig,
    read_limiter: Option<ApiRateLimiter>,
    progress: Option<Arc<ProgressCallback>>,
}

impl Default for RemoteCallPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_MIN_REQUEST_INTERVAL_MS),
            RetryConfig::default(),
        )
    }
}

impl RemoteCallPolicy {
    pub fn new(min_request_interval: Duration, retry: RetryConfig) -> Self {
        Self {
            throttle: WriteThrottle::new(min_request_interval),
            retry,
            read_limiter: None,
            progress: None,
        }
    }

    /// Pace read calls to at most `requests_per_second`.
    #[must_use]
    pub fn with_read_limit(mut self, requests_per_second: u32) -> Self {
        self.read_limiter = Some(ApiRateLimiter::new(requests_per_second));
        self
    }

    /// Report retries through a progress callback.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<ProgressCallback>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn retry_config(&self) -> RetryConfig {
        self.retry
    }

    pub fn min_request_interval(&self) -> Duration {
        self.throttle.min_interval()
    }

    /// Run a write call: throttled, retried on rate limits.
    pub async fn write<T, F, Fut>(&self, operation: &str, op: F) -> Result<T>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        self.execute(operation, CallKind::Write, op).await
    }

    /// Run a read call: paced if a read limit is set, retried on rate limits.
    pub async fn read<T, F, Fut>(&self, operation: &str, op: F) -> Result<T>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        self.execute(operation, CallKind::Read, op).await
    }

    async fn before_call(&self, kind: CallKind) {
        match kind {
            CallKind::Write => self.throttle.acquire().await,
            CallKind::Read => {
                if let Some(limiter) = &self.read_limiter {
                    limiter.wait().await;
                }
            }
        }
    }

    async fn execute<T, F, Fut>(&self, operation: &str, kind: CallKind, mut op: F) -> Result<T>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let attempt = AtomicU32::new(0);

        let call = || {
            attempt.fetch_add(1, Ordering::SeqCst);
            let fut = op();
            async move {
                self.before_call(kind).await;
                fut.await
            }
        };

        call.retry(self.retry.into_backoff())
            .notify(|err: &RemoteError, dur: Duration| {
                let current_attempt = attempt.load(Ordering::SeqCst);
                emit(
                    self.progress.as_deref(),
                    MigrationProgress::RateLimitBackoff {
                        operation: operation.to_string(),
                        retry_after_ms: u64::try_from(dur.as_millis()).unwrap_or(u64::MAX),
                        attempt: current_attempt,
                    },
                );
                tracing::debug!(
                    operation,
                    attempt = current_attempt,
                    delay_ms = dur.as_millis(),
                    error = %err,
                    "Rate limited, retrying"
                );
            })
            .when(RemoteError::is_rate_limited)
            .await
    }
}

impl std::fmt::Debug for RemoteCallPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCallPolicy")
            .field("throttle", &self.throttle)
            .field("retry", &self.retry)
            .field("read_limited", &self.read_limiter.is_some())
            .finish()
    }
}
