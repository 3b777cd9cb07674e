use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Enforces a minimum spacing between write calls.
///
/// Every caller goes through one async mutex, so concurrent writers are
/// serialized: the Nth write never starts earlier than `min_interval` after
/// the (N-1)th. Clones share the same timeline.
#[derive(Clone)]
pub struct WriteThrottle {
    min_interval: Duration,
    last_write: Arc<Mutex<Option<Instant>>>,
}

impl WriteThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_write: Arc::new(Mutex::new(None)),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a write may be issued, then claim the slot.
    pub async fn acquire(&self) {
        let mut last = self.last_write.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            if Instant::now() < ready_at {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

impl std::fmt::Debug for WriteThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteThrottle")
            .field("min_interval", &self.min_interval)
            .finish()
    }
}

/// A requests-per-second limiter for read traffic, using the governor crate.
///
/// Reads against the destination are cheap compared to writes, so they are
/// only paced, not serialized.
///
/// # Example
///
/// ```ignore
/// use voyage::remote::ApiRateLimiter;
///
/// let limiter = ApiRateLimiter::new(10); // 10 requests per second
/// limiter.wait().await;
/// client.search_issues("webapp", "main").await?;
/// ```
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl ApiRateLimiter {
    /// Create a new rate limiter with the specified requests per second
    /// (0 is treated as 1).
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        }
    }

    /// Wait until the limiter allows another request.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

impl std::fmt::Debug for ApiRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRateLimiter").finish_non_exhaustive()
    }
}
