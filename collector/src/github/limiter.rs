//! Client-side request-window rate limiting
//!
//! Keeps the request rate under the documented API limits before the server
//! has to refuse anything. A common window applies to every request; some
//! resources (search) add stricter windows of their own.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// At most `max_requests` started per `window`, and at most `max_concurrent`
/// in flight when set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimit {
    pub max_concurrent: Option<usize>,
    pub max_requests: usize,
    pub window: Duration,
}

impl WindowLimit {
    /// `max_requests` per `window`, all of which may be spent in one burst.
    /// Spent cells come back one every `window / max_requests`.
    fn quota(&self) -> Quota {
        let burst = u32::try_from(self.max_requests)
            .ok()
            .and_then(NonZeroU32::new)
            .unwrap_or(NonZeroU32::MIN);
        Quota::with_period(self.window / burst.get())
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst)
    }
}

/// Window limiter backed by a GCRA rate limiter, plus an optional bound on
/// requests in flight.
pub struct SlidingWindowLimiter {
    limit: WindowLimit,
    rate: GovernorRateLimiter,
    in_flight: Option<Arc<Semaphore>>,
}

impl std::fmt::Debug for SlidingWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

/// Held for the duration of a request. Dropping it frees the concurrency
/// slot; the rate cell is spent either way.
#[derive(Debug)]
pub struct WindowPermit {
    _slot: Option<OwnedSemaphorePermit>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: WindowLimit) -> Self {
        Self {
            rate: RateLimiter::direct(limit.quota()),
            in_flight: limit.max_concurrent.map(|n| Arc::new(Semaphore::new(n))),
            limit,
        }
    }

    pub async fn acquire(&self) -> WindowPermit {
        // The semaphore is never closed, so acquiring cannot fail.
        let slot = match &self.in_flight {
            Some(sem) => sem.clone().acquire_owned().await.ok(),
            None => None,
        };

        if self.rate.check().is_err() {
            debug!(
                "Request window full ({} per {:?}), waiting",
                self.limit.max_requests, self.limit.window
            );
            self.rate.until_ready().await;
        }

        WindowPermit { _slot: slot }
    }
}

/// Permits from every limiter that applies to one request.
#[derive(Debug)]
pub struct LimiterGuard {
    permits: Vec<WindowPermit>,
}

impl Drop for LimiterGuard {
    fn drop(&mut self) {
        // Release in reverse acquisition order.
        while let Some(permit) = self.permits.pop() {
            drop(permit);
        }
    }
}

/// Common limiter plus optional extra limiters per resource.
#[derive(Debug)]
pub struct ResourceLimiter {
    common: Arc<SlidingWindowLimiter>,
    resources: HashMap<String, Vec<Arc<SlidingWindowLimiter>>>,
}

impl ResourceLimiter {
    pub fn new(common: WindowLimit) -> Self {
        Self {
            common: Arc::new(SlidingWindowLimiter::new(common)),
            resources: HashMap::new(),
        }
    }

    /// Add windows that apply to `resource` on top of the common one.
    pub fn with_resource(mut self, resource: &str, limits: Vec<WindowLimit>) -> Self {
        self.resources.insert(
            resource.to_string(),
            limits
                .into_iter()
                .map(|l| Arc::new(SlidingWindowLimiter::new(l)))
                .collect(),
        );
        self
    }

    /// Acquire the common limiter, then every limiter of `resource` in order.
    pub async fn acquire(&self, resource: &str) -> LimiterGuard {
        let mut permits = vec![self.common.acquire().await];
        if let Some(limiters) = self.resources.get(resource) {
            for limiter in limiters {
                permits.push(limiter.acquire().await);
            }
        }
        LimiterGuard { permits }
    }

    /// Number of limiters a request for `resource` passes through.
    pub fn depth(&self, resource: &str) -> usize {
        1 + self.resources.get(resource).map_or(0, Vec::len)
    }
}
