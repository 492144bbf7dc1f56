//! Process-wide request budget.
//!
//! [`TokenBucket`] is a `governor` GCRA limiter allowing `capacity`
//! requests per `window`. It reads time through [`TokioClock`], so
//! paused-time tests drive the budget deterministically.

use crate::IngestionError;
use governor::clock::Clock;
use governor::middleware::NoOpMiddleware;
use governor::nanos::Nanos;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A shared budget that callers draw tokens from before each network
/// attempt.
pub trait RateBudget: Send + Sync {
    /// Wait until `cost` tokens can be taken together. Fails with
    /// [`IngestionError::Timeout`] if they cannot be granted before
    /// `deadline`; no token is consumed then.
    fn acquire(
        &self,
        cost: u32,
        deadline: Instant,
    ) -> impl Future<Output = Result<(), IngestionError>> + Send;
}

impl<B: RateBudget> RateBudget for Arc<B> {
    fn acquire(
        &self,
        cost: u32,
        deadline: Instant,
    ) -> impl Future<Output = Result<(), IngestionError>> + Send {
        (**self).acquire(cost, deadline)
    }
}

/// Deadline `timeout` from now, saturating far in the future.
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30))
}

/// Governor clock over `tokio::time`, counted from its creation.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
}

impl Default for TokioClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    type Instant = Nanos;

    fn now(&self) -> Nanos {
        Nanos::from(self.origin.elapsed())
    }
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, TokioClock, NoOpMiddleware<Nanos>>;

/// Token bucket allowing `capacity` requests per rolling `window`.
pub struct TokenBucket {
    limiter: DirectLimiter,
    clock: TokioClock,
    burst: NonZeroU32,
}

impl TokenBucket {
    /// A full bucket of `capacity` tokens refilled over `window`.
    pub fn new(capacity: u32, window: Duration) -> Self {
        let burst = NonZeroU32::new(capacity).unwrap_or(NonZeroU32::MIN);
        let period = (window / burst.get()).max(Duration::from_nanos(1));
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);
        let clock = TokioClock::default();
        Self {
            limiter: RateLimiter::direct_with_clock(quota, clock),
            clock,
            burst,
        }
    }

    /// Most tokens one acquire can take. Larger costs are capped to this.
    pub fn capacity(&self) -> u32 {
        self.burst.get()
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("capacity", &self.burst)
            .finish_non_exhaustive()
    }
}

impl RateBudget for TokenBucket {
    async fn acquire(&self, cost: u32, deadline: Instant) -> Result<(), IngestionError> {
        let n = NonZeroU32::new(cost.clamp(1, self.burst.get())).unwrap_or(NonZeroU32::MIN);
        loop {
            let wait = match self.limiter.check_n(n) {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(not_until)) => not_until.wait_time_from(self.clock.now()),
                Err(insufficient) => {
                    return Err(IngestionError::Config(insufficient.to_string()));
                }
            };
            if Instant::now() + wait > deadline {
                return Err(IngestionError::Timeout);
            }
            tracing::debug!("rate budget exhausted, waiting {:?} for {} tokens", wait, n);
            tokio::time::sleep(wait).await;
        }
    }
}

/// A budget that never blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl RateBudget for Unlimited {
    async fn acquire(&self, _cost: u32, _deadline: Instant) -> Result<(), IngestionError> {
        Ok(())
    }
}
