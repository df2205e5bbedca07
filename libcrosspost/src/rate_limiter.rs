//! Per-adapter outbound throttle
//!
//! Each adapter owns one [`RateLimiter`] configured with a requests/second
//! ceiling. It is a GCRA token bucket (via `governor`) with a burst of one, so
//! consecutive calls are spaced by `1 / requests_per_second`. Platform-side
//! throttling responses are tracked separately in
//! [`AdapterState`](crate::state::AdapterState).

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorRateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

type DirectRateLimiter = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Longest spacing a limiter will enforce between two calls
pub const MAX_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Spacing between calls at `requests_per_second`, capped at [`MAX_PERIOD`]
///
/// Returns `None` when the rate is not a positive finite number.
pub fn period_for(requests_per_second: f64) -> Option<Duration> {
    if !requests_per_second.is_finite() || requests_per_second <= 0.0 {
        return None;
    }
    let period = Duration::try_from_secs_f64(1.0 / requests_per_second).unwrap_or(MAX_PERIOD);
    Some(period.min(MAX_PERIOD))
}

pub struct RateLimiter {
    requests_per_second: f64,
    period: Option<Duration>,
    // None when the configured rate is not a positive finite number
    inner: Option<Arc<DirectRateLimiter>>,
}

impl RateLimiter {
    /// Create a limiter allowing `requests_per_second` steady-state calls
    ///
    /// Fractional rates are supported (0.2 means one call every 5 seconds).
    /// A non-positive or non-finite rate disables throttling. Rates slower
    /// than one call per [`MAX_PERIOD`] are clamped to it.
    pub fn new(requests_per_second: f64) -> Self {
        let period = period_for(requests_per_second);
        let inner = period.map(|period| {
            let quota = Quota::with_period(period)
                .unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX))
                .allow_burst(NonZeroU32::MIN);
            Arc::new(GovernorRateLimiter::direct(quota))
        });

        Self {
            requests_per_second,
            period,
            inner,
        }
    }

    /// Create a limiter that never delays
    pub fn unlimited() -> Self {
        Self {
            requests_per_second: f64::INFINITY,
            period: None,
            inner: None,
        }
    }

    pub fn requests_per_second(&self) -> f64 {
        self.requests_per_second
    }

    /// Minimum spacing between two calls, if throttling is active
    pub fn interval(&self) -> Option<Duration> {
        self.period
    }

    /// Wait until a token is available, then consume it
    pub async fn acquire(&self) {
        if let Some(limiter) = &self.inner {
            if limiter.check().is_err() {
                trace!(
                    "Throttling at {} requests/second, waiting for next slot",
                    self.requests_per_second
                );
                limiter.until_ready().await;
            }
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("requests_per_second", &self.requests_per_second)
            .field("active", &self.inner.is_some())
            .finish()
    }
}
