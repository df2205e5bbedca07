//! Per-adapter failure and backoff bookkeeping

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::types::{PostResult, PostStatus};

/// Retry-after applied when a throttling signal does not carry one
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(300);

// Keeps chrono arithmetic far away from its overflow limits.
const MAX_BLOCK: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Failure streak and block window for one adapter
///
/// Only the manager mutates this, once per completed attempt. `version`
/// increases with every recorded attempt so callers holding a snapshot can
/// tell whether it is stale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterState {
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub blocked_until: Option<DateTime<Utc>>,
    pub version: u64,
}

impl AdapterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while `now` is before `blocked_until`
    pub fn is_rate_limited_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.blocked_until, Some(until) if now < until)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.is_rate_limited_at(Utc::now())
    }

    /// Time left in the block window, `None` when not blocked
    pub fn retry_after_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self.blocked_until {
            Some(until) if now < until => (until - now).to_std().ok(),
            _ => None,
        }
    }

    pub fn mark_success(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures = 0;
        self.blocked_until = None;
        self.last_success = Some(now);
        self.version += 1;
    }

    pub fn mark_rate_limited(&mut self, retry_after: Duration, now: DateTime<Utc>) {
        let secs = retry_after.min(MAX_BLOCK).as_secs_f64();
        let block = chrono::Duration::milliseconds((secs * 1000.0).round() as i64);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.blocked_until = Some(now + block);
        self.version += 1;
    }

    pub fn mark_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.version += 1;
    }

    /// Fold a finished attempt into the state
    pub fn record(&mut self, result: &PostResult, now: DateTime<Utc>) {
        match result.status {
            PostStatus::Success => self.mark_success(now),
            PostStatus::RateLimited => {
                self.mark_rate_limited(result.retry_after.unwrap_or(DEFAULT_RETRY_AFTER), now)
            }
            _ => self.mark_failure(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_clean_state_is_not_limited() {
        let state = AdapterState::new();
        assert!(!state.is_rate_limited_at(at(0)));
        assert_eq!(state.retry_after_at(at(0)), None);
    }

    #[test]
    fn test_rate_limited_sets_block_window() {
        let mut state = AdapterState::new();
        state.record(
            &PostResult::rate_limited(Some(Duration::from_secs(60)), "throttled"),
            at(0),
        );

        assert_eq!(state.consecutive_failures, 1);
        assert_eq!(state.blocked_until, Some(at(60)));
        assert!(state.is_rate_limited_at(at(59)));
        assert!(!state.is_rate_limited_at(at(60)));
        assert_eq!(state.retry_after_at(at(20)), Some(Duration::from_secs(40)));
    }

    #[test]
    fn test_rate_limited_without_retry_after_uses_default() {
        let mut state = AdapterState::new();
        state.record(&PostResult::rate_limited(None, "throttled"), at(0));
        assert_eq!(state.blocked_until, Some(at(300)));
    }

    #[test]
    fn test_success_resets_everything() {
        let mut state = AdapterState::new();
        state.record(&PostResult::failed("boom"), at(0));
        state.record(&PostResult::rate_limited(None, "slow"), at(1));
        assert_eq!(state.consecutive_failures, 2);

        state.record(&PostResult::success("x_1", None, "ok"), at(2));
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.blocked_until, None);
        assert_eq!(state.last_success, Some(at(2)));
    }

    #[test]
    fn test_other_failures_do_not_block() {
        let mut state = AdapterState::new();
        for result in [
            PostResult::failed("x"),
            PostResult::captcha_required("x"),
            PostResult::login_required("x"),
            PostResult::account_blocked("x"),
        ] {
            state.record(&result, at(0));
        }
        assert_eq!(state.consecutive_failures, 4);
        assert_eq!(state.blocked_until, None);
    }

    #[test]
    fn test_version_increments_per_attempt() {
        let mut state = AdapterState::new();
        state.record(&PostResult::failed("x"), at(0));
        state.record(&PostResult::success("id", None, "ok"), at(1));
        assert_eq!(state.version, 2);
    }

    #[test]
    fn test_huge_retry_after_is_capped() {
        let mut state = AdapterState::new();
        state.mark_rate_limited(Duration::from_secs(u64::MAX), at(0));
        assert!(state.is_rate_limited_at(at(60 * 60 * 24 * 364)));
    }
}
