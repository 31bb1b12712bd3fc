//! Per-caller sliding-window admission control.

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroU32;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use toolgate_primitives::CallerId;
use tracing::debug;

use crate::error::{PolicyError, PolicyResult};

/// Bookkeeping strategy used by a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStrategy {
    /// Keeps admitted timestamps and prunes those older than the window.
    #[default]
    SlidingLog,
    /// Keeps a counter that resets once the window deadline passes.
    FixedWindow,
}

/// Limits applied by a [`RateLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    max_requests: NonZeroU32,
    window: Duration,
    strategy: WindowStrategy,
}

impl RateLimitConfig {
    /// Creates a sliding-log configuration admitting `max_requests` per `window`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidConfig`] when either bound is zero.
    pub fn new(max_requests: u32, window: Duration) -> PolicyResult<Self> {
        let max_requests = NonZeroU32::new(max_requests)
            .ok_or(PolicyError::InvalidConfig("max requests must be greater than zero"))?;
        if window.is_zero() {
            return Err(PolicyError::InvalidConfig("window must be greater than zero"));
        }

        Ok(Self {
            max_requests,
            window,
            strategy: WindowStrategy::SlidingLog,
        })
    }

    /// Creates a configuration of `max_requests` per minute.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidConfig`] when `max_requests` is zero.
    pub fn per_minute(max_requests: u32) -> PolicyResult<Self> {
        Self::new(max_requests, Duration::from_secs(60))
    }

    /// Switches the bookkeeping strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: WindowStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Returns the admission ceiling per window.
    #[must_use]
    pub const fn max_requests(self) -> NonZeroU32 {
        self.max_requests
    }

    /// Returns the window length.
    #[must_use]
    pub const fn window(self) -> Duration {
        self.window
    }

    /// Returns the bookkeeping strategy.
    #[must_use]
    pub const fn strategy(self) -> WindowStrategy {
        self.strategy
    }

    /// Returns `true` when this limit admits at most as many requests per
    /// unit of time as `other`.
    #[must_use]
    pub fn is_no_looser_than(self, other: Self) -> bool {
        u128::from(self.max_requests.get()) * other.window.as_nanos()
            <= u128::from(other.max_requests.get()) * self.window.as_nanos()
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: NonZeroU32::MIN.saturating_add(19),
            window: Duration::from_secs(60),
            strategy: WindowStrategy::SlidingLog,
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    allowed: bool,
    limit: u32,
    remaining: u32,
    reset_after: Duration,
}

impl RateDecision {
    /// Returns `true` when the request was admitted.
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        self.allowed
    }

    /// Returns the configured ceiling.
    #[must_use]
    pub const fn limit(self) -> u32 {
        self.limit
    }

    /// Returns how many further requests the caller may make in the current window.
    #[must_use]
    pub const fn remaining(self) -> u32 {
        self.remaining
    }

    /// Returns how long until capacity is next freed.
    #[must_use]
    pub const fn reset_after(self) -> Duration {
        self.reset_after
    }
}

#[derive(Debug)]
enum Bucket {
    SlidingLog(VecDeque<Instant>),
    FixedWindow { count: u32, reset_at: Instant },
}

impl Bucket {
    fn new(strategy: WindowStrategy, now: Instant, window: Duration) -> Self {
        match strategy {
            WindowStrategy::SlidingLog => Self::SlidingLog(VecDeque::new()),
            WindowStrategy::FixedWindow => Self::FixedWindow {
                count: 0,
                reset_at: now + window,
            },
        }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        match self {
            Self::SlidingLog(log) => {
                while log
                    .front()
                    .is_some_and(|admitted| now.duration_since(*admitted) >= window)
                {
                    log.pop_front();
                }
            }
            Self::FixedWindow { count, reset_at } => {
                if now >= *reset_at {
                    *count = 0;
                    *reset_at = now + window;
                }
            }
        }
    }

    fn used(&self) -> u32 {
        match self {
            Self::SlidingLog(log) => u32::try_from(log.len()).unwrap_or(u32::MAX),
            Self::FixedWindow { count, .. } => *count,
        }
    }

    fn record(&mut self, now: Instant) {
        match self {
            Self::SlidingLog(log) => log.push_back(now),
            Self::FixedWindow { count, .. } => *count = count.saturating_add(1),
        }
    }

    fn reset_after(&self, now: Instant, window: Duration) -> Duration {
        match self {
            Self::SlidingLog(log) => log.front().map_or(Duration::ZERO, |oldest| {
                window.saturating_sub(now.duration_since(*oldest))
            }),
            Self::FixedWindow { reset_at, .. } => reset_at.saturating_duration_since(now),
        }
    }

    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        match self {
            Self::SlidingLog(log) => log
                .back()
                .is_none_or(|latest| now.duration_since(*latest) >= window),
            Self::FixedWindow { reset_at, .. } => now >= *reset_at,
        }
    }
}

/// In-memory rate limiter keyed by caller identity.
///
/// Across any window of the configured length a caller is admitted at most
/// `max_requests` times under [`WindowStrategy::SlidingLog`]. Rejected requests
/// do not consume capacity.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<CallerId, Bucket>>,
}

impl RateLimiter {
    /// Creates a limiter with the supplied configuration.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the limiter configuration.
    #[must_use]
    pub const fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Attempts to admit a request, recording it when allowed.
    pub fn admit(&self, caller: &CallerId) -> RateDecision {
        let now = Instant::now();
        let window = self.config.window;
        let limit = self.config.max_requests.get();

        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let bucket = buckets
            .entry(caller.clone())
            .or_insert_with(|| Bucket::new(self.config.strategy, now, window));
        bucket.prune(now, window);

        let used = bucket.used();
        if used >= limit {
            let reset_after = bucket.reset_after(now, window);
            debug!(caller = %caller, limit, ?reset_after, "rate limit exceeded");
            return RateDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_after,
            };
        }

        bucket.record(now);
        RateDecision {
            allowed: true,
            limit,
            remaining: limit - used - 1,
            reset_after: bucket.reset_after(now, window),
        }
    }

    /// Returns `true` and records the request when the caller is under its limit.
    pub fn check(&self, caller: &CallerId) -> bool {
        self.admit(caller).is_allowed()
    }

    /// Returns how many requests the caller may still make without recording one.
    #[must_use]
    pub fn remaining(&self, caller: &CallerId) -> u32 {
        let now = Instant::now();
        let limit = self.config.max_requests.get();
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        match buckets.get_mut(caller) {
            Some(bucket) => {
                bucket.prune(now, self.config.window);
                limit.saturating_sub(bucket.used())
            }
            None => limit,
        }
    }

    /// Forgets all history for a caller.
    pub fn reset(&self, caller: &CallerId) {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        buckets.remove(caller);
    }

    /// Drops buckets whose window has fully elapsed, returning how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let window = self.config.window;
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let before = buckets.len();
        buckets.retain(|_, bucket| !bucket.is_expired(now, window));
        let removed = before - buckets.len();
        if removed > 0 {
            debug!(removed, remaining = buckets.len(), "rate limit buckets swept");
        }
        removed
    }

    /// Returns the number of callers currently tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        let buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(id: &str) -> CallerId {
        CallerId::new(id).unwrap()
    }

    fn limiter(max: u32, window_ms: u64, strategy: WindowStrategy) -> RateLimiter {
        RateLimiter::new(
            RateLimitConfig::new(max, Duration::from_millis(window_ms))
                .unwrap()
                .with_strategy(strategy),
        )
    }

    #[test]
    fn zero_bounds_are_rejected() {
        assert!(RateLimitConfig::new(0, Duration::from_secs(1)).is_err());
        assert!(RateLimitConfig::new(1, Duration::ZERO).is_err());
    }

    #[test]
    fn default_admits_twenty_per_minute() {
        let config = RateLimitConfig::default();
        assert_eq!(config.max_requests().get(), 20);
        assert_eq!(config.window(), Duration::from_secs(60));
        assert_eq!(config.strategy(), WindowStrategy::SlidingLog);
    }

    #[test]
    fn compares_rates_across_windows() {
        let execute = RateLimitConfig::per_minute(20).unwrap();
        let confirm = RateLimitConfig::per_minute(5).unwrap();
        assert!(confirm.is_no_looser_than(execute));
        assert!(!execute.is_no_looser_than(confirm));
        assert!(execute.is_no_looser_than(execute));

        let burst = RateLimitConfig::new(5, Duration::from_secs(1)).unwrap();
        assert!(!burst.is_no_looser_than(execute));
        let slow = RateLimitConfig::new(5, Duration::from_secs(600)).unwrap();
        assert!(slow.is_no_looser_than(execute));
    }

    #[tokio::test(start_paused = true)]
    async fn sixth_request_in_window_is_denied() {
        let limiter = limiter(5, 10_000, WindowStrategy::SlidingLog);
        let client = caller("10.0.0.1");

        for expected_remaining in (0..5).rev() {
            let decision = limiter.admit(&client);
            assert!(decision.is_allowed());
            assert_eq!(decision.remaining(), expected_remaining);
        }

        let denied = limiter.admit(&client);
        assert!(!denied.is_allowed());
        assert_eq!(denied.remaining(), 0);
        assert_eq!(denied.reset_after(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides_for_both_strategies() {
        for strategy in [WindowStrategy::SlidingLog, WindowStrategy::FixedWindow] {
            let limiter = limiter(2, 1_000, strategy);
            let client = caller("client");

            assert!(limiter.check(&client));
            assert!(limiter.check(&client));
            assert!(!limiter.check(&client));

            tokio::time::advance(Duration::from_millis(1_000)).await;
            assert!(limiter.check(&client), "{strategy:?} should admit after window");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sliding_log_frees_capacity_gradually() {
        let limiter = limiter(2, 1_000, WindowStrategy::SlidingLog);
        let client = caller("client");

        assert!(limiter.check(&client));
        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(limiter.check(&client));
        assert!(!limiter.check(&client));

        tokio::time::advance(Duration::from_millis(400)).await;
        assert_eq!(limiter.remaining(&client), 1);
        assert!(limiter.check(&client));
        assert!(!limiter.check(&client));
    }

    #[tokio::test(start_paused = true)]
    async fn callers_are_isolated() {
        let limiter = limiter(1, 1_000, WindowStrategy::SlidingLog);
        assert!(limiter.check(&caller("a")));
        assert!(!limiter.check(&caller("a")));
        assert!(limiter.check(&caller("b")));
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_does_not_consume() {
        let limiter = limiter(3, 1_000, WindowStrategy::SlidingLog);
        let client = caller("client");

        assert_eq!(limiter.remaining(&client), 3);
        assert_eq!(limiter.remaining(&client), 3);
        limiter.check(&client);
        assert_eq!(limiter.remaining(&client), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_history() {
        let limiter = limiter(1, 60_000, WindowStrategy::FixedWindow);
        let client = caller("client");

        assert!(limiter.check(&client));
        assert!(!limiter.check(&client));
        limiter.reset(&client);
        assert!(limiter.check(&client));
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_drops_only_idle_buckets() {
        let limiter = limiter(5, 1_000, WindowStrategy::SlidingLog);
        limiter.check(&caller("idle"));
        tokio::time::advance(Duration::from_millis(700)).await;
        limiter.check(&caller("active"));
        tokio::time::advance(Duration::from_millis(300)).await;

        assert_eq!(limiter.cleanup(), 1);
        assert_eq!(limiter.tracked(), 1);
        assert_eq!(limiter.remaining(&caller("active")), 4);
    }
}
