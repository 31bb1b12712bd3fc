//! Strongly typed configuration schema.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use toolgate_policy::{PolicyResult, RateLimitConfig, WindowStrategy};

use crate::error::{ConfigError, ConfigResult};

/// Per-path rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    /// Admissions per window.
    pub max_requests: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Bookkeeping strategy.
    pub strategy: WindowStrategy,
}

impl LimitConfig {
    const fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window_ms: 60_000,
            strategy: WindowStrategy::SlidingLog,
        }
    }

    /// Returns the window length.
    #[must_use]
    pub const fn window(self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Converts into a limiter configuration.
    ///
    /// # Errors
    ///
    /// Fails when the limit or the window is zero.
    pub fn to_rate_limit(self) -> PolicyResult<RateLimitConfig> {
        Ok(RateLimitConfig::new(self.max_requests, self.window())?.with_strategy(self.strategy))
    }

    /// Compares admissions per unit of time without dividing.
    fn is_looser_than(self, other: Self) -> bool {
        u128::from(self.max_requests) * u128::from(other.window_ms)
            > u128::from(other.max_requests) * u128::from(self.window_ms)
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self::per_minute(20)
    }
}

/// Result cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied when a tool enables caching without its own.
    pub default_ttl_ms: u64,
    /// Maximum number of cached results.
    pub max_entries: usize,
}

impl CacheConfig {
    /// Returns the default TTL.
    #[must_use]
    pub const fn default_ttl(self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 60_000,
            max_entries: 1024,
        }
    }
}

/// Backoff settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay after the first failed attempt.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay.
    pub max_delay_ms: u64,
}

impl RetryConfig {
    /// Returns the base delay.
    #[must_use]
    pub const fn base_delay(self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Returns the delay cap.
    #[must_use]
    pub const fn max_delay(self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            max_delay_ms: 2_000,
        }
    }
}

/// Audit sink settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Append entries as JSON lines to this file.
    pub journal_path: Option<PathBuf>,
    /// Emit entries as tracing events.
    pub tracing: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            journal_path: None,
            tracing: true,
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Limit for the unconfirmed execute path.
    pub execute_limit: LimitConfig,
    /// Limit for the confirmation path; must not be looser than `execute_limit`.
    pub confirm_limit: LimitConfig,
    /// Result cache.
    pub cache: CacheConfig,
    /// Retry backoff.
    pub retry: RetryConfig,
    /// Per-attempt deadline for tools without their own.
    pub default_timeout_ms: u64,
    /// Period of the maintenance sweep.
    pub sweep_interval_ms: u64,
    /// Lifetime of an unresolved proposal.
    pub proposal_ttl_ms: u64,
    /// Audit sinks.
    pub audit: AuditConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            execute_limit: LimitConfig::per_minute(20),
            confirm_limit: LimitConfig::per_minute(5),
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            default_timeout_ms: 30_000,
            sweep_interval_ms: 60_000,
            proposal_ttl_ms: 300_000,
            audit: AuditConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Returns the default per-attempt deadline.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Returns the sweep period.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Returns the proposal lifetime.
    #[must_use]
    pub const fn proposal_ttl(&self) -> Duration {
        Duration::from_millis(self.proposal_ttl_ms)
    }

    /// Checks ranges and cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violated constraint.
    pub fn validate(&self) -> ConfigResult<()> {
        for limit in [self.execute_limit, self.confirm_limit] {
            if limit.max_requests == 0 {
                return Err(ConfigError::Invalid("rate limit max_requests must be greater than zero"));
            }
            if limit.window_ms == 0 {
                return Err(ConfigError::Invalid("rate limit window_ms must be greater than zero"));
            }
        }
        if self.confirm_limit.is_looser_than(self.execute_limit) {
            return Err(ConfigError::Invalid(
                "confirm_limit must not be looser than execute_limit",
            ));
        }
        if self.cache.default_ttl_ms == 0 {
            return Err(ConfigError::Invalid("cache default_ttl_ms must be greater than zero"));
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid("cache max_entries must be greater than zero"));
        }
        if self.retry.base_delay_ms == 0 {
            return Err(ConfigError::Invalid("retry base_delay_ms must be greater than zero"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(
                "retry base_delay_ms cannot exceed max_delay_ms",
            ));
        }
        if self.default_timeout_ms == 0 {
            return Err(ConfigError::Invalid("default_timeout_ms must be greater than zero"));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid("sweep_interval_ms must be greater than zero"));
        }
        if self.proposal_ttl_ms == 0 {
            return Err(ConfigError::Invalid("proposal_ttl_ms must be greater than zero"));
        }
        Ok(())
    }
}
