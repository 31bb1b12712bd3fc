//! Retry with exponential backoff and per-attempt deadlines.

use std::fmt;
use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;

use serde_json::Value;
use toolgate_tools::{ToolError, ToolResult};
use tracing::debug;

/// Exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy. `max_delay` is raised to `base_delay` when smaller.
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Returns the base delay.
    #[must_use]
    pub const fn base_delay(self) -> Duration {
        self.base_delay
    }

    /// Returns the delay cap.
    #[must_use]
    pub const fn max_delay(self) -> Duration {
        self.max_delay
    }

    /// Returns the pause after the failed attempt with zero-based index `retry`:
    /// `base * 2^retry`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for(self, retry: u32) -> Duration {
        self.base_delay
            .checked_mul(2_u32.saturating_pow(retry))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(2))
    }
}

/// Why the last attempt failed.
#[derive(Debug)]
pub(crate) enum AttemptError {
    /// The handler returned an error.
    Failed(ToolError),
    /// The deadline fired first; the handler keeps running detached.
    TimedOut(Duration),
    /// The handler task panicked.
    Aborted(String),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(err) => write!(f, "{err}"),
            Self::TimedOut(after) => write!(f, "timed out after {}ms", after.as_millis()),
            Self::Aborted(reason) => write!(f, "handler task aborted: {reason}"),
        }
    }
}

/// Successful result plus the number of attempts it took.
#[derive(Debug)]
pub(crate) struct Attempted {
    pub(crate) value: Value,
    pub(crate) attempts: u32,
}

/// Races one handler run against `deadline`.
///
/// The handler runs on its own task. On timeout the join handle is dropped,
/// which detaches the task: it runs to completion and its result is discarded.
pub(crate) async fn run_attempt<Fut>(handler: Fut, deadline: Duration) -> Result<Value, AttemptError>
where
    Fut: Future<Output = ToolResult<Value>> + Send + 'static,
{
    let task = tokio::spawn(handler);
    match tokio::time::timeout(deadline, task).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(err))) => Err(AttemptError::Failed(err)),
        Ok(Err(join)) => Err(AttemptError::Aborted(join.to_string())),
        Err(_) => Err(AttemptError::TimedOut(deadline)),
    }
}

/// Runs `make_attempt` up to `attempts` times, sleeping between failures.
///
/// Only the final failure is returned.
pub(crate) async fn run_with_retry<F, Fut>(
    policy: RetryPolicy,
    attempts: NonZeroU32,
    deadline: Duration,
    mut make_attempt: F,
) -> Result<Attempted, AttemptError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ToolResult<Value>> + Send + 'static,
{
    let total = attempts.get();
    let mut attempt = 0;
    loop {
        attempt += 1;
        match run_attempt(make_attempt(), deadline).await {
            Ok(value) => {
                return Ok(Attempted {
                    value,
                    attempts: attempt,
                });
            }
            Err(err) if attempt < total => {
                let delay = policy.delay_for(attempt - 1);
                debug!(attempt, total, error = %err, ?delay, "attempt failed; retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
