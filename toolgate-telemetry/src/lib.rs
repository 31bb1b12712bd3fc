//! Observability utilities for the gateway.
//!
//! Installs a `tracing-subscriber` formatter driven by `RUST_LOG` and provides
//! the span every gateway operation runs in.

#![warn(missing_docs, clippy::pedantic)]

use serde::{Deserialize, Serialize};
use thiserror::Error;
use toolgate_primitives::{CallerId, InvocationId};
use tracing::{Span, debug, info_span};
use tracing_subscriber::EnvFilter;

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub default_directive: String,
    /// Whether to print event targets.
    pub with_target: bool,
    /// Whether to emit ANSI colours.
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_directive: "info".to_owned(),
            with_target: true,
            ansi: true,
        }
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The filter directive did not parse.
    #[error("invalid filter directive `{directive}`: {reason}")]
    InvalidDirective {
        /// Offending directive.
        directive: String,
        /// Parser diagnostic.
        reason: String,
    },
    /// A global subscriber is already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

fn build_filter(env: Option<&str>, default_directive: &str) -> TelemetryResult<EnvFilter> {
    let directive = env
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(default_directive);
    EnvFilter::try_new(directive).map_err(|err| TelemetryError::InvalidDirective {
        directive: directive.to_owned(),
        reason: err.to_string(),
    })
}

/// Installs the global fmt subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidDirective`] when neither `RUST_LOG` nor the
/// configured directive parses, and [`TelemetryError::Install`] when a global
/// subscriber already exists.
pub fn try_init_tracing(config: &TelemetryConfig) -> TelemetryResult<()> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(env.as_deref(), &config.default_directive)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .try_init()
        .map_err(|err| TelemetryError::Install(err.to_string()))
}

/// Installs the global fmt subscriber, keeping any subscriber already present.
pub fn init_tracing(config: &TelemetryConfig) {
    if let Err(err) = try_init_tracing(config) {
        debug!(error = %err, "tracing subscriber not installed");
    }
}

/// Span wrapping one gateway operation.
#[must_use]
pub fn invocation_span(
    operation: &'static str,
    tool: &str,
    caller: &CallerId,
    invocation_id: InvocationId,
) -> Span {
    info_span!(
        "invocation",
        operation,
        tool,
        caller = %caller,
        invocation_id = %invocation_id,
    )
}
