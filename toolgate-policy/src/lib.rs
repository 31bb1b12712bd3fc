//! Admission control and execution-path policy.
//!
//! [`RateLimiter`] enforces per-caller sliding windows, [`PathPolicy`] decides
//! whether a tool may run through the direct or the confirmation path, and
//! [`ConfirmationState`] tracks a proposal from proposal to execution.

#![warn(missing_docs, clippy::pedantic)]

pub mod confirmation;
pub mod error;
pub mod rate_limit;

pub use confirmation::{
    ConfirmationEvent, ConfirmationState, DecisionKind, ExecutionPath, PathPolicy, PolicyDecision,
};
pub use error::{PolicyError, PolicyResult};
pub use rate_limit::{RateDecision, RateLimitConfig, RateLimiter, WindowStrategy};
