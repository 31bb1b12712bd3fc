//! Errors surfaced by policy components.

use thiserror::Error;

use crate::confirmation::{ConfirmationEvent, ConfirmationState};

/// Errors surfaced by policy components.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Limiter configuration was rejected.
    #[error("invalid rate limit configuration: {0}")]
    InvalidConfig(&'static str),
    /// Confirmation transition was not permitted from the current state.
    #[error("invalid confirmation transition from {from:?} via {event:?}")]
    InvalidTransition {
        /// State prior to the attempted transition.
        from: ConfirmationState,
        /// Event that triggered the failure.
        event: ConfirmationEvent,
    },
}

/// Result alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
