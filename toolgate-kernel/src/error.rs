//! Caller-facing invocation errors.

use std::time::Duration;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use toolgate_audit::AuditOutcome;
use toolgate_tools::FieldViolation;

use crate::proposals::ProposalId;
use crate::request::ErrorBody;

/// Result alias for gateway operations.
pub type InvocationResult<T> = Result<T, InvocationError>;

/// Stable error label exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input failed schema validation.
    Validation,
    /// Unknown tool or proposal.
    NotFound,
    /// The tool needs the confirmed path.
    ConfirmationRequired,
    /// The request is not allowed on this path.
    PolicyBlocked,
    /// The caller exceeded its rate limit.
    RateLimited,
    /// Generic execution failure, timeouts included.
    ExecutionFailed,
}

impl ErrorKind {
    /// Returns the snake case label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::ConfirmationRequired => "confirmation_required",
            Self::PolicyBlocked => "policy_blocked",
            Self::RateLimited => "rate_limited",
            Self::ExecutionFailed => "execution_failed",
        }
    }
}

/// Errors returned by the gateway.
///
/// `Display` carries full detail for server-side logs. Callers only ever see
/// [`InvocationError::public_message`].
#[derive(Debug, Error)]
pub enum InvocationError {
    /// Input did not match the tool's input schema.
    #[error("input for `{tool}` failed validation: {}", join_violations(violations))]
    Validation {
        /// Tool name.
        tool: String,
        /// Per-field violations.
        violations: Vec<FieldViolation>,
    },

    /// No tool is registered under the requested name.
    #[error("unknown tool `{tool}`")]
    NotFound {
        /// Requested name.
        tool: String,
    },

    /// No live proposal exists with this id.
    #[error("unknown proposal `{id}`")]
    UnknownProposal {
        /// Requested proposal.
        id: ProposalId,
    },

    /// A confirmation-gated tool was requested on the direct path.
    #[error("tool `{tool}` requires human confirmation")]
    ConfirmationRequired {
        /// Tool name.
        tool: String,
    },

    /// The request is not permitted on this path.
    #[error("tool `{tool}` blocked: {reason}")]
    PolicyBlocked {
        /// Tool name.
        tool: String,
        /// Caller-safe reason.
        reason: String,
    },

    /// The caller exhausted its window.
    #[error("rate limit of {limit} exceeded; resets in {}ms", reset_after.as_millis())]
    RateLimited {
        /// Configured limit.
        limit: u32,
        /// Requests left in the window.
        remaining: u32,
        /// Time until a slot frees up.
        reset_after: Duration,
    },

    /// The final attempt hit its deadline.
    #[error("tool `{tool}` timed out after {}ms", after.as_millis())]
    Timeout {
        /// Tool name.
        tool: String,
        /// Per-attempt deadline.
        after: Duration,
    },

    /// The handler failed on every attempt, or could not run.
    #[error("tool `{tool}` failed: {detail}")]
    ExecutionFailed {
        /// Tool name.
        tool: String,
        /// Internal detail, never sent to callers.
        detail: String,
    },
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl InvocationError {
    /// Returns the caller-facing kind. Timeouts report as execution failures.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotFound { .. } | Self::UnknownProposal { .. } => ErrorKind::NotFound,
            Self::ConfirmationRequired { .. } => ErrorKind::ConfirmationRequired,
            Self::PolicyBlocked { .. } => ErrorKind::PolicyBlocked,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Timeout { .. } | Self::ExecutionFailed { .. } => ErrorKind::ExecutionFailed,
        }
    }

    /// Returns the transport status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::ConfirmationRequired | ErrorKind::PolicyBlocked => {
                StatusCode::BAD_REQUEST
            }
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::ExecutionFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` for security-boundary refusals.
    #[must_use]
    pub const fn is_policy_block(&self) -> bool {
        matches!(
            self,
            Self::ConfirmationRequired { .. } | Self::PolicyBlocked { .. }
        )
    }

    /// Returns the message safe to show to callers.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation { .. } => "input failed validation".to_owned(),
            Self::NotFound { tool } => format!("unknown tool `{tool}`"),
            Self::UnknownProposal { .. } => "unknown proposal".to_owned(),
            Self::ConfirmationRequired { .. } => {
                "tool requires human confirmation; use the confirmed path".to_owned()
            }
            Self::PolicyBlocked { reason, .. } => reason.clone(),
            Self::RateLimited { .. } => "rate limit exceeded".to_owned(),
            Self::Timeout { .. } | Self::ExecutionFailed { .. } => {
                "tool execution failed".to_owned()
            }
        }
    }

    /// Returns the outcome recorded in the audit trail.
    #[must_use]
    pub const fn audit_outcome(&self) -> AuditOutcome {
        match self {
            Self::Validation { .. } => AuditOutcome::ValidationFailed,
            Self::NotFound { .. } | Self::UnknownProposal { .. } => AuditOutcome::NotFound,
            Self::ConfirmationRequired { .. } => AuditOutcome::ConfirmationRequired,
            Self::PolicyBlocked { .. } => AuditOutcome::PolicyBlocked,
            Self::RateLimited { .. } => AuditOutcome::RateLimited,
            Self::Timeout { .. } => AuditOutcome::Timeout,
            Self::ExecutionFailed { .. } => AuditOutcome::ExecutionFailed,
        }
    }

    /// Builds the serializable error body.
    #[must_use]
    pub fn to_response(&self) -> ErrorBody {
        let mut body = ErrorBody {
            kind: self.kind(),
            message: self.public_message(),
            violations: None,
            remaining: None,
            reset_after_ms: None,
        };

        match self {
            Self::Validation { violations, .. } => body.violations = Some(violations.clone()),
            Self::RateLimited {
                remaining,
                reset_after,
                ..
            } => {
                body.remaining = Some(*remaining);
                body.reset_after_ms = Some(u64::try_from(reset_after.as_millis()).unwrap_or(u64::MAX));
            }
            _ => {}
        }

        body
    }
}
