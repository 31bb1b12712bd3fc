//! Execution-path policy and the confirmation state machine.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PolicyError, PolicyResult};

/// Entry point a request arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPath {
    /// Propose-and-execute path for tools without confirmation requirements.
    Direct,
    /// Confirm-and-execute path, the only legal route to confirmation-gated side effects.
    Confirmed,
}

impl ExecutionPath {
    /// Returns a stable label for logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Confirmed => "confirmed",
        }
    }
}

/// Outcome of a path check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// The tool may run on the requested path.
    Allow,
    /// The tool exists but is not allowed on the requested path.
    Deny,
    /// The tool has side effects that need human confirmation first.
    RequireConfirmation,
}

/// Result of [`PathPolicy::evaluate`] for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PolicyDecision {
    path: ExecutionPath,
    kind: DecisionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

impl PolicyDecision {
    /// Returns the path the decision was made for.
    #[must_use]
    pub const fn path(&self) -> ExecutionPath {
        self.path
    }

    /// Returns the decision kind.
    #[must_use]
    pub const fn kind(&self) -> DecisionKind {
        self.kind
    }

    /// Returns `true` when the tool may run.
    #[must_use]
    pub const fn is_allow(&self) -> bool {
        matches!(self.kind, DecisionKind::Allow)
    }

    /// Returns the refusal reason, if any.
    #[must_use]
    pub const fn reason(&self) -> Option<&'static str> {
        self.reason
    }
}

/// Decides whether a tool may run on a given path.
///
/// Tools requiring confirmation are unreachable through [`ExecutionPath::Direct`];
/// tools that do not require it are rejected on [`ExecutionPath::Confirmed`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PathPolicy;

impl PathPolicy {
    /// Evaluates the path for a tool whose confirmation requirement is already known.
    #[must_use]
    pub const fn evaluate(self, path: ExecutionPath, requires_confirmation: bool) -> PolicyDecision {
        let (kind, reason) = match (path, requires_confirmation) {
            (ExecutionPath::Direct, true) => (
                DecisionKind::RequireConfirmation,
                Some("tool requires human confirmation"),
            ),
            (ExecutionPath::Confirmed, false) => (
                DecisionKind::Deny,
                Some("tool does not require confirmation; use the unconfirmed path instead"),
            ),
            _ => (DecisionKind::Allow, None),
        };
        PolicyDecision { path, kind, reason }
    }
}

/// States of a confirmation proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationState {
    /// Call proposed; no side effects have run.
    Proposed,
    /// A human confirmed the call; execution may start.
    Confirmed,
    /// The confirmed call was executed.
    Executed,
    /// The proposal was rejected or expired.
    Rejected,
}

impl ConfirmationState {
    /// Returns `true` once no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Executed | Self::Rejected)
    }

    /// Applies an event, returning the next state.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidTransition`] when the event is not allowed
    /// from this state.
    pub fn transition(self, event: ConfirmationEvent) -> PolicyResult<Self> {
        let next = match (self, event) {
            (Self::Proposed, ConfirmationEvent::Confirm) => Self::Confirmed,
            (Self::Proposed, ConfirmationEvent::Reject) => Self::Rejected,
            (Self::Confirmed, ConfirmationEvent::Execute) => Self::Executed,
            (from, event) => return Err(PolicyError::InvalidTransition { from, event }),
        };

        debug!(from = ?self, to = ?next, ?event, "confirmation transition");
        Ok(next)
    }
}

/// Events driving [`ConfirmationState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationEvent {
    /// Human approved the proposal.
    Confirm,
    /// Human declined the proposal, or it expired.
    Reject,
    /// The confirmed call ran.
    Execute,
}
