//! Audit entry types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use toolgate_primitives::{CallerId, InvocationId};
use uuid::Uuid;

/// Operation that produced an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Unconfirmed execute request.
    Execute,
    /// Confirmed execute request.
    ExecuteConfirmed,
    /// Proposal of a confirmation-gated call.
    Propose,
    /// Confirmation of a stored proposal.
    Confirm,
    /// Rejection of a stored proposal.
    Reject,
}

impl AuditAction {
    /// Returns the snake case label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Execute => "execute",
            Self::ExecuteConfirmed => "execute_confirmed",
            Self::Propose => "propose",
            Self::Confirm => "confirm",
            Self::Reject => "reject",
        }
    }
}

/// Outcome recorded for an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The operation completed.
    Success,
    /// Input failed schema validation.
    ValidationFailed,
    /// The tool name (or proposal) was unknown.
    NotFound,
    /// A confirmation-gated tool reached the unconfirmed path.
    ConfirmationRequired,
    /// The tool was refused on this path.
    PolicyBlocked,
    /// The caller exceeded its rate limit.
    RateLimited,
    /// The final attempt timed out.
    Timeout,
    /// The handler failed.
    ExecutionFailed,
}

impl AuditOutcome {
    /// Returns `true` for security-boundary events that operators should review.
    #[must_use]
    pub const fn is_security_event(self) -> bool {
        matches!(self, Self::ConfirmationRequired | Self::PolicyBlocked)
    }
}

/// Finalized, immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    id: Uuid,
    invocation_id: InvocationId,
    action: AuditAction,
    tool: String,
    caller: CallerId,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    duration_ms: u64,
    outcome: AuditOutcome,
    success: bool,
    flagged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    metadata: Map<String, Value>,
}

impl AuditEntry {
    /// Opens an in-progress entry stamped with the current time.
    #[must_use]
    pub fn begin(
        action: AuditAction,
        tool: impl Into<String>,
        caller: CallerId,
        invocation_id: InvocationId,
    ) -> PendingAuditEntry {
        PendingAuditEntry {
            invocation_id,
            action,
            tool: tool.into(),
            caller,
            started_at: Utc::now(),
            metadata: Map::new(),
        }
    }

    /// Returns the entry identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the invocation this entry belongs to.
    #[must_use]
    pub fn invocation_id(&self) -> InvocationId {
        self.invocation_id
    }

    /// Returns the audited action.
    #[must_use]
    pub fn action(&self) -> AuditAction {
        self.action
    }

    /// Returns the tool name as supplied by the caller.
    #[must_use]
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Returns the caller identity.
    #[must_use]
    pub fn caller(&self) -> &CallerId {
        &self.caller
    }

    /// Returns when the attempt started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the attempt finished.
    #[must_use]
    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    /// Returns the wall-clock duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Returns the recorded outcome.
    #[must_use]
    pub fn outcome(&self) -> AuditOutcome {
        self.outcome
    }

    /// Returns `true` when the attempt succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Returns `true` for flagged security events.
    #[must_use]
    pub fn is_flagged(&self) -> bool {
        self.flagged
    }

    /// Returns the failure reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Returns attached metadata.
    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }
}

/// Entry for an attempt still in progress.
#[derive(Debug)]
#[must_use = "a pending audit entry must be finished and logged"]
pub struct PendingAuditEntry {
    invocation_id: InvocationId,
    action: AuditAction,
    tool: String,
    caller: CallerId,
    started_at: DateTime<Utc>,
    metadata: Map<String, Value>,
}

impl PendingAuditEntry {
    /// Attaches metadata to the entry.
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Returns the caller identity.
    #[must_use]
    pub fn caller(&self) -> &CallerId {
        &self.caller
    }

    /// Finalizes the entry. Consumes the pending value so it can be finished only once.
    #[must_use]
    pub fn finish(self, outcome: AuditOutcome, reason: Option<String>) -> AuditEntry {
        let finished_at = Utc::now();
        let duration_ms = (finished_at - self.started_at)
            .num_milliseconds()
            .try_into()
            .unwrap_or(0);

        AuditEntry {
            id: Uuid::new_v4(),
            invocation_id: self.invocation_id,
            action: self.action,
            tool: self.tool,
            caller: self.caller,
            started_at: self.started_at,
            finished_at,
            duration_ms,
            outcome,
            success: outcome == AuditOutcome::Success,
            flagged: outcome.is_security_event(),
            reason,
            metadata: self.metadata,
        }
    }
}
