//! Pending confirmation proposals.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use toolgate_policy::{ConfirmationEvent, ConfirmationState};
use toolgate_primitives::CallerId;
use tracing::debug;
use uuid::Uuid;

use crate::error::{InvocationError, InvocationResult};

/// Identifier handed back by `propose`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalId(Uuid);

impl ProposalId {
    /// Generates a random identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ProposalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Snapshot of a proposed call.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    id: ProposalId,
    tool: String,
    input: Value,
    caller: CallerId,
    state: ConfirmationState,
    expires_at: Instant,
}

impl Proposal {
    /// Returns the proposal id.
    #[must_use]
    pub fn id(&self) -> ProposalId {
        self.id
    }

    /// Returns the proposed tool.
    #[must_use]
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Returns the validated input.
    #[must_use]
    pub fn input(&self) -> &Value {
        &self.input
    }

    /// Returns the proposing caller.
    #[must_use]
    pub fn caller(&self) -> &CallerId {
        &self.caller
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ConfirmationState {
        self.state
    }

    /// Returns when the proposal expires.
    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }
}

/// In-memory store of proposals keyed by id.
#[derive(Debug)]
pub(crate) struct ProposalBook {
    entries: Mutex<HashMap<ProposalId, Proposal>>,
    ttl: Duration,
}

impl ProposalBook {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub(crate) fn open(&self, tool: &str, input: Value, caller: CallerId) -> Proposal {
        let proposal = Proposal {
            id: ProposalId::random(),
            tool: tool.to_owned(),
            input,
            caller,
            state: ConfirmationState::Proposed,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(proposal.id, proposal.clone());
        debug!(proposal = %proposal.id, tool, "proposal opened");
        proposal
    }

    /// Returns a live proposal.
    pub(crate) fn get(&self, id: ProposalId) -> Option<Proposal> {
        let now = Instant::now();
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&id)
            .filter(|proposal| proposal.expires_at > now)
            .cloned()
    }

    /// Applies `event` on behalf of `caller`.
    pub(crate) fn apply(
        &self,
        id: ProposalId,
        caller: &CallerId,
        event: ConfirmationEvent,
    ) -> InvocationResult<Proposal> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let proposal = entries
            .get_mut(&id)
            .filter(|proposal| proposal.expires_at > now)
            .ok_or(InvocationError::UnknownProposal { id })?;

        if &proposal.caller != caller {
            return Err(InvocationError::PolicyBlocked {
                tool: proposal.tool.clone(),
                reason: "proposal belongs to another caller".to_owned(),
            });
        }

        let next = proposal
            .state
            .transition(event)
            .map_err(|_| InvocationError::PolicyBlocked {
                tool: proposal.tool.clone(),
                reason: "proposal has already been resolved".to_owned(),
            })?;
        proposal.state = next;
        Ok(proposal.clone())
    }

    /// Drops expired proposals, returning how many were removed.
    pub(crate) fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, proposal| proposal.expires_at > now);
        before - entries.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn caller(id: &str) -> CallerId {
        CallerId::new(id).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn owner_confirms_then_executes() {
        let book = ProposalBook::new(Duration::from_secs(60));
        let proposal = book.open("sendEmail", json!({"to": "a@example.com"}), caller("a"));
        assert_eq!(proposal.state(), ConfirmationState::Proposed);

        let confirmed = book
            .apply(proposal.id(), &caller("a"), ConfirmationEvent::Confirm)
            .unwrap();
        assert_eq!(confirmed.state(), ConfirmationState::Confirmed);

        let executed = book
            .apply(proposal.id(), &caller("a"), ConfirmationEvent::Execute)
            .unwrap();
        assert_eq!(executed.state(), ConfirmationState::Executed);

        let again = book
            .apply(proposal.id(), &caller("a"), ConfirmationEvent::Confirm)
            .unwrap_err();
        assert!(again.is_policy_block());
    }

    #[tokio::test(start_paused = true)]
    async fn other_callers_cannot_resolve() {
        let book = ProposalBook::new(Duration::from_secs(60));
        let proposal = book.open("sendEmail", json!({}), caller("a"));

        let err = book
            .apply(proposal.id(), &caller("b"), ConfirmationEvent::Reject)
            .unwrap_err();
        assert!(matches!(err, InvocationError::PolicyBlocked { .. }));
        assert_eq!(
            book.get(proposal.id()).unwrap().state(),
            ConfirmationState::Proposed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn expired_proposals_disappear() {
        let book = ProposalBook::new(Duration::from_secs(10));
        let proposal = book.open("sendEmail", json!({}), caller("a"));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(book.get(proposal.id()).is_none());
        let err = book
            .apply(proposal.id(), &caller("a"), ConfirmationEvent::Confirm)
            .unwrap_err();
        assert!(matches!(err, InvocationError::UnknownProposal { .. }));

        assert_eq!(book.purge_expired(), 1);
        assert_eq!(book.len(), 0);
    }

    #[test]
    fn id_parses_from_display() {
        let id = ProposalId::random();
        assert_eq!(id.to_string().parse::<ProposalId>().unwrap(), id);
    }
}
