//! Audit sinks and the fan-out log.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use toolgate_primitives::{CallerId, InvocationId};
use tracing::{info, warn};

use crate::AuditResult;
use crate::entry::AuditEntry;

/// Destination for finalized audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends an entry.
    async fn record(&self, entry: &AuditEntry) -> AuditResult<()>;
}

/// In-process append-only store, useful for inspection and tests.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all entries in append order.
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }

    /// Returns the entries recorded for a caller.
    pub async fn for_caller(&self, caller: &CallerId) -> Vec<AuditEntry> {
        self.filtered(|entry| entry.caller() == caller).await
    }

    /// Returns the entries recorded for one invocation.
    pub async fn for_invocation(&self, invocation_id: InvocationId) -> Vec<AuditEntry> {
        self.filtered(|entry| entry.invocation_id() == invocation_id)
            .await
    }

    /// Returns flagged security events.
    pub async fn flagged(&self) -> Vec<AuditEntry> {
        self.filtered(AuditEntry::is_flagged).await
    }

    /// Returns the number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` when nothing has been recorded.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn filtered(&self, predicate: impl Fn(&AuditEntry) -> bool) -> Vec<AuditEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|entry| predicate(entry))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn record(&self, entry: &AuditEntry) -> AuditResult<()> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }
}

/// Sink that emits each entry as a structured tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: &AuditEntry) -> AuditResult<()> {
        if entry.is_flagged() || !entry.is_success() {
            warn!(
                target: "toolgate::audit",
                invocation_id = %entry.invocation_id(),
                action = ?entry.action(),
                tool = entry.tool(),
                caller = %entry.caller(),
                outcome = ?entry.outcome(),
                flagged = entry.is_flagged(),
                reason = entry.reason().unwrap_or_default(),
                duration_ms = entry.duration_ms(),
                "audit"
            );
        } else {
            info!(
                target: "toolgate::audit",
                invocation_id = %entry.invocation_id(),
                action = ?entry.action(),
                tool = entry.tool(),
                caller = %entry.caller(),
                duration_ms = entry.duration_ms(),
                "audit"
            );
        }
        Ok(())
    }
}

/// Append-only audit log fanning entries out to every configured sink.
///
/// Sink failures are logged and never surface to the invocation that produced
/// the entry.
#[derive(Clone, Default)]
pub struct AuditLog {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl AuditLog {
    /// Creates a log without sinks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Creates a log backed by a fresh in-memory store, returning both.
    #[must_use]
    pub fn in_memory() -> (Self, Arc<InMemoryAuditLog>) {
        let store = Arc::new(InMemoryAuditLog::new());
        let log = Self::new().with_sink(store.clone());
        (log, store)
    }

    /// Returns the number of sinks.
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Appends a finalized entry to every sink.
    pub async fn log(&self, entry: AuditEntry) {
        for sink in &self.sinks {
            if let Err(err) = sink.record(&entry).await {
                warn!(
                    invocation_id = %entry.invocation_id(),
                    tool = entry.tool(),
                    error = %err,
                    "audit sink failed"
                );
            }
        }
    }
}
