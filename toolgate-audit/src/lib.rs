//! Audit trail for tool invocations.
//!
//! Every gated invocation attempt yields exactly one finalized [`AuditEntry`].
//! Entries are created in progress via [`AuditEntry::begin`], finalized once
//! with [`PendingAuditEntry::finish`], and appended to every configured sink.

#![warn(missing_docs, clippy::pedantic)]

mod entry;
mod error;
mod journal;
mod sink;

pub use entry::{AuditAction, AuditEntry, AuditOutcome, PendingAuditEntry};
pub use error::{AuditError, AuditResult};
pub use journal::JournalAuditSink;
pub use sink::{AuditLog, AuditSink, InMemoryAuditLog, TracingAuditSink};
