//! Durable JSONL audit journal.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::AuditResult;
use crate::entry::AuditEntry;
use crate::sink::AuditSink;

/// File-backed sink writing one JSON entry per line.
///
/// The file is opened in append mode; entries are never rewritten or removed.
pub struct JournalAuditSink {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl std::fmt::Debug for JournalAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalAuditSink")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl JournalAuditSink {
    /// Opens (or creates) a journal file at the provided path.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors encountered while preparing the file.
    pub async fn open(path: impl Into<PathBuf>) -> AuditResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Returns the underlying path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the most recent `limit` entries, ordered oldest to newest.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or a line fails to parse.
    pub async fn tail(&self, limit: usize) -> AuditResult<Vec<AuditEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let data = {
            let _guard = self.file.lock().await;
            fs::read(&self.path).await?
        };

        let mut entries = Vec::new();
        for line in data
            .split(|byte| *byte == b'\n')
            .filter(|line| !line.is_empty())
        {
            entries.push(serde_json::from_slice::<AuditEntry>(line)?);
        }

        let skip = entries.len().saturating_sub(limit);
        Ok(entries.into_iter().skip(skip).collect())
    }
}

#[async_trait]
impl AuditSink for JournalAuditSink {
    async fn record(&self, entry: &AuditEntry) -> AuditResult<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut guard = self.file.lock().await;
        guard.write_all(&line).await?;
        guard.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolgate_primitives::{CallerId, InvocationId};
    use uuid::Uuid;

    use crate::entry::{AuditAction, AuditOutcome};

    fn temp_path() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("toolgate-audit-{}.jsonl", Uuid::new_v4()));
        path
    }

    fn entry(tool: &str) -> AuditEntry {
        AuditEntry::begin(
            AuditAction::Execute,
            tool,
            CallerId::new("10.0.0.7").unwrap(),
            InvocationId::random(),
        )
        .finish(AuditOutcome::Success, None)
    }

    #[tokio::test]
    async fn append_and_tail() {
        let path = temp_path();
        let journal = JournalAuditSink::open(&path).await.unwrap();

        for tool in ["one", "two", "three"] {
            journal.record(&entry(tool)).await.unwrap();
        }

        let tail = journal.tail(2).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].tool(), "two");
        assert_eq!(tail[1].tool(), "three");
        assert!(journal.tail(0).await.unwrap().is_empty());

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn reopen_appends() {
        let path = temp_path();
        {
            let journal = JournalAuditSink::open(&path).await.unwrap();
            journal.record(&entry("first")).await.unwrap();
        }
        let journal = JournalAuditSink::open(&path).await.unwrap();
        journal.record(&entry("second")).await.unwrap();

        let all = journal.tail(10).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].tool(), "first");

        let _ = std::fs::remove_file(path);
    }
}
