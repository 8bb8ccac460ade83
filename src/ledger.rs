//! Append-only failure ledgers
//!
//! Each stage has its own ledger file. Every failed item is written as one compact
//! JSON line holding the original record, so a ledger can be fed back to the tool
//! after stripping it into an array, or inspected by hand.

use crate::error::Result;
use crate::types::{BookRecord, Stage};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Durable log of items that exhausted a stage's retries
#[derive(Debug)]
pub struct FailureLedger {
    fetch_path: PathBuf,
    publish_path: PathBuf,
    // serializes appends across concurrently running pipelines
    write_lock: Mutex<()>,
}

impl FailureLedger {
    /// Create a ledger writing fetch failures and publish failures to separate files
    pub fn new(fetch_path: impl Into<PathBuf>, publish_path: impl Into<PathBuf>) -> Self {
        Self {
            fetch_path: fetch_path.into(),
            publish_path: publish_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// File receiving entries for `stage`
    pub fn path_for(&self, stage: Stage) -> &Path {
        match stage {
            Stage::Fetch => &self.fetch_path,
            Stage::Publish => &self.publish_path,
        }
    }

    /// Append `record` to the ledger for `stage`
    ///
    /// The line is written with a single `write_all` on a file opened in append
    /// mode, so entries from different items never interleave.
    pub async fn record(&self, stage: Stage, record: &BookRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let path = self.path_for(stage);
        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!(
            item = %record.display_name,
            stage = %stage,
            path = %path.display(),
            "failure recorded"
        );
        Ok(())
    }
}

/// Parse a ledger file back into records
///
/// A missing file is an empty ledger. Blank lines are skipped.
pub async fn read_entries(path: &Path) -> Result<Vec<BookRecord>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(Into::into))
        .collect()
}
