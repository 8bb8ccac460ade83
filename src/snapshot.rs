//! Remaining-work snapshot
//!
//! On interruption the batch runner writes every unfinished record here. The file
//! is replaced atomically (temp file in the same directory, fsync, rename) so a
//! restart sees either the complete previous snapshot or the new one.

use crate::error::Result;
use crate::types::BookRecord;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Read a snapshot; `None` if no snapshot exists
pub async fn load_snapshot(path: &Path) -> Result<Option<Vec<BookRecord>>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let records: Vec<BookRecord> = serde_json::from_str(&content)?;
    Ok(Some(records))
}

/// Atomically replace the snapshot at `path` with `records`
pub async fn save_snapshot(path: &Path, records: &[BookRecord]) -> Result<()> {
    let content = serde_json::to_string_pretty(records)?;
    let target = path.to_path_buf();
    let count = records.len();

    tokio::task::spawn_blocking(move || write_atomic(&target, content.as_bytes()))
        .await
        .map_err(std::io::Error::other)??;

    tracing::info!(path = %path.display(), count, "remaining-work snapshot written");
    Ok(())
}

/// Remove the snapshot if present
pub async fn clear_snapshot(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::info!(path = %path.display(), "remaining-work snapshot removed");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn write_atomic(target: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn absent_snapshot_is_none() {
        let dir = tempdir().unwrap();
        let loaded = load_snapshot(&dir.path().join("remainingbooks.json"))
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn save_then_load_returns_same_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("remainingbooks.json");
        let mut record = BookRecord::new("Dune", "http://x/dune.pdf");
        record
            .extras
            .insert("Author".into(), serde_json::json!("Frank Herbert"));
        let records = vec![record, BookRecord::new("Emma", "http://x/emma.pdf")];

        save_snapshot(&path, &records).await.unwrap();
        let loaded = load_snapshot(&path).await.unwrap().unwrap();
        assert_eq!(loaded, records);
    }

    #[tokio::test]
    async fn save_overwrites_previous_snapshot_without_leftovers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("remainingbooks.json");

        save_snapshot(&path, &[BookRecord::new("Old", "http://x/old.pdf")])
            .await
            .unwrap();
        save_snapshot(&path, &[BookRecord::new("New", "http://x/new.pdf")])
            .await
            .unwrap();

        let loaded = load_snapshot(&path).await.unwrap().unwrap();
        assert_eq!(loaded, vec![BookRecord::new("New", "http://x/new.pdf")]);
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1, "temp files must not be left behind");
    }

    #[tokio::test]
    async fn snapshot_is_pretty_printed_and_keeps_non_ascii() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("remainingbooks.json");
        save_snapshot(&path, &[BookRecord::new("كتاب", "http://x/k.pdf")])
            .await
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("كتاب"));
        assert!(content.contains('\n'));
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("remainingbooks.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(load_snapshot(&path).await.is_err());
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("remainingbooks.json");
        save_snapshot(&path, &[]).await.unwrap();
        clear_snapshot(&path).await.unwrap();
        assert!(!path.exists());
        clear_snapshot(&path).await.unwrap();
    }
}
