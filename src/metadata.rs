//! Metadata file loading
//!
//! The metadata file is a JSON array of [`BookRecord`] objects. Loading never fails
//! outright: any read or parse problem is logged and yields an empty list, which the
//! batch runner then reports as [`Error::NoItems`](crate::error::Error::NoItems).

use crate::types::BookRecord;
use std::path::Path;

/// Read the records listed in `path`, in file order
///
/// Returns an empty list if the file is missing, unreadable, not a JSON array, or
/// contains an object without the required fields.
pub async fn load_records(path: &Path) -> Vec<BookRecord> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to read metadata file");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<BookRecord>>(&content) {
        Ok(records) => {
            tracing::info!(path = %path.display(), count = records.len(), "loaded book records");
            records
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to parse metadata file");
            Vec::new()
        }
    }
}
