//! Core types for book-relay

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One book to process, as read from the metadata file
///
/// Fields other than the two required ones are kept verbatim so they can be
/// written back unchanged to failure ledgers and snapshots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    /// Human-readable title; also the basis of the artifact file name
    #[serde(rename = "Book name")]
    pub display_name: String,

    /// Where the file is downloaded from
    #[serde(rename = "Download PDF")]
    pub source_locator: String,

    /// Any other fields present in the source object
    #[serde(flatten)]
    pub extras: serde_json::Map<String, serde_json::Value>,
}

impl BookRecord {
    /// Create a record with no extra fields
    pub fn new(display_name: impl Into<String>, source_locator: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            source_locator: source_locator.into(),
            extras: serde_json::Map::new(),
        }
    }
}

/// Position of an item within the current batch
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub usize);

impl ItemId {
    /// Get the inner index
    pub fn get(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Network-facing step with its own retry budget and failure ledger
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Download the artifact
    Fetch,
    /// Deliver the artifact to every destination
    Publish,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Fetch => write!(f, "fetch"),
            Stage::Publish => write!(f, "publish"),
        }
    }
}

/// Where an item is in its pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Waiting for an admission slot
    Pending,
    /// Download in progress
    Fetching,
    /// Download retries exhausted (terminal)
    FetchFailed,
    /// Artifact is on disk
    Fetched,
    /// Delivery in progress
    Publishing,
    /// Delivery retries exhausted (terminal, artifact kept)
    PublishFailed,
    /// Delivered to every destination
    Published,
    /// Removing the local artifact
    CleaningUp,
    /// Delivered and cleaned up (terminal)
    Done,
}

impl ItemState {
    /// Whether the item needs no further work
    ///
    /// `Fetched` is only terminal when the pipeline has no publish stage.
    pub fn is_terminal(&self, publishing: bool) -> bool {
        match self {
            ItemState::FetchFailed | ItemState::PublishFailed | ItemState::Done => true,
            ItemState::Fetched => !publishing,
            _ => false,
        }
    }

    /// Whether the state is a successful end state
    pub fn is_success(&self, publishing: bool) -> bool {
        match self {
            ItemState::Done => true,
            ItemState::Fetched => !publishing,
            _ => false,
        }
    }
}

/// Rendering category for an [`Event`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    /// Progress information
    Info,
    /// A stage or item completed
    Success,
    /// An attempt failed and will be retried
    Retry,
    /// A stage or batch failed
    Failure,
    /// Local artifact housekeeping
    Cleanup,
}

/// Event emitted during a batch
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Batch dispatch is about to begin
    BatchStarted {
        /// Number of items in the batch
        total: usize,
        /// File the items were read from
        source: PathBuf,
        /// Whether the items came from a remaining-work snapshot
        resumed: bool,
        /// Number of resolved destinations (0 when not publishing)
        destinations: usize,
    },

    /// Item obtained an admission slot and started downloading
    Fetching {
        /// Item id
        id: ItemId,
        /// Display name
        name: String,
    },

    /// Download finished
    Fetched {
        /// Item id
        id: ItemId,
        /// Display name
        name: String,
        /// Artifact location
        path: PathBuf,
        /// Bytes written
        bytes: u64,
    },

    /// A single attempt failed; another one may follow
    AttemptFailed {
        /// Item id
        id: ItemId,
        /// Display name
        name: String,
        /// Which stage failed
        stage: Stage,
        /// 1-based attempt number
        attempt: u32,
        /// Attempt budget
        max_attempts: u32,
        /// Error message
        error: String,
    },

    /// Download retries exhausted
    FetchFailed {
        /// Item id
        id: ItemId,
        /// Display name
        name: String,
        /// Last error message
        error: String,
    },

    /// Delivery to one destination started
    Publishing {
        /// Item id
        id: ItemId,
        /// Display name
        name: String,
        /// Destination identifier
        destination: String,
    },

    /// Delivery to one destination succeeded
    Published {
        /// Item id
        id: ItemId,
        /// Display name
        name: String,
        /// Destination identifier
        destination: String,
    },

    /// Delivery retries exhausted
    PublishFailed {
        /// Item id
        id: ItemId,
        /// Display name
        name: String,
        /// Destination(s) that failed
        destination: String,
        /// Last error message
        error: String,
    },

    /// Local artifact removed
    CleanedUp {
        /// Item id
        id: ItemId,
        /// Display name
        name: String,
        /// Removed file
        path: PathBuf,
    },

    /// Local artifact could not be removed (item still counts as done)
    CleanupFailed {
        /// Item id
        id: ItemId,
        /// Display name
        name: String,
        /// File that was left behind
        path: PathBuf,
        /// Error message
        error: String,
    },

    /// Item reached its successful end state
    ItemComplete {
        /// Item id
        id: ItemId,
        /// Display name
        name: String,
    },

    /// Shutdown requested; unfinished items were saved for the next run
    Interrupted {
        /// Number of unfinished items
        remaining: usize,
        /// Snapshot file, if one was written
        snapshot: Option<PathBuf>,
    },

    /// Every item reached a terminal state
    BatchComplete {
        /// Items that succeeded
        succeeded: usize,
        /// Items whose download failed
        fetch_failed: usize,
        /// Items whose delivery failed
        publish_failed: usize,
    },
}

impl Event {
    /// How a front end should present this event
    pub fn category(&self) -> Category {
        match self {
            Event::BatchStarted { .. }
            | Event::Fetching { .. }
            | Event::Publishing { .. }
            | Event::BatchComplete { .. } => Category::Info,
            Event::Fetched { .. } | Event::Published { .. } | Event::ItemComplete { .. } => {
                Category::Success
            }
            Event::AttemptFailed { .. } => Category::Retry,
            Event::FetchFailed { .. } | Event::PublishFailed { .. } | Event::Interrupted { .. } => {
                Category::Failure
            }
            Event::CleanedUp { .. } | Event::CleanupFailed { .. } => Category::Cleanup,
        }
    }
}

/// Outcome of [`BatchRunner::run_until`](crate::batch::BatchRunner::run_until)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Items in the batch
    pub total: usize,
    /// Items that reached a successful end state
    pub succeeded: usize,
    /// Items recorded in the fetch failure ledger
    pub fetch_failed: usize,
    /// Items recorded in the publish failure ledger
    pub publish_failed: usize,
    /// Items that had not reached a terminal state
    pub remaining: usize,
    /// Whether the batch was cut short
    pub interrupted: bool,
    /// Snapshot written for the unfinished items
    pub snapshot: Option<PathBuf>,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_record_preserves_unknown_fields() {
        let json = r#"{"Book name":"Dune","Download PDF":"http://x/dune.pdf","Author":"Herbert","Year":1965}"#;
        let record: BookRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.display_name, "Dune");
        assert_eq!(record.source_locator, "http://x/dune.pdf");
        assert_eq!(record.extras.len(), 2);

        let back = serde_json::to_string(&record).unwrap();
        assert_eq!(back, json);
    }

    #[test]
    fn book_record_requires_name_and_locator() {
        let result: Result<BookRecord, _> = serde_json::from_str(r#"{"Book name":"Dune"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn fetched_is_terminal_only_without_publishing() {
        assert!(ItemState::Fetched.is_terminal(false));
        assert!(!ItemState::Fetched.is_terminal(true));
        assert!(ItemState::Fetched.is_success(false));
        assert!(ItemState::PublishFailed.is_terminal(true));
        assert!(ItemState::Done.is_success(true));
        for state in [
            ItemState::Pending,
            ItemState::Fetching,
            ItemState::Publishing,
            ItemState::Published,
            ItemState::CleaningUp,
        ] {
            assert!(!state.is_terminal(true), "{state:?}");
            assert!(!state.is_terminal(false), "{state:?}");
        }
    }

    #[test]
    fn events_map_to_categories() {
        let id = ItemId(0);
        let name = "Dune".to_string();
        assert_eq!(
            Event::AttemptFailed {
                id,
                name: name.clone(),
                stage: Stage::Fetch,
                attempt: 1,
                max_attempts: 5,
                error: "503".into(),
            }
            .category(),
            Category::Retry
        );
        assert_eq!(
            Event::ItemComplete { id, name: name.clone() }.category(),
            Category::Success
        );
        assert_eq!(
            Event::FetchFailed {
                id,
                name: name.clone(),
                error: "404".into()
            }
            .category(),
            Category::Failure
        );
        assert_eq!(
            Event::CleanedUp {
                id,
                name,
                path: PathBuf::from("books/Dune.pdf")
            }
            .category(),
            Category::Cleanup
        );
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = Event::Fetching {
            id: ItemId(3),
            name: "Dune".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "fetching");
        assert_eq!(value["id"], 3);
    }
}
