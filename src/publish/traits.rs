//! Traits and types for artifact distribution

use crate::error::{PublishError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;

/// Identifier of a distribution target (a Telegram chat id, for instance)
pub type DestinationId = String;

/// Delivers artifacts to destinations
///
/// Implementations report rate limiting as [`PublishError::RateLimited`] so the
/// retrier can honor the requested wait.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Deliver the file at `artifact` to `destination`
    async fn publish(
        &self,
        destination: &str,
        artifact: &Path,
    ) -> std::result::Result<(), PublishError>;
}

/// Enumerates the destinations a batch publishes to
#[async_trait]
pub trait DestinationSource: Send + Sync {
    /// List destinations; called once per batch
    async fn list_destinations(&self) -> Result<Vec<DestinationId>>;
}

/// Deduplicated destinations in first-seen order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DestinationSet {
    ids: Vec<DestinationId>,
}

impl DestinationSet {
    /// Number of destinations
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether there is nowhere to publish to
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate over destinations
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

impl FromIterator<DestinationId> for DestinationSet {
    fn from_iter<I: IntoIterator<Item = DestinationId>>(iter: I) -> Self {
        let mut seen = HashSet::new();
        let ids = iter
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        Self { ids }
    }
}
