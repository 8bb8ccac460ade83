//! Concurrent batch processing split into focused submodules.
//!
//! The [`BatchRunner`] struct and its parts are organized by concern:
//! - [`stages`] - Fetch and publish stage executors (retry around one collaborator call)
//! - [`item`] - Per-item state machine (fetch, publish, cleanup)
//! - [`limiter`] - Admission slots bounding concurrent pipelines
//! - [`tracker`] - Per-item state map used to build the remaining-work snapshot
//! - [`lifecycle`] - Batch orchestration and interruption handling

mod item;
mod lifecycle;
mod limiter;
mod stages;
mod tracker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

pub use limiter::ConcurrencyLimiter;
pub use stages::{FetchStage, PublishFailure, PublishStage};
pub use tracker::CompletionTracker;

use crate::config::Config;
use crate::error::Result;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::ledger::FailureLedger;
use crate::publish::{DestinationSource, Publisher, StaticDestinations, TelegramPublisher};
use crate::types::Event;
use std::sync::Arc;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Collaborators of the publish stage
#[derive(Clone)]
pub(crate) struct Distribution {
    pub(crate) publisher: Arc<dyn Publisher>,
    pub(crate) destinations: Arc<dyn DestinationSource>,
}

/// Runs a batch of items through the pipeline (cloneable - all fields are Arc-wrapped)
///
/// A runner without a publisher only downloads (archive shape); artifacts are kept.
/// With a publisher every downloaded artifact is delivered to each destination and
/// then deleted (relay shape).
#[derive(Clone)]
pub struct BatchRunner {
    pub(crate) config: Arc<Config>,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) distribution: Option<Distribution>,
    pub(crate) ledger: Arc<FailureLedger>,
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
}

impl BatchRunner {
    /// Create a download-only runner around `fetcher`
    pub fn new(config: Config, fetcher: Arc<dyn Fetcher>) -> Self {
        let (event_tx, _rx) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let ledger = Arc::new(FailureLedger::new(
            config.paths.fetch_failures.clone(),
            config.paths.publish_failures.clone(),
        ));
        Self {
            config: Arc::new(config),
            fetcher,
            distribution: None,
            ledger,
            event_tx,
        }
    }

    /// Add a publish stage delivering to the destinations listed by `destinations`
    pub fn with_publisher(
        mut self,
        publisher: Arc<dyn Publisher>,
        destinations: Arc<dyn DestinationSource>,
    ) -> Self {
        self.distribution = Some(Distribution {
            publisher,
            destinations,
        });
        self
    }

    /// Runner that downloads over HTTP and keeps the artifacts
    pub fn archive(config: Config) -> Result<Self> {
        config.validate()?;
        let fetcher = Arc::new(HttpFetcher::new(&config.http)?);
        Ok(Self::new(config, fetcher))
    }

    /// Runner that downloads over HTTP and relays each artifact through Telegram
    ///
    /// Destinations come from `telegram.destinations` when set, otherwise from the
    /// chats the bot has seen.
    pub fn relay(config: Config) -> Result<Self> {
        config.validate()?;
        let fetcher = Arc::new(HttpFetcher::new(&config.http)?);
        let telegram = Arc::new(TelegramPublisher::new(&config.telegram, &config.http)?);
        let destinations: Arc<dyn DestinationSource> = if config.telegram.destinations.is_empty()
        {
            telegram.clone()
        } else {
            Arc::new(StaticDestinations::new(config.telegram.destinations.clone()))
        };
        Ok(Self::new(config, fetcher).with_publisher(telegram, destinations))
    }

    /// Subscribe to batch events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Configuration the runner was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether the runner has a publish stage
    pub fn is_publishing(&self) -> bool {
        self.distribution.is_some()
    }
}
