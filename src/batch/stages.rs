//! Fetch and publish stage executors
//!
//! Each stage wraps one collaborator call in [`retry_with_backoff`] and reports a
//! single stage-level outcome. Failed attempts that will be retried are broadcast
//! as [`Event::AttemptFailed`].

use crate::config::{PublishPolicy, RetryConfig};
use crate::error::{FetchError, PublishError};
use crate::fetch::Fetcher;
use crate::publish::{DestinationId, DestinationSet, Publisher};
use crate::retry::retry_with_backoff;
use crate::types::{Event, ItemId, Stage};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Item identity passed to stages for event reporting
#[derive(Clone, Copy)]
pub(crate) struct ItemContext<'a> {
    pub(crate) id: ItemId,
    pub(crate) name: &'a str,
    pub(crate) events: &'a broadcast::Sender<Event>,
}

impl ItemContext<'_> {
    pub(crate) fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }

    fn attempt_failed(&self, stage: Stage, attempt: u32, max_attempts: u32, error: &dyn std::fmt::Display) {
        // the final failure is reported by the pipeline as a stage failure
        if attempt < max_attempts {
            self.emit(Event::AttemptFailed {
                id: self.id,
                name: self.name.to_string(),
                stage,
                attempt,
                max_attempts,
                error: error.to_string(),
            });
        }
    }
}

/// Downloads an item's artifact with retries
#[derive(Clone)]
pub struct FetchStage {
    fetcher: Arc<dyn Fetcher>,
    policy: RetryConfig,
}

impl FetchStage {
    /// Create a fetch stage
    pub fn new(fetcher: Arc<dyn Fetcher>, policy: RetryConfig) -> Self {
        Self { fetcher, policy }
    }

    /// Fetch `locator` into `dest`; the parent directory must already exist
    pub(crate) async fn run(
        &self,
        item: ItemContext<'_>,
        locator: &str,
        dest: &Path,
    ) -> Result<u64, FetchError> {
        let fetcher = &*self.fetcher;
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        retry_with_backoff(&self.policy, item.name, move || {
            attempt += 1;
            let current = attempt;
            async move {
                let result = fetcher.fetch(locator, dest).await;
                if let Err(e) = &result {
                    item.attempt_failed(Stage::Fetch, current, max_attempts, e);
                }
                result
            }
        })
        .await
    }
}

/// Why a publish stage failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishFailure {
    /// Destinations that exhausted their retries
    pub destinations: Vec<DestinationId>,
    /// Last error seen
    pub error: PublishError,
}

impl std::fmt::Display for PublishFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (destinations: {})", self.error, self.destinations.join(", "))
    }
}

/// Delivers an artifact to every destination, one at a time
#[derive(Clone)]
pub struct PublishStage {
    publisher: Arc<dyn Publisher>,
    destinations: Arc<DestinationSet>,
    policy: RetryConfig,
    mode: PublishPolicy,
}

impl PublishStage {
    /// Create a publish stage
    pub fn new(
        publisher: Arc<dyn Publisher>,
        destinations: Arc<DestinationSet>,
        policy: RetryConfig,
        mode: PublishPolicy,
    ) -> Self {
        Self {
            publisher,
            destinations,
            policy,
            mode,
        }
    }

    /// Destinations this stage publishes to
    pub fn destinations(&self) -> &DestinationSet {
        &self.destinations
    }

    /// Publish `artifact` to every destination
    pub(crate) async fn run(
        &self,
        item: ItemContext<'_>,
        artifact: &Path,
    ) -> Result<(), PublishFailure> {
        let mut failed = Vec::new();
        let mut last_error = None;

        for destination in self.destinations.iter() {
            item.emit(Event::Publishing {
                id: item.id,
                name: item.name.to_string(),
                destination: destination.to_string(),
            });

            match self.publish_one(item, destination, artifact).await {
                Ok(()) => {
                    item.emit(Event::Published {
                        id: item.id,
                        name: item.name.to_string(),
                        destination: destination.to_string(),
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        item = item.name,
                        destination,
                        error = %e,
                        "destination exhausted its retries"
                    );
                    failed.push(destination.to_string());
                    last_error = Some(e);
                    if self.mode == PublishPolicy::FailFast {
                        break;
                    }
                }
            }
        }

        match last_error {
            None => Ok(()),
            Some(error) => Err(PublishFailure {
                destinations: failed,
                error,
            }),
        }
    }

    async fn publish_one(
        &self,
        item: ItemContext<'_>,
        destination: &str,
        artifact: &Path,
    ) -> Result<(), PublishError> {
        let publisher = &*self.publisher;
        let max_attempts = self.policy.max_attempts.max(1);
        let label = format!("{} -> {}", item.name, destination);
        let mut attempt = 0;

        retry_with_backoff(&self.policy, &label, move || {
            attempt += 1;
            let current = attempt;
            async move {
                let result = publisher.publish(destination, artifact).await;
                if let Err(e) = &result {
                    item.attempt_failed(Stage::Publish, current, max_attempts, e);
                }
                result
            }
        })
        .await
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::test_helpers::{FakePublisher, ScriptedFetcher, fast_retry};
    use crate::error::FetchErrorKind;
    use std::time::Duration;

    fn destinations(ids: &[&str]) -> Arc<DestinationSet> {
        Arc::new(ids.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_stage_retries_until_success() {
        let (events, mut rx) = broadcast::channel(16);
        let fetcher = Arc::new(ScriptedFetcher::failing_first(2));
        let stage = FetchStage::new(fetcher.clone(), fast_retry(5));
        let item = ItemContext {
            id: ItemId(0),
            name: "Dune",
            events: &events,
        };

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("Dune.pdf");
        stage.run(item, "http://x/dune.pdf", &dest).await.unwrap();

        assert_eq!(fetcher.calls(), 3);
        assert!(dest.exists());
        let mut retries = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, Event::AttemptFailed { stage: Stage::Fetch, .. }) {
                retries += 1;
            }
        }
        assert_eq!(retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_stage_gives_up_after_budget() {
        let (events, mut rx) = broadcast::channel(16);
        let fetcher = Arc::new(ScriptedFetcher::always_failing(FetchErrorKind::HttpStatus(500)));
        let stage = FetchStage::new(fetcher.clone(), fast_retry(3));
        let item = ItemContext {
            id: ItemId(0),
            name: "Dune",
            events: &events,
        };

        let dir = tempfile::tempdir().unwrap();
        let err = stage
            .run(item, "http://x/dune.pdf", &dir.path().join("Dune.pdf"))
            .await
            .unwrap_err();

        assert_eq!(err.kind, FetchErrorKind::HttpStatus(500));
        assert_eq!(fetcher.calls(), 3);
        let mut retries = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, Event::AttemptFailed { .. }) {
                retries += 1;
            }
        }
        assert_eq!(retries, 2, "final failure is not a retry");
    }

    #[tokio::test(start_paused = true)]
    async fn publish_stage_visits_every_destination() {
        let (events, _rx) = broadcast::channel(64);
        let publisher = Arc::new(FakePublisher::new());
        let stage = PublishStage::new(
            publisher.clone(),
            destinations(&["D1", "D2", "D3"]),
            fast_retry(5),
            PublishPolicy::FailFast,
        );
        let item = ItemContext {
            id: ItemId(0),
            name: "Dune",
            events: &events,
        };

        stage.run(item, Path::new("books/Dune.pdf")).await.unwrap();
        assert_eq!(publisher.delivered_to(), vec!["D1", "D2", "D3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn fail_fast_stops_at_first_failed_destination() {
        let (events, _rx) = broadcast::channel(64);
        let publisher = Arc::new(FakePublisher::new().failing_for("D2"));
        let stage = PublishStage::new(
            publisher.clone(),
            destinations(&["D1", "D2", "D3"]),
            fast_retry(2),
            PublishPolicy::FailFast,
        );
        let item = ItemContext {
            id: ItemId(0),
            name: "Dune",
            events: &events,
        };

        let failure = stage.run(item, Path::new("books/Dune.pdf")).await.unwrap_err();
        assert_eq!(failure.destinations, vec!["D2"]);
        assert_eq!(publisher.attempts_for("D2"), 2);
        assert_eq!(publisher.attempts_for("D3"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn best_effort_tries_remaining_destinations() {
        let (events, _rx) = broadcast::channel(64);
        let publisher = Arc::new(FakePublisher::new().failing_for("D1"));
        let stage = PublishStage::new(
            publisher.clone(),
            destinations(&["D1", "D2"]),
            fast_retry(2),
            PublishPolicy::BestEffort,
        );
        let item = ItemContext {
            id: ItemId(0),
            name: "Dune",
            events: &events,
        };

        let failure = stage.run(item, Path::new("books/Dune.pdf")).await.unwrap_err();
        assert_eq!(failure.destinations, vec!["D1"]);
        assert_eq!(publisher.delivered_to(), vec!["D2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_destination_waits_for_hint() {
        let (events, _rx) = broadcast::channel(64);
        let publisher = Arc::new(
            FakePublisher::new().rate_limited_once("D1", Duration::from_secs(3)),
        );
        let stage = PublishStage::new(
            publisher.clone(),
            destinations(&["D1"]),
            fast_retry(5),
            PublishPolicy::FailFast,
        );
        let item = ItemContext {
            id: ItemId(0),
            name: "Dune",
            events: &events,
        };

        stage.run(item, Path::new("books/Dune.pdf")).await.unwrap();
        let times = publisher.attempt_times("D1");
        assert_eq!(times.len(), 2);
        assert!(times[1] - times[0] >= Duration::from_secs(3));
    }
}
