//! Per-item pipeline: fetch, optional publish, cleanup

use super::limiter::ConcurrencyLimiter;
use super::stages::{FetchStage, ItemContext, PublishStage};
use super::tracker::CompletionTracker;
use crate::ledger::FailureLedger;
use crate::types::{BookRecord, Event, ItemId, ItemState, Stage};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Handles shared by every pipeline of a batch
pub(crate) struct PipelineShared {
    pub(crate) fetch: FetchStage,
    pub(crate) publish: Option<PublishStage>,
    pub(crate) ledger: Arc<FailureLedger>,
    pub(crate) tracker: Arc<CompletionTracker>,
    pub(crate) limiter: ConcurrencyLimiter,
    pub(crate) events: broadcast::Sender<Event>,
    pub(crate) cancel: CancellationToken,
}

/// One item's trip through the stages
///
/// Cancellation is observed while waiting for a slot, fetching and publishing
/// (backoff sleeps included). Ledger appends, tracker updates and cleanup are
/// never interrupted, so a failed item cannot also end up in the snapshot.
pub(crate) struct ItemPipeline {
    pub(crate) id: ItemId,
    pub(crate) record: BookRecord,
    pub(crate) artifact: PathBuf,
    pub(crate) shared: Arc<PipelineShared>,
}

impl ItemPipeline {
    /// Drive the item to a terminal state, or stop early on cancellation
    ///
    /// Returns the state the item was left in.
    pub(crate) async fn run(self) -> ItemState {
        let shared = &*self.shared;
        let name = self.record.display_name.as_str();
        let item = ItemContext {
            id: self.id,
            name,
            events: &shared.events,
        };

        let _permit = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => return ItemState::Pending,
            permit = shared.limiter.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return ItemState::Pending,
            },
        };

        // Fetch
        self.transition(ItemState::Fetching);
        item.emit(Event::Fetching {
            id: self.id,
            name: name.to_string(),
        });

        let fetched = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => {
                tracing::debug!(item = name, "cancelled while fetching");
                return ItemState::Fetching;
            }
            result = shared.fetch.run(item, &self.record.source_locator, &self.artifact) => result,
        };

        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(item = name, error = %e, "download failed");
                self.record_failure(Stage::Fetch).await;
                self.transition(ItemState::FetchFailed);
                item.emit(Event::FetchFailed {
                    id: self.id,
                    name: name.to_string(),
                    error: e.to_string(),
                });
                return ItemState::FetchFailed;
            }
        };

        self.transition(ItemState::Fetched);
        item.emit(Event::Fetched {
            id: self.id,
            name: name.to_string(),
            path: self.artifact.clone(),
            bytes,
        });

        let Some(publish) = &shared.publish else {
            item.emit(Event::ItemComplete {
                id: self.id,
                name: name.to_string(),
            });
            return ItemState::Fetched;
        };

        // Publish
        self.transition(ItemState::Publishing);
        let published = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => {
                tracing::debug!(item = name, "cancelled while publishing");
                return ItemState::Publishing;
            }
            result = publish.run(item, &self.artifact) => result,
        };

        if let Err(failure) = published {
            tracing::error!(item = name, error = %failure, "distribution failed, artifact kept");
            self.record_failure(Stage::Publish).await;
            self.transition(ItemState::PublishFailed);
            item.emit(Event::PublishFailed {
                id: self.id,
                name: name.to_string(),
                destination: failure.destinations.join(", "),
                error: failure.error.to_string(),
            });
            return ItemState::PublishFailed;
        }
        self.transition(ItemState::Published);

        // Cleanup
        self.transition(ItemState::CleaningUp);
        match tokio::fs::remove_file(&self.artifact).await {
            Ok(()) => item.emit(Event::CleanedUp {
                id: self.id,
                name: name.to_string(),
                path: self.artifact.clone(),
            }),
            Err(e) => {
                tracing::warn!(item = name, path = %self.artifact.display(), error = %e, "failed to delete artifact");
                item.emit(Event::CleanupFailed {
                    id: self.id,
                    name: name.to_string(),
                    path: self.artifact.clone(),
                    error: e.to_string(),
                });
            }
        }

        self.transition(ItemState::Done);
        item.emit(Event::ItemComplete {
            id: self.id,
            name: name.to_string(),
        });
        ItemState::Done
    }

    fn transition(&self, state: ItemState) {
        self.shared.tracker.set(self.id, state);
    }

    async fn record_failure(&self, stage: Stage) {
        if let Err(e) = self.shared.ledger.record(stage, &self.record).await {
            tracing::error!(
                item = %self.record.display_name,
                stage = %stage,
                error = %e,
                "failed to append to failure ledger"
            );
        }
    }
}
