//! Batch orchestration and interruption handling.

use super::item::{ItemPipeline, PipelineShared};
use super::limiter::ConcurrencyLimiter;
use super::stages::{FetchStage, PublishStage};
use super::tracker::CompletionTracker;
use super::BatchRunner;
use crate::error::{Error, Result};
use crate::metadata::load_records;
use crate::publish::DestinationSet;
use crate::snapshot::{clear_snapshot, load_snapshot, save_snapshot};
use crate::types::{BatchSummary, BookRecord, Event, ItemId};
use crate::utils::ArtifactNamer;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Records chosen for a run and where they came from
#[derive(Debug)]
pub(crate) struct ItemSource {
    pub(crate) records: Vec<BookRecord>,
    pub(crate) path: PathBuf,
    pub(crate) resumed: bool,
}

impl BatchRunner {
    /// Run the batch until every item is terminal or `shutdown` resolves
    ///
    /// Sequence:
    /// 1. Resolves destinations once (publishing runners only)
    /// 2. Loads items from the remaining-work snapshot if one exists, otherwise from
    ///    the metadata file
    /// 3. Creates the output directory and assigns artifact paths
    /// 4. Spawns one pipeline per item, gated by the concurrency limiter
    /// 5. Waits for all pipelines, racing against `shutdown`
    /// 6. On interruption, cancels and waits for every pipeline to return, then
    ///    writes all non-terminal records to a new snapshot
    /// 7. On a clean finish, removes a snapshot that this run consumed
    ///
    /// # Errors
    ///
    /// [`Error::NoDestinations`] if a publishing runner resolves no destinations,
    /// [`Error::NoItems`] if the chosen source yields nothing, or an I/O error if the
    /// output directory or snapshot cannot be written.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<BatchSummary>
    where
        F: Future<Output = ()>,
    {
        let publishing = self.is_publishing();

        // 1. Destinations
        let publish_stage = match &self.distribution {
            Some(distribution) => {
                let destinations: DestinationSet = distribution
                    .destinations
                    .list_destinations()
                    .await?
                    .into_iter()
                    .collect();
                if destinations.is_empty() {
                    tracing::error!("no destinations to publish to");
                    return Err(Error::NoDestinations);
                }
                tracing::info!(
                    count = destinations.len(),
                    destinations = ?destinations.iter().collect::<Vec<_>>(),
                    "resolved destinations"
                );
                Some(PublishStage::new(
                    distribution.publisher.clone(),
                    Arc::new(destinations),
                    self.config.publish_retry.clone(),
                    self.config.publish_policy,
                ))
            }
            None => None,
        };
        let destination_count = publish_stage
            .as_ref()
            .map_or(0, |stage| stage.destinations().len());

        // 2. Items
        let source = self.load_items().await;
        if source.records.is_empty() {
            tracing::error!(path = %source.path.display(), "no items to process");
            return Err(Error::NoItems {
                source_path: source.path,
            });
        }

        // 3. Output directory and artifact paths
        let output_dir = &self.config.paths.output_dir;
        tokio::fs::create_dir_all(output_dir).await?;
        let mut namer = ArtifactNamer::new(output_dir.clone(), &self.config.paths.artifact_extension);
        let artifacts: Vec<PathBuf> = source
            .records
            .iter()
            .map(|record| namer.assign(&record.display_name))
            .collect();

        let total = source.records.len();
        let tracker = Arc::new(CompletionTracker::new(source.records.clone(), publishing));
        let cancel = CancellationToken::new();
        let shared = Arc::new(PipelineShared {
            fetch: FetchStage::new(self.fetcher.clone(), self.config.fetch_retry.clone()),
            publish: publish_stage,
            ledger: self.ledger.clone(),
            tracker: tracker.clone(),
            limiter: ConcurrencyLimiter::new(self.config.effective_concurrency()),
            events: self.event_tx.clone(),
            cancel: cancel.clone(),
        });

        tracing::info!(
            total,
            source = %source.path.display(),
            resumed = source.resumed,
            concurrency = shared.limiter.capacity(),
            "starting batch"
        );
        let _ = self.event_tx.send(Event::BatchStarted {
            total,
            source: source.path.clone(),
            resumed: source.resumed,
            destinations: destination_count,
        });

        // 4. Dispatch
        let mut tasks = JoinSet::new();
        for (index, (record, artifact)) in source.records.iter().cloned().zip(artifacts).enumerate() {
            let pipeline = ItemPipeline {
                id: ItemId(index),
                record,
                artifact,
                shared: shared.clone(),
            };
            tasks.spawn(pipeline.run());
        }

        // 5. Wait, racing against shutdown
        tokio::pin!(shutdown);
        let mut interrupted = false;
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested, stopping batch");
                    interrupted = true;
                    break;
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "item pipeline aborted, stopping batch");
                        interrupted = true;
                        break;
                    }
                },
            }
        }

        // 6. Quiesce before reading the tracker
        if interrupted {
            cancel.cancel();
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::warn!(error = %e, "item pipeline aborted during shutdown");
                }
            }
            tracing::info!("all item pipelines stopped");
        }

        let remaining = tracker.remaining();
        let mut summary = tracker.summary();

        if !remaining.is_empty() {
            let snapshot_path = &self.config.paths.remaining_file;
            save_snapshot(snapshot_path, &remaining).await?;
            summary.interrupted = true;
            summary.snapshot = Some(snapshot_path.clone());
            tracing::warn!(
                remaining = remaining.len(),
                path = %snapshot_path.display(),
                "batch interrupted, unfinished items saved"
            );
            let _ = self.event_tx.send(Event::Interrupted {
                remaining: remaining.len(),
                snapshot: summary.snapshot.clone(),
            });
            return Ok(summary);
        }

        // 7. Clean finish
        if source.resumed {
            clear_snapshot(&source.path).await?;
        }
        tracing::info!(
            total = summary.total,
            succeeded = summary.succeeded,
            fetch_failed = summary.fetch_failed,
            publish_failed = summary.publish_failed,
            "batch complete"
        );
        let _ = self.event_tx.send(Event::BatchComplete {
            succeeded: summary.succeeded,
            fetch_failed: summary.fetch_failed,
            publish_failed: summary.publish_failed,
        });
        Ok(summary)
    }

    /// Run the batch to completion without an external shutdown signal
    pub async fn run(&self) -> Result<BatchSummary> {
        self.run_until(std::future::pending()).await
    }

    /// Pick the item source; an existing snapshot always wins over the metadata file
    pub(crate) async fn load_items(&self) -> ItemSource {
        let snapshot_path = &self.config.paths.remaining_file;
        match load_snapshot(snapshot_path).await {
            Ok(Some(records)) => {
                tracing::info!(
                    path = %snapshot_path.display(),
                    count = records.len(),
                    "resuming from remaining-work snapshot"
                );
                return ItemSource {
                    records,
                    path: snapshot_path.clone(),
                    resumed: true,
                };
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(
                    path = %snapshot_path.display(),
                    error = %e,
                    "remaining-work snapshot exists but cannot be read"
                );
                return ItemSource {
                    records: Vec::new(),
                    path: snapshot_path.clone(),
                    resumed: true,
                };
            }
        }

        let metadata_path = &self.config.paths.metadata_file;
        tracing::info!(path = %metadata_path.display(), "loading books from metadata file");
        ItemSource {
            records: load_records(metadata_path).await,
            path: metadata_path.clone(),
            resumed: false,
        }
    }
}
