//! # book-relay
//!
//! Concurrent batch downloader that relays books to message channels.
//!
//! A batch is a list of [`BookRecord`]s read from a metadata file. Every record goes
//! through a small pipeline: download the artifact, optionally publish it to each
//! destination, then delete the local copy. Failures at any stage are retried with
//! linear backoff and, once the attempt budget is spent, appended to a per-stage
//! failure ledger. Interrupting a batch writes the unfinished records to a
//! remaining-work snapshot that the next run picks up first.
//!
//! ## Quick Start
//!
//! ```no_run
//! use book_relay::{BatchRunner, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.telegram.bot_token = Some(std::env::var("TELEGRAM_BOT_TOKEN")?);
//!
//!     let runner = BatchRunner::relay(config)?;
//!
//!     // Subscribe to events
//!     let mut events = runner.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = runner.run().await?;
//!     println!("{} of {} books relayed", summary.succeeded, summary.total);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Batch orchestration (decomposed into focused submodules)
pub mod batch;
/// Command line interface
pub mod cli;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Artifact download
pub mod fetch;
/// Append-only failure ledgers
pub mod ledger;
/// Metadata file loading
pub mod metadata;
/// Artifact distribution
pub mod publish;
/// Retry logic with linear backoff
pub mod retry;
/// Remaining-work snapshot
pub mod snapshot;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use batch::BatchRunner;
pub use config::{Config, PublishPolicy, RetryConfig};
pub use error::{Error, FetchError, FetchErrorKind, PublishError, Result};
pub use fetch::{Fetcher, HttpFetcher};
pub use publish::{DestinationSource, Publisher, StaticDestinations, TelegramPublisher};
pub use types::{BatchSummary, BookRecord, Category, Event, ItemId, ItemState, Stage};

/// Helper function to run a batch with graceful signal handling.
///
/// Runs the batch until it finishes or a termination signal arrives; on a signal
/// the unfinished items are written to the remaining-work snapshot.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use book_relay::{BatchRunner, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let runner = BatchRunner::archive(Config::archive())?;
///
///     // Run with automatic signal handling
///     let summary = run_with_shutdown(&runner).await?;
///     println!("{summary:?}");
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(runner: &BatchRunner) -> Result<BatchSummary> {
    runner.run_until(wait_for_signal()).await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                ctrl_c_or_never().await;
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                ctrl_c_or_never().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            // without a signal source the batch simply runs to completion
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(unix)]
async fn ctrl_c_or_never() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
