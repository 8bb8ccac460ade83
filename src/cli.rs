//! Command line interface
//!
//! ## Commands
//!
//! - `book-relay relay` - download every book and send it to each destination chat
//! - `book-relay archive` - download every book and keep it locally
//!
//! ## Configuration
//!
//! Settings come from an optional JSON config file (`--config`), overridden by
//! command-line flags. The bot token is read from `--token` or `TELEGRAM_BOT_TOKEN`.

use crate::config::{Config, PublishPolicy};
use crate::error::Result;
use crate::types::{BatchSummary, Category, Event};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Exit status when every item reached a terminal state
pub const EXIT_OK: u8 = 0;
/// Exit status for fatal startup conditions
pub const EXIT_FATAL: u8 = 1;
/// Exit status when the batch was interrupted and a snapshot was written
pub const EXIT_INTERRUPTED: u8 = 130;

/// Download books listed in a metadata file and relay them to Telegram chats.
#[derive(Debug, Parser)]
#[command(name = "book-relay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON config file; flags below override its values.
    #[arg(long, global = true, env = "BOOK_RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Metadata file listing the books.
    #[arg(long, global = true)]
    pub metadata: Option<PathBuf>,

    /// Directory receiving downloaded files.
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Maximum number of books processed at once.
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Download each book, send it to every destination, then delete it.
    Relay(RelayArgs),
    /// Download each book and keep it.
    Archive,
}

/// Arguments for `relay`.
#[derive(Debug, Args)]
pub struct RelayArgs {
    /// Telegram bot token.
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Destination chat id; repeat for several. Skips chat discovery.
    #[arg(long = "destination", value_name = "CHAT_ID", allow_hyphen_values = true)]
    pub destinations: Vec<String>,

    /// Keep publishing to the remaining chats when one fails.
    #[arg(long)]
    pub best_effort: bool,
}

impl Cli {
    /// Build the effective configuration
    ///
    /// Without `--config` the relay command starts from [`Config::default`] and the
    /// archive command from [`Config::archive`].
    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = match (&self.config, &self.command) {
            (Some(path), _) => Config::from_file(path)?,
            (None, Commands::Archive) => Config::archive(),
            (None, Commands::Relay(_)) => Config::default(),
        };

        if let Some(metadata) = &self.metadata {
            config.paths.metadata_file = metadata.clone();
        }
        if let Some(output_dir) = &self.output_dir {
            config.paths.output_dir = output_dir.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }

        if let Commands::Relay(args) = &self.command {
            if let Some(token) = &args.token {
                config.telegram.bot_token = Some(token.clone());
            }
            if !args.destinations.is_empty() {
                config.telegram.destinations = args.destinations.clone();
            }
            if args.best_effort {
                config.publish_policy = PublishPolicy::BestEffort;
            }
        }

        config.validate()?;
        Ok(config)
    }
}

/// Marker printed in front of a status line
pub fn marker(category: Category) -> &'static str {
    match category {
        Category::Info => "ℹ️ ",
        Category::Success => "✅",
        Category::Retry => "⚠️ ",
        Category::Failure => "❌",
        Category::Cleanup => "🗑️ ",
    }
}

/// One human-readable status line for an event
pub fn render_event(event: &Event) -> String {
    let text = match event {
        Event::BatchStarted {
            total,
            source,
            resumed,
            destinations,
        } => {
            let origin = if *resumed { "resuming" } else { "loading" };
            if *destinations > 0 {
                format!(
                    "{origin} {total} books from {} for {destinations} destinations",
                    source.display()
                )
            } else {
                format!("{origin} {total} books from {}", source.display())
            }
        }
        Event::Fetching { name, .. } => format!("downloading {name}"),
        Event::Fetched { name, bytes, .. } => format!("downloaded {name} ({bytes} bytes)"),
        Event::AttemptFailed {
            name,
            stage,
            attempt,
            max_attempts,
            error,
            ..
        } => format!("{stage} attempt {attempt}/{max_attempts} for {name} failed: {error}"),
        Event::FetchFailed { name, error, .. } => format!("giving up on downloading {name}: {error}"),
        Event::Publishing {
            name, destination, ..
        } => format!("sending {name} to {destination}"),
        Event::Published {
            name, destination, ..
        } => format!("sent {name} to {destination}"),
        Event::PublishFailed {
            name,
            destination,
            error,
            ..
        } => format!("giving up on sending {name} to {destination}: {error}"),
        Event::CleanedUp { path, .. } => format!("deleted {}", path.display()),
        Event::CleanupFailed { path, error, .. } => {
            format!("could not delete {}: {error}", path.display())
        }
        Event::ItemComplete { name, .. } => format!("finished {name}"),
        Event::Interrupted {
            remaining,
            snapshot,
        } => match snapshot {
            Some(path) => format!("interrupted, {remaining} books saved to {}", path.display()),
            None => format!("interrupted, {remaining} books unfinished"),
        },
        Event::BatchComplete {
            succeeded,
            fetch_failed,
            publish_failed,
        } => format!(
            "batch complete: {succeeded} succeeded, {fetch_failed} download failures, {publish_failed} send failures"
        ),
    };
    format!("{} {}", marker(event.category()), text)
}

/// Process exit status for a batch outcome
pub fn exit_code(outcome: &Result<BatchSummary>) -> u8 {
    match outcome {
        Ok(summary) if summary.interrupted => EXIT_INTERRUPTED,
        Ok(_) => EXIT_OK,
        Err(_) => EXIT_FATAL,
    }
}
