//! book-relay command line entry point.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use book_relay::cli::{self, Cli, Commands};
use book_relay::{BatchRunner, run_with_shutdown};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let runner = match build_runner(&cli) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("{} {e:#}", cli::marker(book_relay::Category::Failure));
            return ExitCode::from(cli::EXIT_FATAL);
        }
    };

    let mut events = runner.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!("{}", cli::render_event(&event)),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "status output fell behind");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let outcome = run_with_shutdown(&runner).await;
    // closing the channel lets the printer drain and stop
    drop(runner);
    let _ = printer.await;

    if let Err(e) = &outcome {
        eprintln!("{} {e}", cli::marker(book_relay::Category::Failure));
    }
    ExitCode::from(cli::exit_code(&outcome))
}

fn build_runner(cli: &Cli) -> Result<BatchRunner> {
    let config = cli.resolve_config().context("invalid configuration")?;
    let runner = match cli.command {
        Commands::Relay(_) => BatchRunner::relay(config).context("cannot set up relay")?,
        Commands::Archive => BatchRunner::archive(config).context("cannot set up archive")?,
    };
    Ok(runner)
}
