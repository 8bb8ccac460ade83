//! Artifact distribution
//!
//! The publish stage talks to two seams:
//!
//! - [`Publisher`]: delivers one artifact to one destination
//! - [`DestinationSource`]: enumerates destinations once at startup
//!
//! Implementations:
//!
//! - [`TelegramPublisher`]: Telegram Bot API (`sendDocument` / `getUpdates`)
//! - [`StaticDestinations`]: fixed destination list from configuration
//!
//! ## Usage
//!
//! ```no_run
//! use book_relay::config::TelegramConfig;
//! use book_relay::publish::{DestinationSet, DestinationSource, Publisher, TelegramPublisher};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let telegram = TelegramConfig {
//!     bot_token: Some(std::env::var("TELEGRAM_BOT_TOKEN")?),
//!     ..TelegramConfig::default()
//! };
//! let publisher = TelegramPublisher::new(&telegram, &Default::default())?;
//! let destinations: DestinationSet = publisher.list_destinations().await?.into_iter().collect();
//! for destination in destinations.iter() {
//!     publisher.publish(destination, Path::new("books/Dune.pdf")).await?;
//! }
//! # Ok(())
//! # }
//! ```

mod static_list;
mod telegram;
mod traits;

pub use static_list::StaticDestinations;
pub use telegram::TelegramPublisher;
pub use traits::{DestinationId, DestinationSet, DestinationSource, Publisher};
