//! Fixed destination list

use super::traits::{DestinationId, DestinationSource};
use async_trait::async_trait;

/// Destination source returning a configured list
///
/// Used when destinations are given on the command line or in the config file,
/// skipping discovery through the channel's API.
///
/// # Examples
///
/// ```
/// use book_relay::publish::{DestinationSource, StaticDestinations};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = StaticDestinations::new(vec!["-1001".to_string()]);
/// assert_eq!(source.list_destinations().await?, vec!["-1001".to_string()]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct StaticDestinations {
    ids: Vec<DestinationId>,
}

impl StaticDestinations {
    /// Create a source from a list of ids
    pub fn new(ids: Vec<DestinationId>) -> Self {
        Self { ids }
    }
}

#[async_trait]
impl DestinationSource for StaticDestinations {
    async fn list_destinations(&self) -> crate::Result<Vec<DestinationId>> {
        Ok(self.ids.clone())
    }
}
