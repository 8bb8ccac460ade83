//! Configuration types for book-relay

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File locations used by a batch
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Metadata file listing the books to process (default: "books.json")
    #[serde(default = "default_metadata_file")]
    pub metadata_file: PathBuf,

    /// Remaining-work snapshot written on interruption (default: "remainingbooks.json")
    #[serde(default = "default_remaining_file")]
    pub remaining_file: PathBuf,

    /// Directory receiving downloaded artifacts (default: "books")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Ledger of items whose download failed (default: "download_errors.json")
    #[serde(default = "default_fetch_failures")]
    pub fetch_failures: PathBuf,

    /// Ledger of items whose distribution failed (default: "upload_errors.json")
    #[serde(default = "default_publish_failures")]
    pub publish_failures: PathBuf,

    /// File extension given to artifacts (default: "pdf")
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            metadata_file: default_metadata_file(),
            remaining_file: default_remaining_file(),
            output_dir: default_output_dir(),
            fetch_failures: default_fetch_failures(),
            publish_failures: default_publish_failures(),
            artifact_extension: default_artifact_extension(),
        }
    }
}

/// Retry behavior for a single network-facing stage
///
/// The delay before retry `n` (0-based count of ordinary failures so far) is
/// `min(base_delay + increment * n, max_delay)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 2 seconds)
    #[serde(default = "default_base_delay", with = "duration_serde")]
    pub base_delay: Duration,

    /// Linear increment added per failed attempt (default: 2 seconds)
    #[serde(default = "default_increment", with = "duration_serde")]
    pub increment: Duration,

    /// Upper bound for any single backoff delay (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Extra wait added on top of a rate-limit hint (default: 1 second)
    #[serde(default = "default_rate_limit_margin", with = "duration_serde")]
    pub rate_limit_margin: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            increment: default_increment(),
            max_delay: default_max_delay(),
            rate_limit_margin: default_rate_limit_margin(),
        }
    }
}

impl RetryConfig {
    /// Backoff delay after `step` ordinary failures
    #[must_use]
    pub fn delay_for(&self, step: u32) -> Duration {
        self.base_delay
            .saturating_add(self.increment.saturating_mul(step))
            .min(self.max_delay)
    }
}

/// What to do when one destination exhausts its retries
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishPolicy {
    /// Abort the stage on the first destination that fails (default)
    #[default]
    FailFast,
    /// Try every destination, fail the stage if any of them failed
    BestEffort,
}

/// HTTP client settings shared by the fetcher and the Telegram publisher
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// TCP connect timeout (default: 10 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Whole-request timeout, body included (default: 300 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Telegram Bot API settings
#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API base URL (default: "https://api.telegram.org")
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Bot token; supplied at startup, never stored in source
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Fixed destination chat ids; when non-empty, discovery via getUpdates is skipped
    #[serde(default)]
    pub destinations: Vec<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            bot_token: None,
            destinations: Vec::new(),
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_base", &self.api_base)
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .field("destinations", &self.destinations)
            .finish()
    }
}

/// Main configuration for a batch run
///
/// Every field has a default, so an empty JSON object is a valid config file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// File locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Maximum number of items processed at once (default: 10)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Retry policy for downloads
    #[serde(default)]
    pub fetch_retry: RetryConfig,

    /// Retry policy for each destination delivery
    #[serde(default)]
    pub publish_retry: RetryConfig,

    /// Destination failure policy
    #[serde(default)]
    pub publish_policy: PublishPolicy,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Telegram settings (only used when distributing)
    #[serde(default)]
    pub telegram: TelegramConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            concurrency: default_concurrency(),
            fetch_retry: RetryConfig::default(),
            publish_retry: RetryConfig::default(),
            publish_policy: PublishPolicy::default(),
            http: HttpConfig::default(),
            telegram: TelegramConfig::default(),
        }
    }
}

impl Config {
    /// Preset for download-only runs: fewer fetch attempts, gentler backoff,
    /// artifacts kept in "AllBook"
    #[must_use]
    pub fn archive() -> Self {
        Self {
            paths: PathsConfig {
                output_dir: PathBuf::from("AllBook"),
                ..PathsConfig::default()
            },
            fetch_retry: RetryConfig {
                max_attempts: 3,
                increment: Duration::from_secs(1),
                ..RetryConfig::default()
            },
            ..Self::default()
        }
    }

    /// Load a JSON config file; missing fields fall back to defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read config file '{}': {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&content).map_err(|e| Error::Config {
            message: format!("failed to parse config file '{}': {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.paths.artifact_extension.trim().is_empty() {
            return Err(Error::Config {
                message: "artifact extension must not be empty".to_string(),
                key: Some("paths.artifact_extension".to_string()),
            });
        }
        for (key, retry) in [
            ("fetch_retry", &self.fetch_retry),
            ("publish_retry", &self.publish_retry),
        ] {
            if retry.base_delay > retry.max_delay {
                return Err(Error::Config {
                    message: format!(
                        "base_delay ({:?}) exceeds max_delay ({:?})",
                        retry.base_delay, retry.max_delay
                    ),
                    key: Some(format!("{key}.base_delay")),
                });
            }
        }
        Ok(())
    }

    /// Concurrency limit clamped to at least one slot
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}

fn default_metadata_file() -> PathBuf {
    PathBuf::from("books.json")
}

fn default_remaining_file() -> PathBuf {
    PathBuf::from("remainingbooks.json")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("books")
}

fn default_fetch_failures() -> PathBuf {
    PathBuf::from("download_errors.json")
}

fn default_publish_failures() -> PathBuf {
    PathBuf::from("upload_errors.json")
}

fn default_artifact_extension() -> String {
    "pdf".to_string()
}

fn default_concurrency() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_increment() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_rate_limit_margin() -> Duration {
    Duration::from_secs(1)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_user_agent() -> String {
    concat!("book-relay/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
