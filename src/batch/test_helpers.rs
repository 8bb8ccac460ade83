//! Shared fakes for exercising the batch pipeline without a network.

use crate::config::{Config, RetryConfig};
use crate::error::{FetchError, FetchErrorKind, PublishError};
use crate::fetch::Fetcher;
use crate::publish::Publisher;
use crate::types::BookRecord;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Retry policy with one-second steps (tests run on paused time)
pub(crate) fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay: Duration::from_secs(1),
        increment: Duration::from_secs(1),
        max_delay: Duration::from_secs(10),
        rate_limit_margin: Duration::from_secs(1),
    }
}

/// Config rooted in `dir` with fast retries
pub(crate) fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.paths.metadata_file = dir.join("books.json");
    config.paths.remaining_file = dir.join("remainingbooks.json");
    config.paths.output_dir = dir.join("books");
    config.paths.fetch_failures = dir.join("download_errors.json");
    config.paths.publish_failures = dir.join("upload_errors.json");
    config.fetch_retry = fast_retry(3);
    config.publish_retry = fast_retry(3);
    config.concurrency = 2;
    config
}

/// Write `records` as the metadata file of `config`
pub(crate) fn write_metadata(config: &Config, records: &[BookRecord]) {
    let json = serde_json::to_string_pretty(records).unwrap();
    std::fs::write(&config.paths.metadata_file, json).unwrap();
}

/// `n` records named "Book 0".."Book n-1"
pub(crate) fn books(n: usize) -> Vec<BookRecord> {
    (0..n)
        .map(|i| BookRecord::new(format!("Book {i}"), format!("http://books.test/{i}.pdf")))
        .collect()
}

/// Fetcher whose behavior is scripted per test
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    fail_first: u32,
    always_fail: Option<FetchErrorKind>,
    failing_locators: HashSet<String>,
    hanging_locators: HashSet<String>,
    delay: Duration,
    calls: AtomicU32,
    calls_by_locator: Mutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    /// Always succeeds
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fails the first `n` calls, then succeeds
    pub(crate) fn failing_first(n: u32) -> Self {
        Self {
            fail_first: n,
            ..Self::default()
        }
    }

    /// Never succeeds
    pub(crate) fn always_failing(kind: FetchErrorKind) -> Self {
        Self {
            always_fail: Some(kind),
            ..Self::default()
        }
    }

    /// Fails every call for `locator`
    pub(crate) fn failing_for(mut self, locator: &str) -> Self {
        self.failing_locators.insert(locator.to_string());
        self
    }

    /// Calls for `locator` never complete
    pub(crate) fn hanging_for(mut self, locator: &str) -> Self {
        self.hanging_locators.insert(locator.to_string());
        self
    }

    /// Sleep this long inside every call
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn calls_for(&self, locator: &str) -> u32 {
        self.calls_by_locator
            .lock()
            .unwrap()
            .get(locator)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, locator: &str, dest: &Path) -> Result<u64, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls_by_locator
            .lock()
            .unwrap()
            .entry(locator.to_string())
            .or_insert(0) += 1;

        if self.hanging_locators.contains(locator) {
            std::future::pending::<()>().await;
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(kind) = self.always_fail {
            return Err(FetchError::new(kind, "scripted failure"));
        }
        if self.failing_locators.contains(locator) {
            return Err(FetchError::new(FetchErrorKind::HttpStatus(404), "Not Found"));
        }
        if call < self.fail_first {
            return Err(FetchError::new(FetchErrorKind::HttpStatus(503), "Service Unavailable"));
        }

        let body = format!("%PDF {locator}");
        tokio::fs::write(dest, body.as_bytes()).await?;
        Ok(body.len() as u64)
    }
}

/// Publisher recording every attempt
#[derive(Default)]
pub(crate) struct FakePublisher {
    failing: HashSet<String>,
    hanging: HashSet<String>,
    rate_limited_once: HashMap<String, Duration>,
    attempts: Mutex<Vec<(String, Instant)>>,
    delivered: Mutex<Vec<String>>,
}

impl FakePublisher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every delivery to `destination` fails
    pub(crate) fn failing_for(mut self, destination: &str) -> Self {
        self.failing.insert(destination.to_string());
        self
    }

    /// Deliveries to `destination` never complete
    pub(crate) fn hanging_for(mut self, destination: &str) -> Self {
        self.hanging.insert(destination.to_string());
        self
    }

    /// The first delivery to `destination` is rate limited for `wait`
    pub(crate) fn rate_limited_once(mut self, destination: &str, wait: Duration) -> Self {
        self.rate_limited_once.insert(destination.to_string(), wait);
        self
    }

    pub(crate) fn delivered_to(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }

    pub(crate) fn attempts_for(&self, destination: &str) -> usize {
        self.attempt_times(destination).len()
    }

    pub(crate) fn attempt_times(&self, destination: &str) -> Vec<Instant> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| d == destination)
            .map(|(_, t)| *t)
            .collect()
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(&self, destination: &str, _artifact: &Path) -> Result<(), PublishError> {
        let previous = {
            let mut attempts = self.attempts.lock().unwrap();
            let previous = attempts.iter().filter(|(d, _)| d == destination).count();
            attempts.push((destination.to_string(), Instant::now()));
            previous
        };

        if self.hanging.contains(destination) {
            std::future::pending::<()>().await;
        }
        if let Some(wait) = self.rate_limited_once.get(destination) {
            if previous == 0 {
                return Err(PublishError::RateLimited { retry_after: *wait });
            }
        }
        if self.failing.contains(destination) {
            return Err(PublishError::Transient("chat not found".into()));
        }
        self.delivered.lock().unwrap().push(destination.to_string());
        Ok(())
    }
}
