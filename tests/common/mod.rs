//! Common test utilities for book-relay integration tests

use book_relay::config::TelegramConfig;
use book_relay::{Config, RetryConfig};
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Bot token used against the mock Bot API
pub const TOKEN: &str = "123:abc";

/// Retry policy short enough to run on real time
pub fn quick_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay: Duration::from_millis(20),
        increment: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
        rate_limit_margin: Duration::ZERO,
    }
}

/// Config rooted in `dir`, talking to `server` for both downloads and the Bot API
pub fn test_config(dir: &Path, server: &MockServer) -> Config {
    let mut config = Config::default();
    config.paths.metadata_file = dir.join("books.json");
    config.paths.remaining_file = dir.join("remainingbooks.json");
    config.paths.output_dir = dir.join("books");
    config.paths.fetch_failures = dir.join("download_errors.json");
    config.paths.publish_failures = dir.join("upload_errors.json");
    config.fetch_retry = quick_retry(3);
    config.publish_retry = quick_retry(3);
    config.concurrency = 2;
    config.telegram = TelegramConfig {
        api_base: server.uri(),
        bot_token: Some(TOKEN.to_string()),
        destinations: vec!["-100".to_string()],
    };
    config
}

/// Write raw JSON records as the metadata file
pub fn write_metadata(config: &Config, records: &Value) {
    let text = serde_json::to_string_pretty(records).unwrap();
    std::fs::write(&config.paths.metadata_file, text).unwrap();
}

/// Serve `body` at `route`
pub async fn mount_book(server: &MockServer, route: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

/// Accept every sendDocument call
pub async fn mount_send_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendDocument")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {"message_id": 1}
        })))
        .mount(server)
        .await;
}

/// Lines of a failure ledger, empty if the file does not exist
pub fn ledger_lines(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => text.lines().map(str::to_string).collect(),
        Err(_) => Vec::new(),
    }
}
