//! Artifact download
//!
//! [`Fetcher`] is the seam the fetch stage talks to. [`HttpFetcher`] streams the
//! response body into `<dest>.part` and only renames it to `dest` once the whole
//! body is on disk, so a failed attempt never leaves a file at the destination.

use crate::config::HttpConfig;
use crate::error::{Error, FetchError, FetchErrorKind, Result};
use futures::StreamExt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Downloads one remote file to a local path
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `locator` into `dest`, returning the number of bytes written
    ///
    /// On error nothing is left at `dest`.
    async fn fetch(&self, locator: &str, dest: &Path) -> std::result::Result<u64, FetchError>;
}

/// HTTP(S) fetcher backed by reqwest
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher with the configured timeouts and user agent
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(Error::Network)?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn download_to(
        &self,
        url: url::Url,
        part: &Path,
    ) -> std::result::Result<u64, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::new(
                FetchErrorKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let mut file = tokio::fs::File::create(part).await?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, locator: &str, dest: &Path) -> std::result::Result<u64, FetchError> {
        let url = url::Url::parse(locator)
            .map_err(|e| FetchError::new(FetchErrorKind::InvalidUrl, e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::new(
                FetchErrorKind::InvalidUrl,
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }

        let part = part_path(dest);
        match self.download_to(url, &part).await {
            Ok(bytes) => {
                if let Err(e) = tokio::fs::rename(&part, dest).await {
                    discard_part(&part).await;
                    return Err(e.into());
                }
                tracing::debug!(locator, path = %dest.display(), bytes, "download complete");
                Ok(bytes)
            }
            Err(e) => {
                discard_part(&part).await;
                Err(e)
            }
        }
    }
}

/// `<dest>.part`
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

async fn discard_part(part: &Path) {
    match tokio::fs::remove_file(part).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %part.display(), error = %e, "failed to remove partial download");
        }
    }
}
