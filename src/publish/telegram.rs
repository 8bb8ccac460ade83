//! Telegram Bot API publisher

use super::traits::{DestinationId, DestinationSource, Publisher};
use crate::config::{HttpConfig, TelegramConfig};
use crate::error::{Error, PublishError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Wait used when a 429 response carries no usable hint
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(1);

/// Chat types that can receive documents from the bot
const PUBLISHABLE_CHAT_TYPES: [&str; 3] = ["group", "supergroup", "channel"];

/// Publishes documents through the Telegram Bot API
///
/// Uploads go through `sendDocument`; destinations are discovered from the chats
/// seen in `getUpdates`.
#[derive(Clone)]
pub struct TelegramPublisher {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl std::fmt::Debug for TelegramPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramPublisher")
            .field("api_base", &self.api_base)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Update {
    #[serde(default)]
    message: Option<ChatHolder>,
    #[serde(default)]
    channel_post: Option<ChatHolder>,
    #[serde(default)]
    my_chat_member: Option<ChatHolder>,
}

#[derive(Debug, Deserialize)]
struct ChatHolder {
    chat: Chat,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
}

impl TelegramPublisher {
    /// Create a publisher; fails if no bot token is configured
    pub fn new(telegram: &TelegramConfig, http: &HttpConfig) -> Result<Self> {
        let token = telegram
            .bot_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Config {
                message: "a Telegram bot token is required to publish".to_string(),
                key: Some("telegram.bot_token".to_string()),
            })?
            .to_string();

        let client = reqwest::Client::builder()
            .connect_timeout(http.connect_timeout)
            .timeout(http.request_timeout)
            .user_agent(http.user_agent.clone())
            .build()
            .map_err(Error::Network)?;

        Ok(Self {
            client,
            api_base: telegram.api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }
}

// request urls embed the bot token
fn redact(err: reqwest::Error) -> reqwest::Error {
    err.without_url()
}

/// Map a `sendDocument` response to a publish outcome
fn classify_send(
    status: StatusCode,
    header_retry_after: Option<u64>,
    body: Option<ApiResponse<serde_json::Value>>,
) -> std::result::Result<(), PublishError> {
    let hinted = body
        .as_ref()
        .and_then(|b| b.parameters.as_ref())
        .and_then(|p| p.retry_after);

    if let Some(secs) = hinted {
        return Err(PublishError::RateLimited {
            retry_after: Duration::from_secs(secs),
        });
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(PublishError::RateLimited {
            retry_after: header_retry_after
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RATE_LIMIT_WAIT),
        });
    }

    match body {
        Some(body) if body.ok && status.is_success() => Ok(()),
        Some(body) => Err(PublishError::Transient(format!(
            "telegram returned {}: {}",
            status.as_u16(),
            body.description.unwrap_or_else(|| "no description".to_string())
        ))),
        None => Err(PublishError::Transient(format!(
            "telegram returned {} with an unreadable body",
            status.as_u16()
        ))),
    }
}

/// Chat ids of publishable chats seen in a batch of updates
fn chats_from_updates(updates: Vec<Update>) -> Vec<DestinationId> {
    updates
        .into_iter()
        .flat_map(|u| [u.message, u.channel_post, u.my_chat_member])
        .flatten()
        .map(|holder| holder.chat)
        .filter(|chat| PUBLISHABLE_CHAT_TYPES.contains(&chat.kind.as_str()))
        .map(|chat| chat.id.to_string())
        .collect()
}

#[async_trait]
impl Publisher for TelegramPublisher {
    async fn publish(
        &self,
        destination: &str,
        artifact: &Path,
    ) -> std::result::Result<(), PublishError> {
        let bytes = tokio::fs::read(artifact).await?;
        let file_name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        let form = Form::new()
            .text("chat_id", destination.to_string())
            .part("document", Part::bytes(bytes).file_name(file_name));

        let response = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(redact)?;

        let status = response.status();
        let header_retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.json::<ApiResponse<serde_json::Value>>().await.ok();

        let outcome = classify_send(status, header_retry_after, body);
        match &outcome {
            Ok(()) => tracing::debug!(destination, path = %artifact.display(), "document sent"),
            Err(e) => tracing::debug!(destination, error = %e, "sendDocument rejected"),
        }
        outcome
    }
}

#[async_trait]
impl DestinationSource for TelegramPublisher {
    async fn list_destinations(&self) -> Result<Vec<DestinationId>> {
        let response = self
            .client
            .get(self.method_url("getUpdates"))
            .send()
            .await
            .map_err(|e| Error::Network(redact(e)))?;

        let status = response.status();
        let body: ApiResponse<Vec<Update>> = response
            .json()
            .await
            .map_err(|e| Error::Network(redact(e)))?;

        if !body.ok {
            return Err(Error::Publish(PublishError::Transient(format!(
                "getUpdates returned {}: {}",
                status.as_u16(),
                body.description.unwrap_or_else(|| "no description".to_string())
            ))));
        }

        let chats = chats_from_updates(body.result.unwrap_or_default());
        tracing::info!(count = chats.len(), "discovered destination chats");
        Ok(chats)
    }
}
