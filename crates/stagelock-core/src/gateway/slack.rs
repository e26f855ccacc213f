//! Slack Web API gateway
//!
//! Status messages are posted as attachments with one button per affordance;
//! the button's `callback_id` is the resource name so interactions route back
//! to the right controller. A notice replaces the previous status message of
//! its resource (`chat.update`), and the following status is posted fresh, so
//! the live status always sits at the bottom of the channel.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::debug;

use super::MessagingGateway;
use crate::config::GatewayConfig;
use crate::domain::arbiter::notice::{ButtonStyle, StatusView};
use crate::domain::arbiter::types::UserId;
use crate::error::{Error, Result};

/// Slack Web API base URL
pub const SLACK_BASE_URL: &str = "https://slack.com/api";

/// Environment variables checked for the bot token, in order
pub const TOKEN_ENV_VARS: [&str; 2] = ["STAGELOCK_SLACK_TOKEN", "SLACK_BOT_TOKEN"];

/// Envelope every Web API method returns
#[derive(Debug, Deserialize)]
pub struct SlackResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
}

impl SlackResponse {
    /// Turn an `ok: false` reply into a delivery failure
    pub fn into_result(self, method: &str) -> Result<Option<String>> {
        if self.ok {
            Ok(self.ts)
        } else {
            Err(Error::GatewayDeliveryFailure(format!(
                "{} failed: {}",
                method,
                self.error.unwrap_or_else(|| "unknown_error".to_string())
            )))
        }
    }
}

/// Gateway posting to one Slack channel
pub struct SlackGateway {
    http_client: HttpClient,
    base_url: String,
    token: String,
    channel: String,
    /// Timestamp of the live status message per resource
    status_ts: Mutex<HashMap<String, String>>,
}

impl std::fmt::Debug for SlackGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackGateway")
            .field("base_url", &self.base_url)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl SlackGateway {
    pub fn new(
        token: impl Into<String>,
        channel: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::NetworkError)?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            channel: channel.into(),
            status_ts: Mutex::new(HashMap::new()),
        })
    }

    /// Build from configuration; the token is read from the environment
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        if config.channel.trim().is_empty() {
            return Err(Error::ConfigError(
                "gateway.channel must be set for the slack gateway".to_string(),
            ));
        }
        let token = resolve_token().ok_or_else(|| {
            Error::ConfigError(format!(
                "Slack bot token not found. Set {} in the environment.",
                TOKEN_ENV_VARS.join(" or ")
            ))
        })?;

        Self::new(
            token,
            config.channel.clone(),
            config.api_base_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    async fn call(&self, method: &str, body: &Value) -> Result<Option<String>> {
        let url = format!("{}/{}", self.base_url, method);
        debug!(method, "Calling Slack API");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::GatewayDeliveryFailure(format!(
                "{} returned HTTP {}",
                method, status
            )));
        }

        let reply: SlackResponse = response.json().await.map_err(Error::NetworkError)?;
        reply.into_result(method)
    }
}

/// Bot token from the environment, if any
pub fn resolve_token() -> Option<String> {
    TOKEN_ENV_VARS
        .iter()
        .find_map(|var| std::env::var(var).ok())
        .filter(|token| !token.trim().is_empty())
}

fn slack_style(style: ButtonStyle) -> &'static str {
    match style {
        ButtonStyle::Primary => "primary",
        ButtonStyle::Danger => "danger",
        ButtonStyle::PrimaryText | ButtonStyle::DangerText => "default",
    }
}

/// Attachment carrying the status text and its buttons
pub fn status_attachment(status: &StatusView) -> Value {
    let actions: Vec<Value> = status
        .affordances
        .iter()
        .map(|a| {
            json!({
                "name": a.action.wire_name(),
                "text": a.label,
                "type": "button",
                "value": a.action.wire_name(),
                "style": slack_style(a.style),
            })
        })
        .collect();

    json!({
        "text": status.text,
        "callback_id": status.resource,
        "actions": actions,
    })
}

/// `chat.postMessage` body for a status message
pub fn status_payload(channel: &str, status: &StatusView) -> Value {
    json!({
        "channel": channel,
        "attachments": [status_attachment(status)],
    })
}

/// Body for a plain text attachment, optionally updating message `ts`
pub fn text_payload(channel: &str, text: &str, ts: Option<&str>) -> Value {
    let mut body = json!({
        "channel": channel,
        "attachments": [{ "text": text }],
    });
    if let Some(ts) = ts {
        body["ts"] = Value::String(ts.to_string());
    }
    body
}

#[async_trait]
impl MessagingGateway for SlackGateway {
    async fn post_status(&self, status: &StatusView) -> Result<()> {
        let ts = self
            .call("chat.postMessage", &status_payload(&self.channel, status))
            .await?;

        if let Some(ts) = ts {
            self.status_ts
                .lock()
                .await
                .insert(status.resource.clone(), ts);
        }
        Ok(())
    }

    async fn post_notice(&self, resource: &str, text: &str) -> Result<()> {
        let previous = self.status_ts.lock().await.remove(resource);

        match previous {
            Some(ts) => {
                self.call("chat.update", &text_payload(&self.channel, text, Some(&ts)))
                    .await?;
            }
            None => {
                self.call("chat.postMessage", &text_payload(&self.channel, text, None))
                    .await?;
            }
        }
        Ok(())
    }

    async fn direct_message(&self, user: &UserId, text: &str) -> Result<()> {
        self.call("chat.postMessage", &text_payload(user.as_str(), text, None))
            .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "slack"
    }
}
