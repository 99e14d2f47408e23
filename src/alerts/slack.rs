use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AlertMessage, AlertSink};
use crate::config::AlertSettings;

#[derive(Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: String,
}

#[derive(Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Posts alerts to a Slack channel through `chat.postMessage`.
pub struct SlackAlertSink {
    client: reqwest::Client,
    api_base_url: String,
    token: String,
    channel: String,
}

impl SlackAlertSink {
    pub fn new(settings: &AlertSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            channel: settings.channel.clone(),
        })
    }
}

#[async_trait]
impl AlertSink for SlackAlertSink {
    async fn send(&self, message: &AlertMessage) -> Result<()> {
        let url = format!("{}/chat.postMessage", self.api_base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&PostMessageRequest {
                channel: &self.channel,
                text: message.render(),
            })
            .send()
            .await
            .context("Failed to reach Slack")?;

        if !response.status().is_success() {
            anyhow::bail!("Slack responded with status {}", response.status());
        }

        let body: PostMessageResponse = response
            .json()
            .await
            .context("Failed to parse Slack response")?;
        if !body.ok {
            anyhow::bail!(
                "Slack rejected the message: {}",
                body.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(())
    }
}
