//! HTTP client for external scout services.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

use super::models::{EntriesResponse, ScoutEntry, SendScoutsRequest, SendScoutsResponse};
use super::ScoutService;
use crate::config::ScoutProviderSettings;

/// HTTP client for one scout provider.
pub struct HttpScoutClient {
    client: reqwest::Client,
    provider: String,
    base_url: String,
    api_token: String,
}

impl HttpScoutClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `provider` - Provider name used in storage and logs
    /// * `base_url` - Base URL of the provider API (e.g., "https://api.example.com/v1")
    /// * `api_token` - Bearer token sent on every request
    /// * `timeout_sec` - Request timeout in seconds
    pub fn new(
        provider: String,
        base_url: String,
        api_token: String,
        timeout_sec: u64,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = base_url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            provider,
            base_url,
            api_token,
        })
    }

    pub fn from_settings(settings: &ScoutProviderSettings, timeout_sec: u64) -> Result<Self> {
        Self::new(
            settings.name.clone(),
            settings.base_url.clone(),
            settings.api_token.clone(),
            timeout_sec,
        )
    }
}

#[async_trait]
impl ScoutService for HttpScoutClient {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn fetch_entries(&self, since: Option<DateTime<Utc>>) -> Result<Vec<ScoutEntry>> {
        let url = format!("{}/entries", self.base_url);
        let mut request = self.client.get(&url).bearer_auth(&self.api_token);
        if let Some(since) = since {
            request = request.query(&[("since", since.to_rfc3339_opts(SecondsFormat::Secs, true))]);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to fetch entries from {}", self.provider))?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Failed to fetch entries from {}: status {}",
                self.provider,
                response.status()
            );
        }

        let body: EntriesResponse = response
            .json()
            .await
            .context("Failed to parse entries response")?;
        Ok(body.entries)
    }

    async fn send_pending_scouts(&self, now: DateTime<Utc>) -> Result<u32> {
        let url = format!("{}/scouts/send", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&SendScoutsRequest { now })
            .send()
            .await
            .with_context(|| format!("Failed to send scouts via {}", self.provider))?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Failed to send scouts via {}: status {}",
                self.provider,
                response.status()
            );
        }

        let body: SendScoutsResponse = response
            .json()
            .await
            .context("Failed to parse send response")?;
        Ok(body.sent)
    }
}
