//! Outbound clients for external scout services.

mod client;
mod models;

pub use client::HttpScoutClient;
pub use models::{EntriesResponse, ScoutEntry, SendScoutsRequest, SendScoutsResponse};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A scout/recruiting service that jobs pull entries from and push sends to.
#[async_trait]
pub trait ScoutService: Send + Sync {
    /// Stable provider name, used as the storage key.
    fn provider(&self) -> &str;

    /// Entries received strictly after `since`, or all of them when `None`.
    async fn fetch_entries(&self, since: Option<DateTime<Utc>>) -> Result<Vec<ScoutEntry>>;

    /// Asks the provider to deliver pending scout messages. Returns how many were sent.
    async fn send_pending_scouts(&self, now: DateTime<Utc>) -> Result<u32>;
}
