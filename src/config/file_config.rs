use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub environment: Option<String>,
    pub mode: Option<String>,
    pub db_path: Option<String>,
    pub port: Option<u16>,
    pub batch_port: Option<u16>,
    pub logging_level: Option<String>,
    pub schedule_utc_offset: Option<String>,

    // Feature configs
    pub alerts: Option<AlertsConfig>,
    pub identity: Option<IdentityConfig>,
    pub scout_services: Option<ScoutServicesConfig>,
    pub background_jobs: Option<BackgroundJobsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AlertsConfig {
    /// Bearer token of the alert bot.
    pub token: Option<String>,
    /// Destination channel identifier.
    pub channel: Option<String>,
    pub api_base_url: Option<String>,
    pub robot_id: Option<String>,
    pub timeout_sec: Option<u64>,
    /// Substrings identifying business-relevant stack frames.
    pub business_frame_markers: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct IdentityConfig {
    pub signing_secret: Option<String>,
    pub issuer: Option<String>,
    pub leeway_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ScoutServicesConfig {
    pub timeout_sec: Option<u64>,
    pub providers: Vec<ScoutProviderConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScoutProviderConfig {
    pub name: String,
    pub base_url: String,
    pub api_token: String,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BackgroundJobsConfig {
    pub job_timeout_secs: Option<u64>,
    /// Per-job overrides keyed by job name.
    pub jobs: HashMap<String, JobOverrideConfig>,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct JobOverrideConfig {
    pub cadence: Option<String>,
    pub environments: Option<Vec<String>>,
    pub enabled: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
