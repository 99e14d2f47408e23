mod file_config;

pub use file_config::{
    AlertsConfig, BackgroundJobsConfig, FileConfig, IdentityConfig, JobOverrideConfig,
    ScoutProviderConfig, ScoutServicesConfig,
};

use crate::background_jobs::JobOverride;
use crate::recovery::DEFAULT_BUSINESS_FRAME_MARKERS;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Context, Result};
use chrono::FixedOffset;
use clap::ValueEnum;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SLACK_API_BASE_URL: &str = "https://slack.com/api";

/// Deployment environment the process runs in.
///
/// Gates which jobs get registered and whether failures are alerted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    /// Pre-production verification environment.
    #[value(aliases = ["staging", "dev"])]
    Development,
    Local,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
            Environment::Local => "local",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Environment::from_str(s, true).ok()
    }

    /// Local runs only log failures; every other environment alerts.
    pub fn alerts_enabled(&self) -> bool {
        !matches!(self, Environment::Local)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which half of the binary runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RunMode {
    #[default]
    Api,
    Batch,
}

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub environment: Option<Environment>,
    pub mode: RunMode,
    pub db_path: Option<PathBuf>,
    pub port: u16,
    pub batch_port: u16,
    pub logging_level: RequestsLoggingLevel,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub environment: Environment,
    pub mode: RunMode,
    pub db_path: PathBuf,
    pub port: u16,
    pub batch_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub schedule_utc_offset: FixedOffset,

    // Feature configs (with defaults)
    pub alerts: Option<AlertSettings>,
    pub robot_id: Option<String>,
    pub business_frame_markers: Vec<String>,
    pub identity: Option<IdentitySettings>,
    pub scout_services: ScoutServicesSettings,
    pub background_jobs: BackgroundJobsSettings,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub token: String,
    pub channel: String,
    pub api_base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct IdentitySettings {
    pub signing_secret: String,
    pub issuer: Option<String>,
    pub leeway_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ScoutProviderSettings {
    pub name: String,
    pub base_url: String,
    pub api_token: String,
}

#[derive(Debug, Clone)]
pub struct ScoutServicesSettings {
    pub timeout_sec: u64,
    pub providers: Vec<ScoutProviderSettings>,
}

#[derive(Debug, Clone)]
pub struct BackgroundJobsSettings {
    pub job_timeout: Duration,
    pub overrides: HashMap<String, JobOverride>,
}

impl Default for BackgroundJobsSettings {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(300),
            overrides: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let environment = match file.environment {
            Some(s) => Environment::parse(&s)
                .ok_or_else(|| anyhow::anyhow!("Unknown environment in config file: {}", s))?,
            None => cli.environment.ok_or_else(|| {
                anyhow::anyhow!(
                    "environment must be specified via --environment or in config file"
                )
            })?,
        };

        let mode = match file.mode {
            Some(s) => RunMode::from_str(&s, true)
                .map_err(|_| anyhow::anyhow!("Unknown mode in config file: {}", s))?,
            None => cli.mode,
        };

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let port = file.port.unwrap_or(cli.port);
        let batch_port = file.batch_port.unwrap_or(cli.batch_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let schedule_utc_offset = match file.schedule_utc_offset {
            Some(s) => s
                .parse::<FixedOffset>()
                .map_err(|e| anyhow::anyhow!("Invalid schedule_utc_offset {:?}: {}", s, e))?,
            None => FixedOffset::east_opt(0).context("UTC offset out of range")?,
        };

        // Alerts are mandatory wherever they can fire
        let alerts_file = file.alerts.unwrap_or_default();
        let alerts = match (alerts_file.token.clone(), alerts_file.channel.clone()) {
            (Some(token), Some(channel)) => Some(AlertSettings {
                token,
                channel,
                api_base_url: alerts_file
                    .api_base_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SLACK_API_BASE_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                timeout: Duration::from_secs(alerts_file.timeout_sec.unwrap_or(10)),
            }),
            (None, None) => None,
            _ => bail!("Both alerts.token and alerts.channel must be provided together"),
        };
        if alerts.is_none() && environment.alerts_enabled() {
            bail!(
                "The [alerts] section is required in the {} environment",
                environment
            );
        }
        let business_frame_markers = alerts_file.business_frame_markers.unwrap_or_else(|| {
            DEFAULT_BUSINESS_FRAME_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect()
        });

        let identity = match file.identity {
            Some(identity_file) => {
                let signing_secret = identity_file
                    .signing_secret
                    .context("identity.signing_secret is required when [identity] is present")?;
                Some(IdentitySettings {
                    signing_secret,
                    issuer: identity_file.issuer,
                    leeway_secs: identity_file.leeway_secs.unwrap_or(60),
                })
            }
            None => None,
        };

        let scout_file = file.scout_services.unwrap_or_default();
        let scout_services = ScoutServicesSettings {
            timeout_sec: scout_file.timeout_sec.unwrap_or(60),
            providers: scout_file
                .providers
                .into_iter()
                .map(|p| ScoutProviderSettings {
                    name: p.name,
                    base_url: p.base_url.trim_end_matches('/').to_string(),
                    api_token: p.api_token,
                })
                .collect(),
        };

        let jobs_file = file.background_jobs.unwrap_or_default();
        let mut overrides = HashMap::new();
        for (name, job) in jobs_file.jobs {
            let environments = match job.environments {
                Some(names) => Some(
                    names
                        .iter()
                        .map(|s| {
                            Environment::parse(s).ok_or_else(|| {
                                anyhow::anyhow!("Unknown environment {:?} for job {}", s, name)
                            })
                        })
                        .collect::<Result<Vec<_>>>()?,
                ),
                None => None,
            };
            overrides.insert(
                name,
                JobOverride {
                    cadence: job.cadence,
                    environments,
                    enabled: job.enabled,
                },
            );
        }
        let background_jobs = BackgroundJobsSettings {
            job_timeout: Duration::from_secs(jobs_file.job_timeout_secs.unwrap_or(300)),
            overrides,
        };

        Ok(Self {
            environment,
            mode,
            db_path,
            port,
            batch_port,
            logging_level,
            schedule_utc_offset,
            alerts,
            robot_id: alerts_file.robot_id,
            business_frame_markers,
            identity,
            scout_services,
            background_jobs,
        })
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
