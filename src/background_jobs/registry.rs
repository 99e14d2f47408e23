//! Declarative job table and its compilation for one environment.

use super::cadence::{Cadence, CadenceParseError};
use super::job::JobHandler;
use super::jobs::{ScoutEntryIngestJob, ScoutMessageSendJob};
use crate::config::Environment;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info};

/// One row of the job table.
///
/// The same name may appear more than once with disjoint environments to
/// give a job an environment-specific cadence.
pub struct JobDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub cadence: &'static str,
    pub environments: &'static [Environment],
    pub enabled: bool,
    pub make_handler: fn() -> JobHandler,
}

/// Every job this binary knows about.
pub const JOB_TABLE: &[JobDefinition] = &[
    JobDefinition {
        name: "scout_entry_ingest",
        description: "Pull new candidate entries from every scout provider",
        cadence: "daily every 15m from 00:00 to 23:45",
        environments: &[Environment::Production, Environment::Development],
        enabled: true,
        make_handler: scout_entry_ingest,
    },
    JobDefinition {
        name: "scout_message_send",
        description: "Deliver pending scout messages",
        cadence: "daily at 10:00,19:00",
        environments: &[Environment::Production],
        enabled: true,
        make_handler: scout_message_send,
    },
    JobDefinition {
        name: "scout_message_send",
        description: "Deliver pending scout messages",
        cadence: "immediately then every 1m",
        environments: &[Environment::Development, Environment::Local],
        enabled: true,
        make_handler: scout_message_send,
    },
];

fn scout_entry_ingest() -> JobHandler {
    JobHandler::transactional(ScoutEntryIngestJob)
}

fn scout_message_send() -> JobHandler {
    JobHandler::direct(ScoutMessageSendJob)
}

/// Per-job settings from the config file. Unset fields keep the table value.
///
/// Overriding `environments` turns a job with several rows into a single
/// job: its first row is used and the others are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOverride {
    pub cadence: Option<String>,
    pub environments: Option<Vec<Environment>>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("job {job}: invalid cadence {cadence:?}: {source}")]
    InvalidCadence {
        job: String,
        cadence: String,
        #[source]
        source: CadenceParseError,
    },
    #[error("job {0} is registered more than once for this environment")]
    DuplicateJob(String),
    #[error("config overrides unknown job {0}")]
    UnknownJobOverride(String),
}

/// A job compiled for the active environment.
#[derive(Debug, Clone)]
pub struct RegisteredJob {
    pub name: String,
    pub description: String,
    pub cadence: Cadence,
    pub handler: JobHandler,
}

pub struct ScheduleRegistry;

impl ScheduleRegistry {
    /// Compiles `table` for `environment`.
    ///
    /// Every cadence in the table is parsed, including those of jobs that are
    /// filtered out.
    pub fn build(
        table: &[JobDefinition],
        environment: Environment,
        overrides: &HashMap<String, JobOverride>,
    ) -> Result<Vec<RegisteredJob>, RegistryError> {
        let known: HashSet<&str> = table.iter().map(|def| def.name).collect();
        if let Some(unknown) = overrides.keys().find(|name| !known.contains(name.as_str())) {
            return Err(RegistryError::UnknownJobOverride(unknown.clone()));
        }

        let mut registered = Vec::new();
        let mut seen = HashSet::new();
        let mut rows = HashSet::new();

        for def in table {
            let job_override = overrides.get(def.name);
            let first_row = rows.insert(def.name);
            if !first_row && job_override.is_some_and(|o| o.environments.is_some()) {
                debug!("Dropping extra row of job {} (environments overridden)", def.name);
                continue;
            }

            let cadence_expr = job_override
                .and_then(|o| o.cadence.as_deref())
                .unwrap_or(def.cadence);
            let cadence: Cadence =
                cadence_expr
                    .parse()
                    .map_err(|source| RegistryError::InvalidCadence {
                        job: def.name.to_string(),
                        cadence: cadence_expr.to_string(),
                        source,
                    })?;

            let enabled = job_override.and_then(|o| o.enabled).unwrap_or(def.enabled);
            let in_environment = match job_override.and_then(|o| o.environments.as_ref()) {
                Some(environments) => environments.contains(&environment),
                None => def.environments.contains(&environment),
            };

            if !enabled || !in_environment {
                debug!(
                    "Skipping job {} (enabled: {}, environment {} listed: {})",
                    def.name, enabled, environment, in_environment
                );
                continue;
            }

            if !seen.insert(def.name) {
                return Err(RegistryError::DuplicateJob(def.name.to_string()));
            }

            info!("Registered job {} [{}]", def.name, cadence);
            registered.push(RegisteredJob {
                name: def.name.to_string(),
                description: def.description.to_string(),
                cadence,
                handler: (def.make_handler)(),
            });
        }

        Ok(registered)
    }
}
