use super::job::JobRun;
use super::scheduler::ScheduledJob;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("job not found")]
    NotFound,
    #[error("job is already running")]
    AlreadyRunning,
    #[error("scheduler not available")]
    Unavailable,
}

/// Information about a registered job for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub name: String,
    pub description: String,
    pub cadence: String,
    pub kind: &'static str,
    pub is_running: bool,
    pub last_run_at: Option<String>,
    pub next_run_at: String,
    pub skipped_triggers: u64,
    pub last_run: Option<JobRun>,
}

impl From<&ScheduledJob> for JobInfo {
    fn from(job: &ScheduledJob) -> Self {
        JobInfo {
            name: job.name.clone(),
            description: job.description.clone(),
            cadence: job.cadence.to_string(),
            kind: job.handler.kind(),
            is_running: job.is_running(),
            last_run_at: job.last_run_at.map(|dt| dt.to_rfc3339()),
            next_run_at: job.next_run_at.to_rfc3339(),
            skipped_triggers: job.skipped_triggers,
            last_run: job.last_run.clone(),
        }
    }
}

/// Command sent to the scheduler.
pub enum SchedulerCommand {
    TriggerJob {
        job_name: String,
        response: oneshot::Sender<Result<(), SchedulerError>>,
    },
}

/// Shared state between scheduler and handle, keyed by job name.
pub struct SharedJobState {
    pub jobs: BTreeMap<String, ScheduledJob>,
}

/// Handle to interact with the job scheduler from HTTP handlers.
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    shared_state: Arc<RwLock<SharedJobState>>,
}

impl SchedulerHandle {
    pub fn new(
        command_tx: mpsc::Sender<SchedulerCommand>,
        shared_state: Arc<RwLock<SharedJobState>>,
    ) -> Self {
        Self {
            command_tx,
            shared_state,
        }
    }

    /// All registered jobs, sorted by name.
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        let state = self.shared_state.read().await;
        state.jobs.values().map(JobInfo::from).collect()
    }

    pub async fn get_job(&self, job_name: &str) -> Option<JobInfo> {
        let state = self.shared_state.read().await;
        state.jobs.get(job_name).map(JobInfo::from)
    }

    pub async fn is_job_running(&self, job_name: &str) -> bool {
        let state = self.shared_state.read().await;
        state.jobs.get(job_name).is_some_and(|job| job.is_running())
    }

    /// Trigger a job manually. Goes through the same worker slot as
    /// scheduled triggers.
    pub async fn trigger_job(&self, job_name: &str) -> Result<(), SchedulerError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(SchedulerCommand::TriggerJob {
                job_name: job_name.to_string(),
                response: response_tx,
            })
            .await
            .map_err(|_| SchedulerError::Unavailable)?;

        response_rx.await.map_err(|_| SchedulerError::Unavailable)?
    }
}
