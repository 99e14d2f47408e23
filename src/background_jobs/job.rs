use super::context::JobContext;
use crate::storage::{StorageError, StorageTransaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during one job execution.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("failed to begin transaction: {0}")]
    Begin(#[source] StorageError),
    #[error("failed to commit transaction: {0}")]
    Commit(#[source] StorageError),
    #[error("{0:#}")]
    Handler(anyhow::Error),
    #[error("job exceeded its {0:?} deadline")]
    Timeout(Duration),
}

/// A job whose work must be atomic against shared storage.
///
/// The handler receives an open transaction; returning `Ok` commits it,
/// returning `Err` rolls it back.
#[async_trait]
pub trait TransactionalJob: Send + Sync {
    async fn run(
        &self,
        tx: &mut dyn StorageTransaction,
        ctx: &JobContext,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()>;
}

/// A job that does not touch shared state (e.g. outbound sends).
#[async_trait]
pub trait DirectJob: Send + Sync {
    async fn run(&self, ctx: &JobContext, now: DateTime<Utc>) -> anyhow::Result<()>;
}

/// How a job is invoked. Chosen per job kind.
#[derive(Clone)]
pub enum JobHandler {
    Transactional(Arc<dyn TransactionalJob>),
    Direct(Arc<dyn DirectJob>),
}

impl JobHandler {
    pub fn transactional(job: impl TransactionalJob + 'static) -> Self {
        JobHandler::Transactional(Arc::new(job))
    }

    pub fn direct(job: impl DirectJob + 'static) -> Self {
        JobHandler::Direct(Arc::new(job))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            JobHandler::Transactional(_) => "transactional",
            JobHandler::Direct(_) => "direct",
        }
    }
}

impl std::fmt::Debug for JobHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JobHandler::{}", self.kind())
    }
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Schedule,
    Manual,
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerSource::Schedule => write!(f, "schedule"),
            TriggerSource::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Success,
    BusinessError,
    Panic,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Success => "success",
            JobOutcome::BusinessError => "business_error",
            JobOutcome::Panic => "panic",
        }
    }
}

/// One execution attempt of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobRun {
    pub run_id: Uuid,
    pub job_name: String,
    pub trigger: TriggerSource,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: JobOutcome,
    pub error_detail: Option<String>,
}
