//! Transactional envelope around a single job execution.

use super::context::JobContext;
use super::job::{DirectJob, JobError, TransactionalJob};
use crate::storage::{Storage, StorageError, StorageTransaction};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// Holds an open transaction and rolls it back on drop unless it was
/// explicitly finished.
///
/// Dropping happens when the owning future is cancelled (deadline) or
/// unwinds (panic inside the handler).
struct TransactionGuard {
    tx: Option<Box<dyn StorageTransaction>>,
}

impl TransactionGuard {
    fn new(tx: Box<dyn StorageTransaction>) -> Self {
        Self { tx: Some(tx) }
    }

    fn handle(&mut self) -> Option<&mut dyn StorageTransaction> {
        match self.tx.as_mut() {
            Some(tx) => Some(tx.as_mut()),
            None => None,
        }
    }

    fn commit(mut self) -> Result<(), JobError> {
        match self.tx.take() {
            Some(tx) => tx.commit().map_err(JobError::Commit),
            None => Ok(()),
        }
    }

    fn rollback(mut self) {
        if let Some(tx) = self.tx.take() {
            if let Err(err) = tx.rollback() {
                warn!("Rollback failed: {}", err);
            }
        }
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            debug!("Rolling back unfinished transaction");
            if let Err(err) = tx.rollback() {
                warn!("Rollback of unfinished transaction failed: {}", err);
            }
        }
    }
}

/// Runs `job` inside one storage transaction.
///
/// Commits on handler success and rolls back on handler error. If `begin`
/// fails the handler is never invoked.
pub async fn run_in_transaction(
    storage: &dyn Storage,
    job: &dyn TransactionalJob,
    ctx: &JobContext,
    now: DateTime<Utc>,
) -> Result<(), JobError> {
    let tx = storage.begin().await.map_err(JobError::Begin)?;
    let mut guard = TransactionGuard::new(tx);
    let Some(handle) = guard.handle() else {
        return Err(JobError::Begin(StorageError::Finished));
    };

    match job.run(handle, ctx, now).await {
        Ok(()) => guard.commit(),
        Err(err) => {
            guard.rollback();
            Err(JobError::Handler(err))
        }
    }
}

/// Runs a job that does not need a transaction.
pub async fn run_direct(
    job: &dyn DirectJob,
    ctx: &JobContext,
    now: DateTime<Utc>,
) -> Result<(), JobError> {
    job.run(ctx, now).await.map_err(JobError::Handler)
}
