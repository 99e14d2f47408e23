//! In-memory collaborators for tests

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scout_batch::alerts::{AlertMessage, AlertSink, Alerter};
use scout_batch::background_jobs::{DirectJob, JobContext, TransactionalJob};
use scout_batch::config::Environment;
use scout_batch::recovery::{RecoveryBoundary, ServiceKind, StackFrameFilter};
use scout_batch::storage::StorageTransaction;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Alert sink that keeps every message it is asked to send.
#[derive(Default)]
pub struct RecordingAlertSink {
    sent: Mutex<Vec<AlertMessage>>,
}

impl RecordingAlertSink {
    pub fn messages(&self) -> Vec<AlertMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn send(&self, message: &AlertMessage) -> Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// A boundary alerting into a fresh recording sink.
pub fn recording_boundary(
    kind: ServiceKind,
    environment: Environment,
) -> (RecoveryBoundary, Arc<RecordingAlertSink>) {
    let sink = Arc::new(RecordingAlertSink::default());
    let alerter = Alerter::new(environment, Some(sink.clone()), Some("robot-1".into()));
    let filter = StackFrameFilter::new(vec!["tests/".to_string()]);
    (RecoveryBoundary::new(kind, alerter, filter), sink)
}

/// Counts its runs and optionally waits for a release before returning.
pub struct ProbeJob {
    pub runs: Arc<AtomicUsize>,
    pub release: Option<Arc<Notify>>,
}

impl ProbeJob {
    pub fn quick(runs: Arc<AtomicUsize>) -> Self {
        Self {
            runs,
            release: None,
        }
    }

    pub fn blocking(runs: Arc<AtomicUsize>, release: Arc<Notify>) -> Self {
        Self {
            runs,
            release: Some(release),
        }
    }
}

#[async_trait]
impl DirectJob for ProbeJob {
    async fn run(&self, _ctx: &JobContext, _now: DateTime<Utc>) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Some(release) = &self.release {
            release.notified().await;
        }
        Ok(())
    }
}

/// Writes one entry, then fails with `message` or panics.
pub struct InsertThenFailJob {
    pub message: &'static str,
    pub panic: bool,
}

#[async_trait]
impl TransactionalJob for InsertThenFailJob {
    async fn run(
        &self,
        tx: &mut dyn StorageTransaction,
        _ctx: &JobContext,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let stamp = now.to_rfc3339();
        tx.execute(
            "INSERT INTO scout_entries (provider, external_id, payload, received_at, ingested_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params!["acme", "entry-1", "{}", stamp, stamp],
        )?;
        if self.panic {
            panic!("{}", self.message);
        }
        anyhow::bail!("{}", self.message)
    }
}
