//! Runs one job invocation end to end: deadline, unit of work, recovery,
//! classification and alerting.

use super::context::JobContext;
use super::job::{JobError, JobHandler, JobOutcome, JobRun, TriggerSource};
use super::unit_of_work::{run_direct, run_in_transaction};
use crate::alerts::{AlertMessage, Severity};
use crate::recovery::RecoveryBoundary;
use crate::server::metrics;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct JobExecutor {
    storage: Arc<dyn Storage>,
    boundary: RecoveryBoundary,
    job_timeout: Duration,
    context: JobContext,
}

impl JobExecutor {
    pub fn new(
        storage: Arc<dyn Storage>,
        boundary: RecoveryBoundary,
        job_timeout: Duration,
        context: JobContext,
    ) -> Self {
        Self {
            storage,
            boundary,
            job_timeout,
            context,
        }
    }

    /// Executes `handler` once and returns the closed run record.
    ///
    /// Never fails: business errors are alerted and panics are recovered.
    pub async fn execute(
        &self,
        job_name: &str,
        handler: &JobHandler,
        trigger: TriggerSource,
        now: DateTime<Utc>,
    ) -> JobRun {
        let run_id = Uuid::new_v4();
        info!(
            "Starting job: {} (run_id: {}, triggered_by: {})",
            job_name, run_id, trigger
        );

        let start_time = Instant::now();
        let work = async {
            let unit = async {
                match handler {
                    JobHandler::Transactional(job) => {
                        run_in_transaction(self.storage.as_ref(), job.as_ref(), &self.context, now)
                            .await
                    }
                    JobHandler::Direct(job) => run_direct(job.as_ref(), &self.context, now).await,
                }
            };
            match tokio::time::timeout(self.job_timeout, unit).await {
                Ok(result) => result,
                Err(_) => Err(JobError::Timeout(self.job_timeout)),
            }
        };

        let context = vec![
            ("job".to_string(), job_name.to_string()),
            ("run_id".to_string(), run_id.to_string()),
        ];
        let result = self.boundary.run(context, work).await;
        let elapsed = start_time.elapsed();

        let (outcome, error_detail) = match result {
            Ok(Ok(())) => {
                info!("Job {} completed successfully in {:?}", job_name, elapsed);
                (JobOutcome::Success, None)
            }
            Ok(Err(e)) => {
                error!("Job {} failed after {:?}: {}", job_name, elapsed, e);
                self.report_failure(job_name, run_id, &e).await;
                (JobOutcome::BusinessError, Some(e.to_string()))
            }
            Err(report) => {
                error!("Job {} panicked after {:?}: {}", job_name, elapsed, report);
                (JobOutcome::Panic, Some(report.to_string()))
            }
        };

        metrics::record_job_execution(job_name, outcome.as_str(), elapsed);

        JobRun {
            run_id,
            job_name: job_name.to_string(),
            trigger,
            started_at: now,
            finished_at: now + chrono::Duration::from_std(elapsed).unwrap_or_default(),
            outcome,
            error_detail,
        }
    }

    async fn report_failure(&self, job_name: &str, run_id: Uuid, err: &JobError) {
        let failure = err.classify();
        let message = AlertMessage::new(Severity::Error, self.boundary.kind().service_name())
            .with_context("job", job_name)
            .with_context("run_id", run_id.to_string())
            .with_failure(failure.code, failure.message)
            .with_raw_error(err.to_string());
        self.boundary.alerter().report(message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertSink, Alerter};
    use crate::background_jobs::job::{DirectJob, TransactionalJob};
    use crate::config::Environment;
    use crate::recovery::{ServiceKind, StackFrameFilter};
    use crate::storage::{SqliteStorage, StorageTransaction};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<AlertMessage>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn send(&self, message: &AlertMessage) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn executor(sink: Arc<RecordingSink>, timeout: Duration) -> JobExecutor {
        let alerter = Alerter::new(Environment::Production, Some(sink), None);
        let boundary = RecoveryBoundary::new(
            ServiceKind::Batch,
            alerter,
            StackFrameFilter::new(vec!["src/background_jobs/executor.rs".into()]),
        );
        JobExecutor::new(
            Arc::new(SqliteStorage::open_in_memory().unwrap()),
            boundary,
            timeout,
            JobContext::new(CancellationToken::new(), vec![]),
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 15, 0).unwrap()
    }

    struct InsertThenFail;

    #[async_trait]
    impl TransactionalJob for InsertThenFail {
        async fn run(
            &self,
            tx: &mut dyn StorageTransaction,
            _ctx: &JobContext,
            _now: DateTime<Utc>,
        ) -> anyhow::Result<()> {
            tx.execute(
                "INSERT INTO scout_entries (provider, external_id, payload, received_at, ingested_at) \
                 VALUES ('p', 'e', '{}', 'x', 'x')",
                &[],
            )?;
            anyhow::bail!("rate limit exceeded")
        }
    }

    struct Sleepy;

    #[async_trait]
    impl DirectJob for Sleepy {
        async fn run(&self, _ctx: &JobContext, _now: DateTime<Utc>) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    struct Panicky;

    #[async_trait]
    impl DirectJob for Panicky {
        async fn run(&self, _ctx: &JobContext, _now: DateTime<Utc>) -> anyhow::Result<()> {
            let entries: Vec<u32> = Vec::new();
            let _ = entries[3];
            Ok(())
        }
    }

    #[tokio::test]
    async fn business_error_is_classified_and_alerted_once() {
        let sink = Arc::new(RecordingSink::default());
        let executor = executor(sink.clone(), Duration::from_secs(5));

        let run = executor
            .execute(
                "scout_entry_ingest",
                &JobHandler::transactional(InsertThenFail),
                TriggerSource::Schedule,
                now(),
            )
            .await;

        assert_eq!(run.outcome, JobOutcome::BusinessError);
        assert_eq!(run.error_detail.as_deref(), Some("rate limit exceeded"));
        assert_eq!(run.started_at, now());

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].severity, Severity::Error);
        assert_eq!(sent[0].service_name, "batch");
        assert_eq!((sent[0].error_code, sent[0].human_message.as_str()), (500, "server error"));
        assert_eq!(sent[0].raw_error_text, "rate limit exceeded");
        assert_eq!(sent[0].context[0], ("job".into(), "scout_entry_ingest".into()));
    }

    #[tokio::test]
    async fn deadline_is_a_timeout_error() {
        let sink = Arc::new(RecordingSink::default());
        let executor = executor(sink.clone(), Duration::from_millis(20));

        let run = executor
            .execute(
                "scout_message_send",
                &JobHandler::direct(Sleepy),
                TriggerSource::Manual,
                now(),
            )
            .await;

        assert_eq!(run.outcome, JobOutcome::BusinessError);
        assert_eq!(run.trigger, TriggerSource::Manual);
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent[0].error_code, 504);
        assert_eq!(sent[0].human_message, "job timed out");
    }

    #[tokio::test]
    async fn panic_is_recorded_and_alerted_as_panic() {
        let sink = Arc::new(RecordingSink::default());
        let executor = executor(sink.clone(), Duration::from_secs(5));

        let run = executor
            .execute(
                "scout_message_send",
                &JobHandler::direct(Panicky),
                TriggerSource::Schedule,
                now(),
            )
            .await;

        assert_eq!(run.outcome, JobOutcome::Panic);
        assert!(run
            .error_detail
            .as_deref()
            .is_some_and(|d| d.contains("index out of bounds")));
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].severity, Severity::Panic);
    }
}
