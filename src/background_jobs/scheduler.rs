use super::cadence::Cadence;
use super::executor::JobExecutor;
use super::handle::{SchedulerCommand, SchedulerError, SchedulerHandle, SharedJobState};
use super::job::{JobHandler, JobRun, TriggerSource};
use super::registry::RegisteredJob;
use crate::server::metrics;
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest the loop sleeps between ticks.
const MAX_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// A registered job and its scheduling state.
pub struct ScheduledJob {
    pub name: String,
    pub description: String,
    pub cadence: Cadence,
    pub handler: JobHandler,
    /// When the last run was dispatched.
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: DateTime<Utc>,
    /// Most recent completed run.
    pub last_run: Option<JobRun>,
    pub skipped_triggers: u64,
    /// Single worker slot. Held by the run task for its whole lifetime.
    slot: Arc<Semaphore>,
}

impl ScheduledJob {
    fn new(job: RegisteredJob, now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let next_run_at = job.cadence.first_run(now, offset);
        Self {
            name: job.name,
            description: job.description,
            cadence: job.cadence,
            handler: job.handler,
            last_run_at: None,
            next_run_at,
            last_run: None,
            skipped_triggers: 0,
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.slot.available_permits() == 0
    }
}

/// A run handed to the runtime by a tick or a manual trigger.
pub struct DispatchedRun {
    pub job_name: String,
    pub handle: JoinHandle<JobRun>,
}

/// Create a scheduler for `jobs` and return a handle for interacting with it.
///
/// First triggers are computed from `now`.
pub fn create_scheduler(
    jobs: Vec<RegisteredJob>,
    executor: JobExecutor,
    offset: FixedOffset,
    now: DateTime<Utc>,
    shutdown_token: CancellationToken,
) -> (SchedulerLoop, SchedulerHandle) {
    let jobs: BTreeMap<String, ScheduledJob> = jobs
        .into_iter()
        .map(|job| {
            info!("Registering job: {} - {}", job.name, job.description);
            (job.name.clone(), ScheduledJob::new(job, now, offset))
        })
        .collect();

    let shared_state = Arc::new(RwLock::new(SharedJobState { jobs }));
    let (command_tx, command_receiver) = mpsc::channel(16);

    let scheduler = SchedulerLoop {
        shared_state: Arc::clone(&shared_state),
        executor,
        offset,
        command_receiver,
        shutdown_token,
    };
    let handle = SchedulerHandle::new(command_tx, shared_state);
    (scheduler, handle)
}

/// Ticking engine: fires due jobs, at most one run per job at a time.
pub struct SchedulerLoop {
    shared_state: Arc<RwLock<SharedJobState>>,
    executor: JobExecutor,
    offset: FixedOffset,
    command_receiver: mpsc::Receiver<SchedulerCommand>,
    shutdown_token: CancellationToken,
}

impl SchedulerLoop {
    /// Spawns the loop and returns immediately.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Main scheduler loop. Runs until the shutdown token is cancelled.
    pub async fn run(mut self) {
        let job_count = self.shared_state.read().await.jobs.len();
        info!("Starting job scheduler with {} registered jobs", job_count);

        loop {
            let sleep_duration = self.time_until_next_run(Utc::now()).await;
            debug!(
                "Scheduler sleeping for {:?} until next scheduled job",
                sleep_duration
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.tick(Utc::now()).await;
                }
                Some(cmd) = self.command_receiver.recv() => {
                    self.handle_command(cmd).await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    async fn time_until_next_run(&self, now: DateTime<Utc>) -> Duration {
        let state = self.shared_state.read().await;
        state
            .jobs
            .values()
            .map(|job| (job.next_run_at - now).to_std().unwrap_or(Duration::ZERO))
            .min()
            .unwrap_or(MAX_CHECK_INTERVAL)
            .min(MAX_CHECK_INTERVAL)
    }

    /// Evaluates every job against `now` and dispatches the due ones.
    ///
    /// A due job whose previous run is still in flight is skipped. Either
    /// way its next trigger moves to the first one strictly after `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<DispatchedRun> {
        let mut dispatched = Vec::new();
        let mut state = self.shared_state.write().await;

        for job in state.jobs.values_mut() {
            if job.next_run_at > now {
                continue;
            }

            let scheduled = job.next_run_at;
            job.next_run_at = job.cadence.next_after(scheduled, now, self.offset);

            match self.dispatch(job, TriggerSource::Schedule, now) {
                Ok(run) => dispatched.push(run),
                Err(_) => {
                    warn!(
                        "Skipping trigger of {} scheduled at {}: previous run still in flight",
                        job.name, scheduled
                    );
                    job.skipped_triggers += 1;
                    metrics::record_skipped_trigger(&job.name);
                }
            }
        }

        for job in state.jobs.values() {
            info!(
                "Job {} heartbeat: running={} last_run={} next_run={}",
                job.name,
                job.is_running(),
                job.last_run_at
                    .map(|dt| dt.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string()),
                job.next_run_at.to_rfc3339()
            );
        }

        dispatched
    }

    /// Takes the job's worker slot and spawns one execution.
    ///
    /// Fails with `AlreadyRunning` when the slot is taken.
    fn dispatch(
        &self,
        job: &mut ScheduledJob,
        trigger: TriggerSource,
        now: DateTime<Utc>,
    ) -> Result<DispatchedRun, SchedulerError> {
        let permit = Arc::clone(&job.slot)
            .try_acquire_owned()
            .map_err(|_| SchedulerError::AlreadyRunning)?;

        job.last_run_at = Some(now);
        metrics::set_job_running(&job.name, true);

        let executor = self.executor.clone();
        let handler = job.handler.clone();
        let job_name = job.name.clone();
        let shared_state = Arc::clone(&self.shared_state);

        let handle = tokio::spawn(async move {
            let run = executor.execute(&job_name, &handler, trigger, now).await;

            metrics::set_job_running(&job_name, false);
            match shared_state.write().await.jobs.get_mut(&job_name) {
                Some(job) => job.last_run = Some(run.clone()),
                None => error!("Finished run for unknown job: {}", job_name),
            }
            drop(permit);
            run
        });

        Ok(DispatchedRun {
            job_name: job.name.clone(),
            handle,
        })
    }

    /// Handle a command from the SchedulerHandle.
    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::TriggerJob { job_name, response } => {
                let result = self.trigger_job(&job_name).await.map(|_| ());
                let _ = response.send(result);
            }
        }
    }

    /// Manually trigger a job by name.
    pub async fn trigger_job(&self, job_name: &str) -> Result<DispatchedRun, SchedulerError> {
        let mut state = self.shared_state.write().await;
        let job = state
            .jobs
            .get_mut(job_name)
            .ok_or(SchedulerError::NotFound)?;
        self.dispatch(job, TriggerSource::Manual, Utc::now())
    }
}
