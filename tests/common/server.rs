//! Test server lifecycle management
//!
//! Each test gets an isolated server on a random port. Batch servers get
//! their own scheduler and a temporary database.

use super::constants::*;
use super::fakes::{recording_boundary, ProbeJob, RecordingAlertSink};
use chrono::{FixedOffset, Utc};
use scout_batch::background_jobs::{
    create_scheduler, JobContext, JobExecutor, JobHandler, RegisteredJob, SchedulerHandle,
};
use scout_batch::config::Environment;
use scout_batch::identity::JwtIdentityClient;
use scout_batch::recovery::ServiceKind;
use scout_batch::server::{
    make_api_app, make_batch_app, ApiState, BatchState, RequestsLoggingLevel, ServerConfig,
};
use scout_batch::storage::SqliteStorage;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Test server instance
///
/// When dropped, the server and its scheduler shut down and temp resources
/// are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Alerts produced by the server's recovery boundary
    pub alerts: Arc<RecordingAlertSink>,

    /// Present for batch servers only
    pub scheduler: Option<BatchProbes>,

    // Private fields - keep resources alive until drop
    _temp_db_dir: Option<TempDir>,
    shutdown: CancellationToken,
}

/// Handles on the probe jobs of a batch test server.
pub struct BatchProbes {
    pub handle: SchedulerHandle,
    pub blocking_runs: Arc<AtomicUsize>,
    pub quick_runs: Arc<AtomicUsize>,
    pub release: Arc<Notify>,
}

fn server_config(environment: Environment) -> ServerConfig {
    ServerConfig {
        environment,
        requests_logging_level: RequestsLoggingLevel::None,
        port: 0,
    }
}

impl TestServer {
    /// Spawns an API-mode server in `environment`.
    pub async fn spawn_api(environment: Environment) -> Self {
        let (boundary, alerts) = recording_boundary(ServiceKind::Api, environment);
        let identity = Arc::new(JwtIdentityClient::new(
            TEST_SIGNING_SECRET.as_bytes(),
            None,
            0,
        ));
        let app = make_api_app(ApiState::new(
            server_config(environment),
            identity,
            boundary,
        ));

        Self::serve(app, alerts, None, None, CancellationToken::new()).await
    }

    /// Spawns a batch-mode server with two probe jobs that only fire on
    /// manual triggers.
    pub async fn spawn_batch() -> Self {
        let environment = Environment::Development;
        let (boundary, alerts) = recording_boundary(ServiceKind::Batch, environment);

        let temp_db_dir = TempDir::new().expect("Failed to create temp dir");
        let storage = SqliteStorage::open(temp_db_dir.path().join("scout.db"))
            .expect("Failed to open storage");

        let shutdown = CancellationToken::new();
        let executor = JobExecutor::new(
            Arc::new(storage),
            boundary.clone(),
            Duration::from_secs(30),
            JobContext::new(shutdown.child_token(), vec![]),
        );

        let blocking_runs = Arc::new(AtomicUsize::new(0));
        let quick_runs = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());
        let jobs = vec![
            RegisteredJob {
                name: BLOCKING_JOB.to_string(),
                description: "Waits for the test to release it".to_string(),
                cadence: "every 24h".parse().expect("valid cadence"),
                handler: JobHandler::direct(ProbeJob::blocking(
                    blocking_runs.clone(),
                    release.clone(),
                )),
            },
            RegisteredJob {
                name: QUICK_JOB.to_string(),
                description: "Returns at once".to_string(),
                cadence: "every 24h".parse().expect("valid cadence"),
                handler: JobHandler::direct(ProbeJob::quick(quick_runs.clone())),
            },
        ];

        let utc = FixedOffset::east_opt(0).expect("valid offset");
        let (scheduler, handle) =
            create_scheduler(jobs, executor, utc, Utc::now(), shutdown.clone());
        scheduler.start();

        let app = make_batch_app(BatchState::new(
            server_config(environment),
            handle.clone(),
            boundary,
        ));
        let probes = BatchProbes {
            handle,
            blocking_runs,
            quick_runs,
            release,
        };

        Self::serve(app, alerts, Some(probes), Some(temp_db_dir), shutdown).await
    }

    async fn serve(
        app: axum::Router,
        alerts: Arc<RecordingAlertSink>,
        scheduler: Option<BatchProbes>,
        temp_db_dir: Option<TempDir>,
        shutdown: CancellationToken,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            alerts,
            scheduler,
            _temp_db_dir: temp_db_dir,
            shutdown,
        };
        server.wait_for_ready().await;
        server
    }

    /// Waits for the server to answer its health endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        while start.elapsed() < timeout {
            if let Ok(response) = client.get(format!("{}/health", self.base_url)).send().await {
                if response.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        panic!("Server did not become ready within {:?}", timeout);
    }

    /// HTTP client with the suite's request timeout
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client")
    }

    pub fn probes(&self) -> &BatchProbes {
        self.scheduler
            .as_ref()
            .expect("not a batch test server")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
