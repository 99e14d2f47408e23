use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scout_batch::alerts::{AlertSink, Alerter, SlackAlertSink};
use scout_batch::background_jobs::{
    create_scheduler, JobContext, JobExecutor, ScheduleRegistry, JOB_TABLE,
};
use scout_batch::config::{AppConfig, CliConfig, Environment, FileConfig, RunMode};
use scout_batch::identity::JwtIdentityClient;
use scout_batch::recovery::{RecoveryBoundary, ServiceKind, StackFrameFilter};
use scout_batch::scout_client::{HttpScoutClient, ScoutService};
use scout_batch::server::{
    self, run_api_server, run_batch_server, ApiState, BatchState, RequestsLoggingLevel,
    ServerConfig,
};
use scout_batch::storage::{SqliteStorage, Storage};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Its values override the flags below.
    #[clap(long, env = "SCOUT_CONFIG", value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Deployment environment: production, development (alias staging) or local.
    #[clap(long, env = "SCOUT_ENVIRONMENT")]
    pub environment: Option<Environment>,

    /// Which half of the binary to run.
    #[clap(long, env = "SCOUT_MODE", default_value = "api")]
    pub mode: RunMode,

    /// Path to the SQLite database file.
    #[clap(long, env = "SCOUT_DB_PATH", value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// The port the API server listens on.
    #[clap(short, long, env = "SCOUT_PORT", default_value_t = 3001)]
    pub port: u16,

    /// The port the batch server's health and job endpoints listen on.
    #[clap(long, env = "SCOUT_BATCH_PORT", default_value_t = 3002)]
    pub batch_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,
}

impl From<&CliArgs> for CliConfig {
    fn from(args: &CliArgs) -> Self {
        CliConfig {
            environment: args.environment,
            mode: args.mode,
            db_path: args.db_path.clone(),
            port: args.port,
            batch_port: args.batch_port,
            logging_level: args.logging_level.clone(),
        }
    }
}

fn make_boundary(kind: ServiceKind, config: &AppConfig) -> Result<RecoveryBoundary> {
    let sink: Option<Arc<dyn AlertSink>> = match &config.alerts {
        Some(settings) => Some(Arc::new(SlackAlertSink::new(settings)?)),
        None => None,
    };
    let alerter = Alerter::new(config.environment, sink, config.robot_id.clone());
    let filter = StackFrameFilter::new(config.business_frame_markers.clone());
    Ok(RecoveryBoundary::new(kind, alerter, filter))
}

fn make_scout_services(config: &AppConfig) -> Result<Vec<Arc<dyn ScoutService>>> {
    config
        .scout_services
        .providers
        .iter()
        .map(|provider| {
            info!(
                "Scout provider {} configured at {}",
                provider.name, provider.base_url
            );
            let client = HttpScoutClient::from_settings(provider, config.scout_services.timeout_sec)
                .with_context(|| format!("Failed to create client for {}", provider.name))?;
            Ok(Arc::new(client) as Arc<dyn ScoutService>)
        })
        .collect()
}

async fn run_api(config: AppConfig, shutdown: CancellationToken) -> Result<()> {
    let identity_settings = config
        .identity
        .as_ref()
        .context("The [identity] section is required in api mode")?;
    let identity = Arc::new(JwtIdentityClient::from_settings(identity_settings));
    let boundary = make_boundary(ServiceKind::Api, &config)?;

    let server_config = ServerConfig {
        environment: config.environment,
        requests_logging_level: config.logging_level.clone(),
        port: config.port,
    };
    run_api_server(ApiState::new(server_config, identity, boundary), shutdown).await
}

async fn run_batch(config: AppConfig, shutdown: CancellationToken) -> Result<()> {
    info!("Opening SQLite database at {:?}...", config.db_path);
    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open(&config.db_path)?);

    let jobs = ScheduleRegistry::build(
        JOB_TABLE,
        config.environment,
        &config.background_jobs.overrides,
    )
    .context("Invalid job schedule")?;
    info!(
        "Registered {} jobs for the {} environment",
        jobs.len(),
        config.environment
    );

    let boundary = make_boundary(ServiceKind::Batch, &config)?;
    let context = JobContext::new(shutdown.child_token(), make_scout_services(&config)?);
    let executor = JobExecutor::new(
        storage,
        boundary.clone(),
        config.background_jobs.job_timeout,
        context,
    );

    let (scheduler, scheduler_handle) = create_scheduler(
        jobs,
        executor,
        config.schedule_utc_offset,
        Utc::now(),
        shutdown.clone(),
    );
    let scheduler_task = scheduler.start();

    let server_config = ServerConfig {
        environment: config.environment,
        requests_logging_level: config.logging_level.clone(),
        port: config.batch_port,
    };
    let served = run_batch_server(
        BatchState::new(server_config, scheduler_handle, boundary),
        shutdown.clone(),
    )
    .await;

    shutdown.cancel();
    if let Err(e) = scheduler_task.await {
        error!("Scheduler task ended abnormally: {}", e);
    }
    served
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}...", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&CliConfig::from(&cli_args), file_config)
        .context("Invalid configuration")?;
    info!(
        "Starting scout server {} in {:?} mode, environment {}",
        env!("CARGO_PKG_VERSION"),
        config.mode,
        config.environment
    );

    info!("Initializing metrics...");
    server::metrics::init_metrics();

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                signal_token.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    match config.mode {
        RunMode::Api => run_api(config, shutdown).await,
        RunMode::Batch => run_batch(config, shutdown).await,
    }
}
