use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all scout batch server metrics
const PREFIX: &str = "scout_batch";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Background Job Metrics
    pub static ref JOB_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_job_executions_total"), "Job runs by outcome"),
        &["job", "outcome"]
    ).expect("Failed to create job_executions_total metric");

    pub static ref JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_job_duration_seconds"),
            "Job run duration in seconds"
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0]),
        &["job"]
    ).expect("Failed to create job_duration_seconds metric");

    pub static ref JOB_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_job_running"), "1 while a run of the job is in flight"),
        &["job"]
    ).expect("Failed to create job_running metric");

    pub static ref JOB_SKIPPED_TRIGGERS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            format!("{PREFIX}_job_skipped_triggers_total"),
            "Triggers skipped because the previous run was still in flight"
        ),
        &["job"]
    ).expect("Failed to create job_skipped_triggers_total metric");

    // Alerting Metrics
    pub static ref ALERTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_alerts_total"), "Alerts by severity and delivery result"),
        &["severity", "result"]
    ).expect("Failed to create alerts_total metric");

    pub static ref PANICS_RECOVERED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_panics_recovered_total"), "Panics caught by a recovery boundary"),
        &["service"]
    ).expect("Failed to create panics_recovered_total metric");

    // System Metrics
    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process resident memory in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(JOB_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(JOB_SKIPPED_TRIGGERS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ALERTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PANICS_RECOVERED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Record a finished job run
pub fn record_job_execution(job: &str, outcome: &str, duration: Duration) {
    JOB_EXECUTIONS_TOTAL
        .with_label_values(&[job, outcome])
        .inc();

    JOB_DURATION_SECONDS
        .with_label_values(&[job])
        .observe(duration.as_secs_f64());
}

pub fn set_job_running(job: &str, running: bool) {
    JOB_RUNNING
        .with_label_values(&[job])
        .set(if running { 1.0 } else { 0.0 });
}

pub fn record_skipped_trigger(job: &str) {
    JOB_SKIPPED_TRIGGERS_TOTAL.with_label_values(&[job]).inc();
}

/// Record an alert delivery attempt
pub fn record_alert(severity: &str, result: &str) {
    ALERTS_TOTAL.with_label_values(&[severity, result]).inc();
}

pub fn record_recovered_panic(service: &str) {
    PANICS_RECOVERED_TOTAL.with_label_values(&[service]).inc();
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<f64>().ok());
            if let Some(kb) = rss_kb {
                PROCESS_MEMORY_BYTES.set(kb * 1024.0);
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
