//! Operational routes of the batch mode: liveness, metrics and job control.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{info, warn};

use super::metrics::metrics_handler;
use super::state::BatchState;
use crate::background_jobs::{SchedulerError, SchedulerHandle};

#[derive(Serialize)]
struct TriggerResponse {
    job: String,
    status: &'static str,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for SchedulerError {
    fn into_response(self) -> Response {
        let status = match self {
            SchedulerError::NotFound => StatusCode::NOT_FOUND,
            SchedulerError::AlreadyRunning => StatusCode::CONFLICT,
            SchedulerError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Liveness probe: empty body, always 200 while the process serves.
async fn health() -> StatusCode {
    StatusCode::OK
}

async fn list_jobs(State(scheduler): State<SchedulerHandle>) -> Response {
    Json(scheduler.list_jobs().await).into_response()
}

async fn get_job(
    State(scheduler): State<SchedulerHandle>,
    Path(name): Path<String>,
) -> Response {
    match scheduler.get_job(&name).await {
        Some(job) => Json(job).into_response(),
        None => SchedulerError::NotFound.into_response(),
    }
}

async fn run_job(
    State(scheduler): State<SchedulerHandle>,
    Path(name): Path<String>,
) -> Response {
    match scheduler.trigger_job(&name).await {
        Ok(()) => {
            info!("Manually triggered job {}", name);
            (
                StatusCode::ACCEPTED,
                Json(TriggerResponse {
                    job: name,
                    status: "triggered",
                }),
            )
                .into_response()
        }
        Err(err) => {
            warn!("Manual trigger of {} refused: {}", name, err);
            err.into_response()
        }
    }
}

pub fn make_batch_routes(state: BatchState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{name}", get(get_job))
        .route("/jobs/{name}/run", post(run_job))
        .with_state(state)
}
