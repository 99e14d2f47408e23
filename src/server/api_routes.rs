//! Caller-facing routes of the API mode.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error_response::ErrorResponse;
use super::metrics::metrics_handler;
use super::session::Session;
use super::state::ApiState;
use crate::failure::ApiError;

#[derive(Serialize)]
pub struct ServerStats {
    pub uptime: String,
    pub version: &'static str,
    pub environment: &'static str,
}

#[derive(Serialize)]
struct MeResponse {
    subject: String,
    issued_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    issuer: Option<String>,
}

pub(super) fn format_uptime(duration: std::time::Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ApiState>) -> impl IntoResponse {
    Json(ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.as_str(),
    })
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn get_me(session: Session) -> Result<Json<MeResponse>, ErrorResponse> {
    if session.subject.is_empty() {
        return Err(ApiError::Forbidden.into());
    }
    Ok(Json(MeResponse {
        issued_at: DateTime::from_timestamp(session.claims.iat, 0),
        expires_at: DateTime::from_timestamp(session.claims.exp, 0),
        issuer: session.claims.iss.clone(),
        subject: session.subject,
    }))
}

pub fn make_api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/v1/me", get(get_me))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn formats_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 00:00:00");
        assert_eq!(
            format_uptime(Duration::from_secs(2 * 86_400 + 3 * 3600 + 4 * 60 + 5)),
            "2d 03:04:05"
        );
    }
}
