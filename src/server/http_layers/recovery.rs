//! Panic recovery middleware
//!
//! Every request runs inside the server's `RecoveryBoundary`. A panicking
//! handler is answered with a generic 500. Handler errors that were
//! classified as server errors are alerted here too.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::alerts::{AlertMessage, Severity};
use crate::failure::Failure;
use crate::recovery::RecoveryBoundary;
use crate::server::error_response::ReportedFailure;

pub async fn recover_panics(
    State(boundary): State<RecoveryBoundary>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let context = vec![
        ("method".to_string(), request.method().to_string()),
        ("path".to_string(), request.uri().path().to_string()),
    ];

    match boundary.run(context.clone(), next.run(request)).await {
        Ok(response) => {
            if let Some(reported) = response.extensions().get::<ReportedFailure>() {
                let mut message =
                    AlertMessage::new(Severity::Error, boundary.kind().service_name());
                for (key, value) in context {
                    message = message.with_context(key, value);
                }
                let message = message
                    .with_failure(reported.failure.code, reported.failure.message)
                    .with_raw_error(reported.raw_error.clone());
                boundary.alerter().report(message).await;
            }
            response
        }
        Err(_report) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": Failure::SERVER_ERROR.message })),
        )
            .into_response(),
    }
}
