//! Turns handler errors into classified HTTP answers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error};

use crate::failure::{classify, Failure};

/// Left in the response extensions when a handler failed on our side.
/// The recovery layer turns it into an alert.
#[derive(Debug, Clone)]
pub struct ReportedFailure {
    pub failure: Failure,
    pub raw_error: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

/// Handler error. Answered with the classified status and message, never
/// with the raw error text.
#[derive(Debug)]
pub struct ErrorResponse(anyhow::Error);

impl<E> From<E> for ErrorResponse
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        ErrorResponse(err.into())
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let failure = classify(Some(&self.0));
        let status =
            StatusCode::from_u16(failure.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = (
            status,
            Json(ErrorBody {
                error: failure.message,
            }),
        )
            .into_response();

        if failure.is_server_error() {
            error!("Request failed with {}: {:#}", failure, self.0);
            response.extensions_mut().insert(ReportedFailure {
                failure,
                raw_error: format!("{:#}", self.0),
            });
        } else {
            debug!("Request rejected with {}: {:#}", failure, self.0);
        }
        response
    }
}
