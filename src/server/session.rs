use super::error_response::ErrorResponse;
use super::state::ApiState;
use crate::failure::ApiError;
use crate::identity::Claims;

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::debug;

/// The verified caller of an API request.
#[derive(Debug)]
pub struct Session {
    pub subject: String,
    pub claims: Claims,
}

pub const HEADER_SESSION_TOKEN_KEY: &str = "Authorization";
const BEARER_PREFIX: &str = "Bearer ";

fn extract_bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(HEADER_SESSION_TOKEN_KEY)?;
    let value = String::from_utf8_lossy(value.as_bytes());
    value
        .strip_prefix(BEARER_PREFIX)
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

impl FromRequestParts<ApiState> for Session {
    type Rejection = ErrorResponse;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let token = match extract_bearer_token(parts) {
            Some(token) => token,
            None => {
                debug!("No bearer token in request headers.");
                return Err(ApiError::Unauthorized.into());
            }
        };

        let claims = ctx.identity.verify(&token)?;
        debug!("Verified token for subject {}", claims.sub);
        Ok(Session {
            subject: claims.sub.clone(),
            claims,
        })
    }
}
