//! Maps arbitrary errors to a stable `(code, message)` pair.
//!
//! Codes follow HTTP status semantics so the API can answer with them
//! directly. The batch side only uses them in alerts.

use std::error::Error as StdError;

use jsonwebtoken::errors::ErrorKind;
use serde::Serialize;
use thiserror::Error;

use crate::background_jobs::JobError;
use crate::identity::IdentityError;
use crate::storage::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub code: u16,
    pub message: &'static str,
}

impl Failure {
    pub const NONE: Failure = Failure::new(0, "no error");
    pub const BAD_REQUEST: Failure = Failure::new(400, "bad request");
    pub const UNAUTHORIZED: Failure = Failure::new(401, "unauthorized");
    pub const TOKEN_EXPIRED: Failure = Failure::new(401, "token expired");
    pub const INVALID_SIGNATURE: Failure = Failure::new(401, "invalid token signature");
    pub const INVALID_TOKEN: Failure = Failure::new(401, "invalid token");
    pub const TOKEN_NOT_YET_VALID: Failure = Failure::new(401, "token not yet valid");
    pub const FORBIDDEN: Failure = Failure::new(403, "forbidden");
    pub const NOT_FOUND: Failure = Failure::new(404, "not found");
    pub const SERVER_ERROR: Failure = Failure::new(500, "server error");
    pub const STORAGE_UNAVAILABLE: Failure = Failure::new(503, "storage unavailable");
    pub const JOB_TIMED_OUT: Failure = Failure::new(504, "job timed out");

    const fn new(code: u16, message: &'static str) -> Self {
        Self { code, message }
    }

    /// Whether this failure is on our side and worth an alert.
    pub fn is_server_error(&self) -> bool {
        self.code >= 500
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}

/// Client-facing errors raised by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
}

impl ApiError {
    fn failure(&self) -> Failure {
        match self {
            ApiError::BadRequest(_) => Failure::BAD_REQUEST,
            ApiError::Unauthorized => Failure::UNAUTHORIZED,
            ApiError::Forbidden => Failure::FORBIDDEN,
            ApiError::NotFound => Failure::NOT_FOUND,
        }
    }
}

impl IdentityError {
    fn failure(&self) -> Option<Failure> {
        match self {
            IdentityError::Expired => Some(Failure::TOKEN_EXPIRED),
            IdentityError::InvalidSignature => Some(Failure::INVALID_SIGNATURE),
            IdentityError::InvalidToken => Some(Failure::INVALID_TOKEN),
            IdentityError::NotYetValid => Some(Failure::TOKEN_NOT_YET_VALID),
            IdentityError::Signing(_) => None,
        }
    }
}

impl JobError {
    pub fn classify(&self) -> Failure {
        match self {
            JobError::Begin(err) | JobError::Commit(err) => classify_error(err),
            JobError::Handler(err) => classify(Some(err)),
            JobError::Timeout(_) => Failure::JOB_TIMED_OUT,
        }
    }
}

/// Classifies an optional error, walking its whole context chain.
pub fn classify(err: Option<&anyhow::Error>) -> Failure {
    match err {
        None => Failure::NONE,
        Some(err) => err
            .chain()
            .find_map(classify_one)
            .unwrap_or(Failure::SERVER_ERROR),
    }
}

/// Classifies a typed error and its `source()` chain.
pub fn classify_error(err: &(dyn StdError + 'static)) -> Failure {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(failure) = classify_one(err) {
            return failure;
        }
        current = err.source();
    }
    Failure::SERVER_ERROR
}

fn classify_one(err: &(dyn StdError + 'static)) -> Option<Failure> {
    if let Some(jwt) = err.downcast_ref::<jsonwebtoken::errors::Error>() {
        return classify_jwt(jwt.kind());
    }
    if let Some(identity) = err.downcast_ref::<IdentityError>() {
        return identity.failure();
    }
    if let Some(api) = err.downcast_ref::<ApiError>() {
        return Some(api.failure());
    }
    if let Some(StorageError::Unavailable(_)) = err.downcast_ref::<StorageError>() {
        return Some(Failure::STORAGE_UNAVAILABLE);
    }
    if let Some(job) = err.downcast_ref::<JobError>() {
        return Some(job.classify());
    }
    None
}

fn classify_jwt(kind: &ErrorKind) -> Option<Failure> {
    match kind {
        ErrorKind::ExpiredSignature => Some(Failure::TOKEN_EXPIRED),
        ErrorKind::InvalidSignature => Some(Failure::INVALID_SIGNATURE),
        ErrorKind::ImmatureSignature => Some(Failure::TOKEN_NOT_YET_VALID),
        ErrorKind::InvalidToken
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidSubject
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::MissingRequiredClaim(_)
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => Some(Failure::INVALID_TOKEN),
        _ => None,
    }
}
