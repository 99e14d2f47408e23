//! Bearer token verification and issuance.

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::IdentitySettings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("token expired")]
    Expired,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("invalid token")]
    InvalidToken,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for IdentityError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => IdentityError::Expired,
            ErrorKind::InvalidSignature => IdentityError::InvalidSignature,
            ErrorKind::ImmatureSignature => IdentityError::NotYetValid,
            ErrorKind::InvalidToken
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::InvalidSubject
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::MissingRequiredClaim(_)
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => IdentityError::InvalidToken,
            _ => IdentityError::Signing(err.to_string()),
        }
    }
}

/// Verifies caller identity tokens.
pub trait IdentityClient: Send + Sync {
    fn verify(&self, token: &str) -> Result<Claims, IdentityError>;

    fn sign(&self, claims: &Claims) -> Result<String, IdentityError>;

    /// Issues a token for `subject` valid from now for `ttl`.
    fn issue(&self, subject: &str, ttl: Duration) -> Result<String, IdentityError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp: now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)),
            iss: None,
        };
        self.sign(&claims)
    }
}

/// HS256 tokens signed with a shared secret.
pub struct JwtIdentityClient {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: Option<String>,
    leeway_secs: u64,
}

impl JwtIdentityClient {
    pub fn new(secret: &[u8], issuer: Option<String>, leeway_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer,
            leeway_secs,
        }
    }

    pub fn from_settings(settings: &IdentitySettings) -> Self {
        Self::new(
            settings.signing_secret.as_bytes(),
            settings.issuer.clone(),
            settings.leeway_secs,
        )
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.leeway_secs;
        validation.validate_nbf = true;
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        validation
    }
}

impl IdentityClient for JwtIdentityClient {
    fn verify(&self, token: &str) -> Result<Claims, IdentityError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation())?;
        let claims = data.claims;

        // jsonwebtoken does not check iat
        let latest_acceptable = Utc::now().timestamp() + self.leeway_secs as i64;
        if claims.iat > latest_acceptable {
            return Err(IdentityError::NotYetValid);
        }
        Ok(claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, IdentityError> {
        let mut claims = claims.clone();
        if claims.iss.is_none() {
            claims.iss = self.issuer.clone();
        }
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| IdentityError::Signing(e.to_string()))
    }
}
