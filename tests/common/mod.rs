//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::TestServer;
//!
//! #[tokio::test]
//! async fn test_health() {
//!     let server = TestServer::spawn_batch().await;
//!     let response = server
//!         .client()
//!         .get(format!("{}/health", server.base_url))
//!         .send()
//!         .await
//!         .unwrap();
//!     assert!(response.status().is_success());
//! }
//! ```

#![allow(dead_code)]

mod constants;
mod fakes;
mod server;

// Public API - this is what tests import
pub use constants::*;
pub use fakes::{recording_boundary, InsertThenFailJob, ProbeJob, RecordingAlertSink};
pub use server::{BatchProbes, TestServer};

use chrono::Utc;
use scout_batch::identity::{Claims, IdentityClient, JwtIdentityClient};

/// Signs a token for `TEST_SUBJECT` with the given lifetime bounds, in
/// seconds relative to now.
pub fn sign_test_token(secret: &str, iat_offset: i64, exp_offset: i64) -> String {
    let now = Utc::now().timestamp();
    let client = JwtIdentityClient::new(secret.as_bytes(), None, 0);
    client
        .sign(&Claims {
            sub: TEST_SUBJECT.to_string(),
            iat: now + iat_offset,
            exp: now + exp_offset,
            iss: None,
        })
        .expect("Failed to sign test token")
}
