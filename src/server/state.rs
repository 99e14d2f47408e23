use axum::extract::FromRef;

use crate::background_jobs::SchedulerHandle;
use crate::identity::IdentityClient;
use crate::recovery::RecoveryBoundary;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedIdentityClient = Arc<dyn IdentityClient>;

/// State of the caller-facing API server.
#[derive(Clone)]
pub struct ApiState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub identity: GuardedIdentityClient,
    pub boundary: RecoveryBoundary,
}

/// State of the batch server's operational endpoints.
#[derive(Clone)]
pub struct BatchState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub scheduler_handle: SchedulerHandle,
    pub boundary: RecoveryBoundary,
}

impl ApiState {
    pub fn new(
        config: ServerConfig,
        identity: GuardedIdentityClient,
        boundary: RecoveryBoundary,
    ) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            identity,
            boundary,
        }
    }
}

impl BatchState {
    pub fn new(
        config: ServerConfig,
        scheduler_handle: SchedulerHandle,
        boundary: RecoveryBoundary,
    ) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            scheduler_handle,
            boundary,
        }
    }
}

impl FromRef<ApiState> for ServerConfig {
    fn from_ref(input: &ApiState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ApiState> for GuardedIdentityClient {
    fn from_ref(input: &ApiState) -> Self {
        input.identity.clone()
    }
}

impl FromRef<ApiState> for RecoveryBoundary {
    fn from_ref(input: &ApiState) -> Self {
        input.boundary.clone()
    }
}

impl FromRef<BatchState> for ServerConfig {
    fn from_ref(input: &BatchState) -> Self {
        input.config.clone()
    }
}

impl FromRef<BatchState> for SchedulerHandle {
    fn from_ref(input: &BatchState) -> Self {
        input.scheduler_handle.clone()
    }
}

impl FromRef<BatchState> for RecoveryBoundary {
    fn from_ref(input: &BatchState) -> Self {
        input.boundary.clone()
    }
}
