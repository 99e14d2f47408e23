//! Scout batch server library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod alerts;
pub mod background_jobs;
pub mod config;
pub mod failure;
pub mod identity;
pub mod recovery;
pub mod scout_client;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use alerts::{AlertDelivery, AlertMessage, AlertSink, Alerter, Severity, SlackAlertSink};
pub use failure::{classify, Failure};
pub use recovery::{RecoveryBoundary, ServiceKind, StackFrameFilter};
pub use server::{run_api_server, run_batch_server, RequestsLoggingLevel};
pub use storage::{SqliteStorage, Storage, StorageTransaction};
