mod api_routes;
mod batch_routes;
pub mod config;
pub mod error_response;
mod http_layers;
pub mod metrics;
pub mod server;
pub(self) mod session;
pub mod state;

pub use config::ServerConfig;
pub use error_response::{ErrorResponse, ReportedFailure};
pub use http_layers::*;
pub use server::{make_api_app, make_batch_app, run_api_server, run_batch_server};
pub use state::{ApiState, BatchState};
