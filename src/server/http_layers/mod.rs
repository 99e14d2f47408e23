mod recovery;
mod requests_logging;

pub use recovery::recover_panics;
pub use requests_logging::{log_requests, RequestsLoggingLevel};
