use crate::scout_client::ScoutService;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
///
/// Storage is not part of the context: transactional jobs receive their
/// transaction handle directly.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for shutdown requests.
    pub cancellation_token: CancellationToken,

    /// Configured scout providers, in configuration order.
    pub scout_services: Vec<Arc<dyn ScoutService>>,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        scout_services: Vec<Arc<dyn ScoutService>>,
    ) -> Self {
        Self {
            cancellation_token,
            scout_services,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
