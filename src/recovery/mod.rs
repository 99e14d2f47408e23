//! Panic containment shared by the API server and the batch scheduler.

mod frames;
mod panic_capture;

pub use frames::StackFrameFilter;
pub use panic_capture::{install_panic_hook, CapturedPanic, CatchPanic};

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::error;

use crate::alerts::{AlertDelivery, AlertMessage, Alerter, Severity};
use crate::failure::Failure;
use crate::server::metrics;

/// Default markers for frames worth showing in a panic alert: job handlers
/// and HTTP route handlers.
pub const DEFAULT_BUSINESS_FRAME_MARKERS: &[&str] = &[
    "scout_batch::background_jobs::jobs",
    "scout_batch::server::api_routes",
    "scout_batch::server::batch_routes",
    "src/background_jobs/jobs/",
    "src/server/api_routes.rs",
    "src/server/batch_routes.rs",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    /// The public API server.
    Api,
    /// The scheduler and its operational endpoints.
    Batch,
}

impl ServiceKind {
    pub fn service_name(&self) -> &'static str {
        match self {
            ServiceKind::Api => "api",
            ServiceKind::Batch => "batch",
        }
    }
}

/// A panic that a boundary recovered from.
#[derive(Debug, Clone)]
pub struct PanicReport {
    pub message: String,
    pub location: Option<String>,
    pub business_frames: Vec<String>,
    pub delivery: AlertDelivery,
}

impl fmt::Display for PanicReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.message)?;
        if let Some(location) = &self.location {
            write!(f, " at {}", location)?;
        }
        Ok(())
    }
}

/// Runs work so that a panic becomes an alert instead of a dead task.
#[derive(Clone)]
pub struct RecoveryBoundary {
    kind: ServiceKind,
    alerter: Alerter,
    filter: Arc<StackFrameFilter>,
}

impl RecoveryBoundary {
    pub fn new(kind: ServiceKind, alerter: Alerter, filter: StackFrameFilter) -> Self {
        install_panic_hook();
        Self {
            kind,
            alerter,
            filter: Arc::new(filter),
        }
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn alerter(&self) -> &Alerter {
        &self.alerter
    }

    /// Drives `future` to completion. On panic the trace is logged, the
    /// business frames are alerted and `Err(PanicReport)` is returned.
    ///
    /// `context` identifies the unit of work in the alert (job name,
    /// request method and path).
    pub async fn run<F, T>(
        &self,
        context: Vec<(String, String)>,
        future: F,
    ) -> Result<T, PanicReport>
    where
        F: Future<Output = T>,
    {
        match CatchPanic::new(future).await {
            Ok(output) => Ok(output),
            Err(captured) => Err(self.recover(context, captured).await),
        }
    }

    async fn recover(&self, context: Vec<(String, String)>, captured: CapturedPanic) -> PanicReport {
        let service = self.kind.service_name();
        let context_text = context
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        error!(
            "Recovered panic in {} [{}]: {} at {}\n{}",
            service,
            context_text,
            captured.message,
            captured.location.as_deref().unwrap_or("<unknown>"),
            captured.backtrace
        );
        metrics::record_recovered_panic(service);

        let business_frames = self.filter.business_frames(&captured.backtrace);

        let mut raw = captured.message.clone();
        if let Some(location) = &captured.location {
            raw.push_str(&format!("\n  at {}", location));
        }
        for frame in &business_frames {
            raw.push('\n');
            raw.push_str(frame);
        }

        let failure = Failure::SERVER_ERROR;
        let mut message = AlertMessage::new(Severity::Panic, service)
            .with_failure(failure.code, failure.message)
            .with_raw_error(raw);
        message.context = context;

        let delivery = self.alerter.report(message).await;

        PanicReport {
            message: captured.message,
            location: captured.location,
            business_frames,
            delivery,
        }
    }
}
