//! Operational alerts sent to a human channel.

mod slack;

pub use slack::SlackAlertSink;

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Environment;
use crate::server::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Panic,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Panic => "panic",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One alert. Built by the failure path, consumed once by a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub severity: Severity,
    /// "batch" or "api".
    pub service_name: String,
    /// Ordered identifiers such as job name or request path.
    pub context: Vec<(String, String)>,
    pub error_code: u16,
    pub human_message: String,
    pub raw_error_text: String,
}

impl AlertMessage {
    pub fn new(severity: Severity, service_name: impl Into<String>) -> Self {
        Self {
            severity,
            service_name: service_name.into(),
            context: Vec::new(),
            error_code: 0,
            human_message: String::new(),
            raw_error_text: String::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.push((key.into(), value.into()));
        self
    }

    pub fn with_failure(mut self, code: u16, human_message: impl Into<String>) -> Self {
        self.error_code = code;
        self.human_message = human_message.into();
        self
    }

    pub fn with_raw_error(mut self, raw: impl Into<String>) -> Self {
        self.raw_error_text = raw.into();
        self
    }

    /// Plain-text rendering used both for chat delivery and local logs.
    pub fn render(&self) -> String {
        let mut text = format!(
            "[{}] {}: {} {}\n",
            self.severity.as_str().to_uppercase(),
            self.service_name,
            self.error_code,
            self.human_message
        );
        for (key, value) in &self.context {
            text.push_str(&format!("{}: {}\n", key, value));
        }
        if !self.raw_error_text.is_empty() {
            text.push_str("```\n");
            text.push_str(self.raw_error_text.trim_end());
            text.push_str("\n```");
        }
        text
    }
}

/// Delivers alerts to a human channel.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, message: &AlertMessage) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDelivery {
    Sent,
    /// Not sent because the environment does not alert.
    Suppressed,
    Failed,
}

impl AlertDelivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertDelivery::Sent => "sent",
            AlertDelivery::Suppressed => "suppressed",
            AlertDelivery::Failed => "failed",
        }
    }
}

/// Applies environment gating in front of an [`AlertSink`].
///
/// Delivery failures are logged and dropped; they never reach the caller.
#[derive(Clone)]
pub struct Alerter {
    environment: Environment,
    sink: Option<Arc<dyn AlertSink>>,
    robot_id: Option<String>,
}

impl Alerter {
    pub fn new(
        environment: Environment,
        sink: Option<Arc<dyn AlertSink>>,
        robot_id: Option<String>,
    ) -> Self {
        Self {
            environment,
            sink,
            robot_id,
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub async fn report(&self, mut message: AlertMessage) -> AlertDelivery {
        if let Some(robot_id) = &self.robot_id {
            message
                .context
                .insert(0, ("robot".to_string(), robot_id.clone()));
        }

        let delivery = self.deliver(&message).await;
        metrics::record_alert(message.severity.as_str(), delivery.as_str());
        delivery
    }

    async fn deliver(&self, message: &AlertMessage) -> AlertDelivery {
        if !self.environment.alerts_enabled() {
            info!(
                "Alert suppressed in {} environment:\n{}",
                self.environment,
                message.render()
            );
            return AlertDelivery::Suppressed;
        }

        let Some(sink) = &self.sink else {
            error!(
                "No alert sink configured, dropping alert:\n{}",
                message.render()
            );
            return AlertDelivery::Failed;
        };

        match sink.send(message).await {
            Ok(()) => AlertDelivery::Sent,
            Err(e) => {
                warn!("Failed to deliver {} alert: {:#}", message.severity, e);
                AlertDelivery::Failed
            }
        }
    }
}
