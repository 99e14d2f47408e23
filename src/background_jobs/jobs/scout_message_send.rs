//! Asks every scout provider to deliver its pending scout messages.

use crate::background_jobs::{context::JobContext, job::DirectJob};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

pub struct ScoutMessageSendJob;

#[async_trait]
impl DirectJob for ScoutMessageSendJob {
    /// Every provider is attempted. The first failure is returned after all
    /// providers had their turn.
    async fn run(&self, ctx: &JobContext, now: DateTime<Utc>) -> Result<()> {
        let mut sent = 0;
        let mut failed = 0;
        let mut first_error = None;

        for service in &ctx.scout_services {
            if ctx.is_cancelled() {
                info!("Scout send cancelled before provider {}", service.provider());
                break;
            }
            match service
                .send_pending_scouts(now)
                .await
                .with_context(|| format!("sending scouts via {}", service.provider()))
            {
                Ok(count) => sent += count,
                Err(e) => {
                    warn!("{:#}", e);
                    failed += 1;
                    first_error.get_or_insert(e);
                }
            }
        }

        info!(
            "Sent {} scouts, {} of {} providers failed",
            sent,
            failed,
            ctx.scout_services.len()
        );
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_jobs::jobs::test_support::{services, FakeScoutService};
    use crate::background_jobs::unit_of_work::run_direct;
    use chrono::TimeZone;
    use tokio_util::sync::CancellationToken;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn sends_through_every_provider() {
        let mut a = FakeScoutService::new("a");
        a.sent = 2;
        let mut b = FakeScoutService::new("b");
        b.sent = 1;
        let ctx = JobContext::new(CancellationToken::new(), services(vec![a, b]));

        run_direct(&ScoutMessageSendJob, &ctx, now()).await.unwrap();
    }

    #[tokio::test]
    async fn failure_is_reported_after_remaining_providers() {
        let mut broken = FakeScoutService::new("broken");
        broken.fail_with = Some("quota exhausted".into());
        let healthy = FakeScoutService::new("healthy");
        let ctx = JobContext::new(CancellationToken::new(), services(vec![broken, healthy]));

        let err = run_direct(&ScoutMessageSendJob, &ctx, now())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "sending scouts via broken: quota exhausted");
    }
}
