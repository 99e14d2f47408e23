//! Pulls new candidate entries from every configured scout provider.
//!
//! Per provider, the newest stored `received_at` is the cursor for the next
//! fetch. Entries already stored are ignored, so a re-fetch after a rolled
//! back run is harmless.

use crate::background_jobs::{context::JobContext, job::TransactionalJob};
use crate::scout_client::{ScoutEntry, ScoutService};
use crate::storage::StorageTransaction;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::params;
use rusqlite::types::Value;
use tracing::{debug, info};

pub struct ScoutEntryIngestJob;

#[async_trait]
impl TransactionalJob for ScoutEntryIngestJob {
    async fn run(
        &self,
        tx: &mut dyn StorageTransaction,
        ctx: &JobContext,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut total = 0;
        for service in &ctx.scout_services {
            if ctx.is_cancelled() {
                info!("Entry ingest cancelled before provider {}", service.provider());
                break;
            }
            let inserted = ingest_provider(tx, service.as_ref(), now)
                .await
                .with_context(|| format!("ingesting entries from {}", service.provider()))?;
            total += inserted;
        }
        info!(
            "Ingested {} new entries from {} providers",
            total,
            ctx.scout_services.len()
        );
        Ok(())
    }
}

async fn ingest_provider(
    tx: &mut dyn StorageTransaction,
    service: &dyn ScoutService,
    now: DateTime<Utc>,
) -> Result<usize> {
    let provider = service.provider();
    let since = latest_received_at(tx, provider)?;
    debug!("Fetching entries from {} since {:?}", provider, since);

    let entries = service.fetch_entries(since).await?;
    let mut inserted = 0;
    for entry in &entries {
        inserted += insert_entry(tx, provider, entry, now)?;
    }
    debug!(
        "Provider {} returned {} entries, {} new",
        provider,
        entries.len(),
        inserted
    );
    Ok(inserted)
}

fn latest_received_at(
    tx: &mut dyn StorageTransaction,
    provider: &str,
) -> Result<Option<DateTime<Utc>>> {
    let rows = tx.query(
        "SELECT MAX(received_at) FROM scout_entries WHERE provider = ?1",
        params![provider],
    )?;
    match rows.first().and_then(|row| row.first()) {
        Some(Value::Text(raw)) => {
            let parsed = DateTime::parse_from_rfc3339(raw)
                .with_context(|| format!("invalid received_at {:?} for {}", raw, provider))?;
            Ok(Some(parsed.with_timezone(&Utc)))
        }
        _ => Ok(None),
    }
}

fn insert_entry(
    tx: &mut dyn StorageTransaction,
    provider: &str,
    entry: &ScoutEntry,
    now: DateTime<Utc>,
) -> Result<usize> {
    let changed = tx.execute(
        "INSERT OR IGNORE INTO scout_entries \
         (provider, external_id, payload, received_at, ingested_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            provider,
            entry.external_id,
            entry.payload.to_string(),
            format_timestamp(entry.received_at),
            format_timestamp(now),
        ],
    )?;
    Ok(changed)
}

/// Fixed-width UTC form, so `MAX()` over the text column orders correctly.
fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_jobs::jobs::test_support::{services, FakeScoutService};
    use crate::background_jobs::unit_of_work::run_in_transaction;
    use crate::background_jobs::JobError;
    use crate::storage::{SqliteStorage, Storage};
    use chrono::TimeZone;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn entry(id: &str, hour: u32) -> ScoutEntry {
        ScoutEntry {
            external_id: id.to_string(),
            received_at: Utc.with_ymd_and_hms(2024, 4, 1, hour, 0, 0).unwrap(),
            payload: serde_json::json!({"id": id}),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 0, 0, 0).unwrap()
    }

    async fn stored_ids(storage: &SqliteStorage) -> Vec<String> {
        let mut tx = storage.begin().await.unwrap();
        let rows = tx
            .query(
                "SELECT provider || ':' || external_id FROM scout_entries ORDER BY 1",
                &[],
            )
            .unwrap();
        tx.rollback().unwrap();
        rows.into_iter()
            .map(|row| match &row[0] {
                Value::Text(s) => s.clone(),
                other => panic!("unexpected value {:?}", other),
            })
            .collect()
    }

    #[tokio::test]
    async fn ingests_new_entries_and_advances_cursor() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut bizreach = FakeScoutService::new("bizreach");
        bizreach.entries = vec![entry("a", 1), entry("b", 2)];
        let bizreach = Arc::new(bizreach);
        let ctx = JobContext::new(
            CancellationToken::new(),
            vec![bizreach.clone() as Arc<dyn ScoutService>],
        );

        run_in_transaction(&storage, &ScoutEntryIngestJob, &ctx, now())
            .await
            .unwrap();
        run_in_transaction(&storage, &ScoutEntryIngestJob, &ctx, now())
            .await
            .unwrap();

        assert_eq!(stored_ids(&storage).await, vec!["bizreach:a", "bizreach:b"]);
        let calls = bizreach.fetch_calls.lock().unwrap();
        assert_eq!(calls[0], None);
        assert_eq!(calls[1], Some(entry("b", 2).received_at));
    }

    #[tokio::test]
    async fn provider_failure_rolls_back_every_provider() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut first = FakeScoutService::new("first");
        first.entries = vec![entry("a", 1)];
        let mut second = FakeScoutService::new("second");
        second.fail_with = Some("rate limit exceeded".into());
        let ctx = JobContext::new(CancellationToken::new(), services(vec![first, second]));

        let err = run_in_transaction(&storage, &ScoutEntryIngestJob, &ctx, now())
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::Handler(_)));
        assert_eq!(
            err.to_string(),
            "ingesting entries from second: rate limit exceeded"
        );
        assert!(stored_ids(&storage).await.is_empty());
    }

    #[tokio::test]
    async fn cancelled_context_skips_providers() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut provider = FakeScoutService::new("bizreach");
        provider.entries = vec![entry("a", 1)];
        let token = CancellationToken::new();
        token.cancel();
        let ctx = JobContext::new(token, services(vec![provider]));

        run_in_transaction(&storage, &ScoutEntryIngestJob, &ctx, now())
            .await
            .unwrap();

        assert!(stored_ids(&storage).await.is_empty());
    }
}
