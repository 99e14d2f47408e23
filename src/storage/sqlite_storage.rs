use super::schema::STORAGE_VERSIONED_SCHEMAS;
use super::versioned_schema::BASE_DB_VERSION;
use super::{Storage, StorageError, StorageTransaction};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::types::{ToSql, Value};
use rusqlite::{Connection, ErrorCode};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Storage backed by a single SQLite connection.
///
/// Transactions are serialized: the connection lock is held from `begin`
/// until commit or rollback.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let mut conn = Connection::open(path).context("Failed to open scout database")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        if is_new_db {
            info!("Creating new scout database at {:?}", path);
            Self::create_latest(&conn)?;
        } else {
            Self::validate_or_migrate(&mut conn)?;
        }

        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::create_latest(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn create_latest(conn: &Connection) -> Result<()> {
        STORAGE_VERSIONED_SCHEMAS
            .last()
            .context("No storage schema defined")?
            .create(conn)
    }

    fn validate_or_migrate(conn: &mut Connection) -> Result<()> {
        let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        let db_version = raw_version - BASE_DB_VERSION as i64;

        if db_version < 1 {
            anyhow::bail!(
                "Scout database version {} is invalid (expected >= 1)",
                db_version
            );
        }

        let schema = STORAGE_VERSIONED_SCHEMAS
            .iter()
            .find(|s| s.version == db_version as usize)
            .with_context(|| format!("Unknown scout database version {}", db_version))?;
        schema.validate(conn).with_context(|| {
            format!(
                "Scout database schema validation failed for version {}",
                db_version
            )
        })?;

        let pending: Vec<_> = STORAGE_VERSIONED_SCHEMAS
            .iter()
            .filter(|s| s.version > db_version as usize)
            .collect();
        let Some(latest) = pending.last() else {
            return Ok(());
        };

        info!(
            "Migrating scout database from version {} to {}",
            db_version, latest.version
        );
        let tx = conn.transaction()?;
        for schema in &pending {
            if let Some(migration_fn) = schema.migration {
                migration_fn(&tx).with_context(|| {
                    format!("Failed to run migration to version {}", schema.version)
                })?;
            }
        }
        tx.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest.version),
            [],
        )?;
        tx.commit()?;
        Ok(())
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn begin(&self) -> Result<Box<dyn StorageTransaction>, StorageError> {
        let conn = self.conn.clone().lock_owned().await;
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(map_begin_error)?;
        Ok(Box::new(SqliteTransaction { conn: Some(conn) }))
    }
}

fn map_begin_error(err: rusqlite::Error) -> StorageError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy)
        | Some(ErrorCode::DatabaseLocked)
        | Some(ErrorCode::CannotOpen)
        | Some(ErrorCode::ReadOnly) => StorageError::Unavailable(err.to_string()),
        _ => StorageError::Sqlite(err),
    }
}

struct SqliteTransaction {
    conn: Option<OwnedMutexGuard<Connection>>,
}

impl SqliteTransaction {
    fn conn(&mut self) -> Result<&mut Connection, StorageError> {
        self.conn.as_deref_mut().ok_or(StorageError::Finished)
    }

    fn finish(&mut self, statement: &str) -> Result<(), StorageError> {
        let conn = self.conn.take().ok_or(StorageError::Finished)?;
        conn.execute_batch(statement)?;
        Ok(())
    }
}

impl StorageTransaction for SqliteTransaction {
    fn execute(&mut self, sql: &str, params: &[&dyn ToSql]) -> Result<usize, StorageError> {
        Ok(self.conn()?.execute(sql, params)?)
    }

    fn query(
        &mut self,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<Vec<Vec<Value>>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let column_count = stmt.column_count();
        let rows = stmt
            .query_map(params, |row| {
                (0..column_count)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        let result = self.finish("COMMIT");
        if result.is_err() {
            // A failed COMMIT can leave the transaction open.
            if let Some(conn) = self.conn.take() {
                let _ = conn.execute_batch("ROLLBACK");
            }
        }
        result
    }

    fn rollback(mut self: Box<Self>) -> Result<(), StorageError> {
        self.finish("ROLLBACK")
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(err) = conn.execute_batch("ROLLBACK") {
                warn!("Failed to roll back abandoned transaction: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;
    use tempfile::TempDir;

    fn count_entries(storage: &SqliteStorage) -> i64 {
        let conn = storage.conn.try_lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM scout_entries", [], |row| row.get(0))
            .unwrap()
    }

    fn insert_sql() -> &'static str {
        "INSERT INTO scout_entries (provider, external_id, payload, received_at, ingested_at) \
         VALUES (?1, ?2, '{}', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')"
    }

    #[tokio::test]
    async fn commit_persists_changes() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut tx = storage.begin().await.unwrap();
        tx.execute(insert_sql(), params!["bizreach", "e-1"]).unwrap();
        tx.commit().unwrap();

        assert_eq!(count_entries(&storage), 1);
    }

    #[tokio::test]
    async fn rollback_discards_changes() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut tx = storage.begin().await.unwrap();
        tx.execute(insert_sql(), params!["bizreach", "e-1"]).unwrap();
        tx.rollback().unwrap();

        assert_eq!(count_entries(&storage), 0);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back_and_releases_connection() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        {
            let mut tx = storage.begin().await.unwrap();
            tx.execute(insert_sql(), params!["bizreach", "e-1"]).unwrap();
        }

        assert_eq!(count_entries(&storage), 0);
        let tx = storage.begin().await.unwrap();
        tx.rollback().unwrap();
    }

    #[tokio::test]
    async fn query_returns_rows_as_values() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut tx = storage.begin().await.unwrap();
        tx.execute(insert_sql(), params!["bizreach", "e-1"]).unwrap();
        tx.execute(insert_sql(), params!["bizreach", "e-2"]).unwrap();

        let rows = tx
            .query(
                "SELECT external_id FROM scout_entries WHERE provider = ?1 ORDER BY external_id",
                params!["bizreach"],
            )
            .unwrap();
        assert_eq!(
            rows,
            vec![
                vec![Value::Text("e-1".to_string())],
                vec![Value::Text("e-2".to_string())]
            ]
        );
        tx.rollback().unwrap();
    }

    #[tokio::test]
    async fn duplicate_entry_violates_unique_constraint() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut tx = storage.begin().await.unwrap();
        tx.execute(insert_sql(), params!["bizreach", "e-1"]).unwrap();
        let result = tx.execute(insert_sql(), params!["bizreach", "e-1"]);
        assert!(matches!(result, Err(StorageError::Sqlite(_))));
        tx.rollback().unwrap();
    }

    #[test]
    fn reopening_validates_existing_schema() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("scout.db");

        drop(SqliteStorage::open(&db_path).unwrap());
        assert!(SqliteStorage::open(&db_path).is_ok());
    }

    #[test]
    fn rejects_database_without_version() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("scout.db");
        Connection::open(&db_path)
            .unwrap()
            .execute_batch("CREATE TABLE other (id INTEGER);")
            .unwrap();

        let err = SqliteStorage::open(&db_path).err().unwrap();
        assert!(err.to_string().contains("invalid"));
    }
}
