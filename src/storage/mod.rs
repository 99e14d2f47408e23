//! Shared storage used by transactional jobs.

mod schema;
mod sqlite_storage;
mod versioned_schema;

pub use schema::STORAGE_VERSIONED_SCHEMAS;
pub use sqlite_storage::SqliteStorage;
pub use versioned_schema::{Column, SqlType, Table, VersionedSchema, BASE_DB_VERSION};

use async_trait::async_trait;
use rusqlite::types::{ToSql, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("transaction already finished")]
    Finished,
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Entry point for opening transactions on the shared storage.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StorageTransaction>, StorageError>;
}

/// A transaction-scoped storage handle.
///
/// Exactly one of `commit` / `rollback` is expected per transaction.
pub trait StorageTransaction: Send {
    fn execute(&mut self, sql: &str, params: &[&dyn ToSql]) -> Result<usize, StorageError>;

    fn query(&mut self, sql: &str, params: &[&dyn ToSql])
        -> Result<Vec<Vec<Value>>, StorageError>;

    fn commit(self: Box<Self>) -> Result<(), StorageError>;

    fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}
