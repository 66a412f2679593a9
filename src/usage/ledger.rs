use super::types::{CallRecord, CallType, ClientId, decode_timestamp, encode_timestamp};
use crate::error::StorageError;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

type LedgerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Append-only record of charged calls, keyed by client.
///
/// The contract has no update or delete: admission only asks how many
/// calls fall after a cutoff.
pub trait UsageLedger: Send + Sync {
    /// Durably append one call. Call only after the gated operation succeeded.
    fn record<'a>(
        &'a self,
        client: &'a ClientId,
        call_type: CallType,
        timestamp: DateTime<Utc>,
    ) -> LedgerFuture<'a, CallRecord>;

    /// Number of records for `client` with `timestamp > cutoff`.
    fn count_since<'a>(&'a self, client: &'a ClientId, cutoff: DateTime<Utc>)
    -> LedgerFuture<'a, u64>;

    /// Earliest record for `client` with `timestamp > cutoff`, if any.
    fn oldest_since<'a>(
        &'a self,
        client: &'a ClientId,
        cutoff: DateTime<Utc>,
    ) -> LedgerFuture<'a, Option<DateTime<Utc>>>;
}

/// SQLite-backed ledger using an sqlx async pool.
pub struct SqliteUsageLedger {
    pool: SqlitePool,
}

impl SqliteUsageLedger {
    /// Open (or create) the database file and run migrations.
    pub async fn open(db_path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        Self::new(pool).await
    }

    /// Wrap an existing pool and run migrations.
    pub async fn new(pool: SqlitePool) -> Result<Self, StorageError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS api_calls (
                 id        INTEGER PRIMARY KEY,
                 user_id   TEXT NOT NULL,
                 timestamp TEXT NOT NULL,
                 call_type TEXT NOT NULL
             )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_api_calls_user_timestamp
                 ON api_calls(user_id, timestamp)",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Delete every record at or before `cutoff`. Returns the number removed.
    pub async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM api_calls WHERE timestamp <= ?1")
            .bind(encode_timestamp(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Flush and close all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl UsageLedger for SqliteUsageLedger {
    fn record<'a>(
        &'a self,
        client: &'a ClientId,
        call_type: CallType,
        timestamp: DateTime<Utc>,
    ) -> LedgerFuture<'a, CallRecord> {
        Box::pin(async move {
            let result = sqlx::query(
                "INSERT INTO api_calls (user_id, timestamp, call_type) VALUES (?1, ?2, ?3)",
            )
            .bind(client.as_str())
            .bind(encode_timestamp(timestamp))
            .bind(call_type.as_ref())
            .execute(&self.pool)
            .await?;

            Ok(CallRecord {
                id: result.last_insert_rowid(),
                client_id: client.clone(),
                timestamp,
                call_type,
            })
        })
    }

    fn count_since<'a>(
        &'a self,
        client: &'a ClientId,
        cutoff: DateTime<Utc>,
    ) -> LedgerFuture<'a, u64> {
        Box::pin(async move {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM api_calls WHERE user_id = ?1 AND timestamp > ?2",
            )
            .bind(client.as_str())
            .bind(encode_timestamp(cutoff))
            .fetch_one(&self.pool)
            .await?;

            u64::try_from(count)
                .map_err(|_| StorageError::Corrupt(format!("negative call count {count}")))
        })
    }

    fn oldest_since<'a>(
        &'a self,
        client: &'a ClientId,
        cutoff: DateTime<Utc>,
    ) -> LedgerFuture<'a, Option<DateTime<Utc>>> {
        Box::pin(async move {
            let oldest: Option<String> = sqlx::query_scalar(
                "SELECT MIN(timestamp) FROM api_calls WHERE user_id = ?1 AND timestamp > ?2",
            )
            .bind(client.as_str())
            .bind(encode_timestamp(cutoff))
            .fetch_one(&self.pool)
            .await?;

            oldest.as_deref().map(decode_timestamp).transpose()
        })
    }
}
