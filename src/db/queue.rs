//! Queue operations: hash-unique append, atomic batch claim.

use sqlx::{Sqlite, SqliteExecutor, Transaction};

use crate::error::Result;
use crate::model::{NewQueueEntry, QueueEntry};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

/// Appender that batches queue inserts in one transaction.
///
/// Nothing is durable until [`QueueTx::commit`]. Dropping the handle rolls
/// the batch back.
pub struct QueueTx {
    tx: Transaction<'static, Sqlite>,
    appended: u64,
}

impl QueueTx {
    /// Append an entry. Returns `false` if the hash is already queued,
    /// including by an earlier append in this transaction.
    pub async fn append(&mut self, entry: &NewQueueEntry) -> Result<bool> {
        let appended = append_on(&mut *self.tx, entry).await?;
        if appended {
            self.appended += 1;
        }
        Ok(appended)
    }

    pub async fn contains_hash(&mut self, hash: &str) -> Result<bool> {
        contains_hash_on(&mut *self.tx, hash).await
    }

    /// Rows appended so far in this transaction.
    pub fn appended(&self) -> u64 {
        self.appended
    }

    pub async fn commit(self) -> Result<u64> {
        self.tx.commit().await?;
        Ok(self.appended)
    }
}

impl super::Db {
    /// Start a batched append.
    pub async fn begin_append(&self) -> Result<QueueTx> {
        Ok(QueueTx {
            tx: self.pool.begin().await?,
            appended: 0,
        })
    }

    /// Append a single entry in its own transaction. Returns `false` if the
    /// hash is already queued.
    pub async fn append(&self, entry: &NewQueueEntry) -> Result<bool> {
        append_on(&self.pool, entry).await
    }

    /// Whether a live entry with this hash exists.
    pub async fn contains_hash(&self, hash: &str) -> Result<bool> {
        contains_hash_on(&self.pool, hash).await
    }

    /// Remove and return up to `max_items` entries, lowest ids first.
    ///
    /// Selection and removal are one statement, so an entry is handed out at
    /// most once. An empty result means the queue is exhausted.
    pub async fn claim_batch(&self, max_items: usize) -> Result<Vec<QueueEntry>> {
        if max_items == 0 {
            return Ok(Vec::new());
        }

        let rows: Vec<QueueRow> = sqlx::query_as(
            "DELETE FROM queue
             WHERE id IN (SELECT id FROM queue ORDER BY id ASC LIMIT ?1)
             RETURNING id, hash, data",
        )
        .bind(max_items as i64)
        .fetch_all(&self.pool)
        .await?;

        // RETURNING order is unspecified.
        let mut entries: Vec<QueueEntry> = rows.into_iter().map(QueueEntry::from).collect();
        entries.sort_by_key(|e| e.id);

        metrics::queue_claimed().add(
            entries.len() as u64,
            &[KeyValue::new(
                "result",
                if entries.is_empty() { "empty" } else { "batch" },
            )],
        );

        Ok(entries)
    }

    /// Number of live entries.
    pub async fn queue_len(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// All live entries in id order, without claiming them.
    pub async fn queued_entries(&self) -> Result<Vec<QueueEntry>> {
        let rows: Vec<QueueRow> = sqlx::query_as("SELECT id, hash, data FROM queue ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(QueueEntry::from).collect())
    }
}

// ---------------------------------------------------------------------------
// Inner functions, generic over the executor so they run against both the
// pool (auto-commit) and an open transaction.
// ---------------------------------------------------------------------------

async fn append_on<'e, E: SqliteExecutor<'e>>(exec: E, entry: &NewQueueEntry) -> Result<bool> {
    let rows_affected = sqlx::query(
        "INSERT INTO queue (hash, data) VALUES (?1, ?2)
         ON CONFLICT (hash) DO NOTHING",
    )
    .bind(&entry.hash)
    .bind(&entry.payload)
    .execute(exec)
    .await?
    .rows_affected();

    Ok(rows_affected == 1)
}

async fn contains_hash_on<'e, E: SqliteExecutor<'e>>(exec: E, hash: &str) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM queue WHERE hash = ?1")
        .bind(hash)
        .fetch_optional(exec)
        .await?;
    Ok(found.is_some())
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct QueueRow {
    id: i64,
    hash: String,
    data: String,
}

impl From<QueueRow> for QueueEntry {
    fn from(row: QueueRow) -> Self {
        QueueEntry {
            id: row.id,
            hash: row.hash,
            payload: row.data,
        }
    }
}
