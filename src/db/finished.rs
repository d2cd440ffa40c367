//! Finished-record operations. Append-only; written by the dispatcher writer.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::{FinishedRecord, Outcome};
use crate::telemetry::metrics;

/// Outcome counts across the finished table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinishedSummary {
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
}

impl FinishedSummary {
    pub fn total(&self) -> u64 {
        self.succeeded + self.failed + self.timed_out
    }
}

impl super::Db {
    /// Insert a batch of finished records in one transaction.
    pub async fn record_finished(&self, records: &[FinishedRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            let data = serde_json::to_string(&record.outcome)?;
            sqlx::query("INSERT INTO finished (id, data, finished_at) VALUES (?1, ?2, ?3)")
                .bind(record.id)
                .bind(data)
                .bind(record.finished_at.to_rfc3339())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        metrics::finished_flushes().add(1, &[]);
        metrics::finished_flush_records().record(records.len() as u64, &[]);
        Ok(records.len() as u64)
    }

    /// Number of finished records.
    pub async fn finished_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM finished")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// All finished records, ordered by originating queue id.
    pub async fn finished_records(&self) -> Result<Vec<FinishedRecord>> {
        let rows: Vec<FinishedRow> =
            sqlx::query_as("SELECT id, data, finished_at FROM finished ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(FinishedRow::try_into_record).collect()
    }

    /// Count finished records by outcome.
    pub async fn finished_summary(&self) -> Result<FinishedSummary> {
        let rows: Vec<(Option<String>, i64)> = sqlx::query_as(
            "SELECT json_extract(data, '$.outcome') AS kind, COUNT(*)
             FROM finished GROUP BY kind",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut summary = FinishedSummary::default();
        for (kind, count) in rows {
            let count = count as u64;
            match kind.as_deref() {
                Some("success") => summary.succeeded += count,
                Some("timeout") => summary.timed_out += count,
                _ => summary.failed += count,
            }
        }
        Ok(summary)
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct FinishedRow {
    id: i64,
    data: String,
    finished_at: String,
}

impl FinishedRow {
    fn try_into_record(self) -> Result<FinishedRecord> {
        let outcome: Outcome = serde_json::from_str(&self.data)?;
        let finished_at = DateTime::parse_from_rfc3339(&self.finished_at)
            .map_err(|e| Error::Other(format!("invalid finished_at for {}: {e}", self.id)))?
            .with_timezone(&Utc);

        Ok(FinishedRecord {
            id: self.id,
            outcome,
            finished_at,
        })
    }
}
