//! Queue dispatch: drain the queue through a worker pool into the finished
//! table.
//!
//! Three roles run as separate tasks:
//!
//! ```text
//!  reader ──(bounded work channel)──▶ workers × N ──(results channel)──▶ writer
//!  claim_batch                         Sender::send                     record_finished
//! ```
//!
//! The bounded work channel is the only backpressure point. When the queue
//! is exhausted the reader sends a single [`Work::Done`]; each worker that
//! receives it sends it back into the channel and exits, so every worker
//! sees it exactly once. Shutdown is strictly ordered: reader, then all
//! workers, then a stop message to the writer, then the writer, then the
//! storage pool is closed.

mod roles;

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{Instrument, error, info};

use crate::db::Db;
use crate::error::{Error, Result};
use crate::model::{FinishedRecord, Outcome, QueueEntry};
use crate::sender::Sender;
use crate::telemetry::dispatch::{record_run_totals, start_role_span, start_run_span};

/// Configuration for a dispatch run.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Size of the worker pool. At least one worker always runs.
    pub workers: usize,
    /// Entries claimed per `claim_batch` call.
    pub claim_batch: usize,
    /// Work channel capacity is `workers * work_capacity_per_worker`.
    pub work_capacity_per_worker: usize,
    /// Finished records buffered before the writer flushes.
    pub flush_every: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            claim_batch: 100,
            work_capacity_per_worker: 10,
            flush_every: 10,
        }
    }
}

/// Totals for one dispatch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Entries removed from the queue.
    pub claimed: u64,
    /// Sender calls made by the workers.
    pub sent: u64,
    /// Finished records persisted.
    pub recorded: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
}

impl DispatchReport {
    fn tally(&mut self, outcome: &Outcome) {
        self.recorded += 1;
        match outcome {
            Outcome::Success { .. } => self.succeeded += 1,
            Outcome::Failure { .. } => self.failed += 1,
            Outcome::Timeout => self.timed_out += 1,
        }
    }
}

/// Message on the work channel.
#[derive(Debug)]
pub(crate) enum Work {
    Item(QueueEntry),
    /// The queue is exhausted. Relayed from worker to worker.
    Done,
}

/// Message on the results channel.
#[derive(Debug)]
pub(crate) enum Finished {
    Record(FinishedRecord),
    Stop,
}

/// Drains the queue through a [`Sender`].
pub struct Dispatcher {
    db: Db,
    sender: Arc<dyn Sender>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(db: Db, sender: Arc<dyn Sender>, config: DispatchConfig) -> Self {
        Self { db, sender, config }
    }

    /// Run until the queue is exhausted and every outcome is persisted.
    ///
    /// Closes the database pool before returning. A storage error in the
    /// reader or writer does not cut the shutdown sequence short; it is
    /// returned once every task has exited.
    pub async fn run(self) -> Result<DispatchReport> {
        let workers = self.config.workers.max(1);
        let span = start_run_span(workers);

        async move {
            let capacity = workers * self.config.work_capacity_per_worker.max(1);
            let claim_batch = self.config.claim_batch.max(1);
            let flush_every = self.config.flush_every.max(1);

            info!(workers, capacity, claim_batch, flush_every, "dispatch started");

            let (work_tx, work_rx) = mpsc::channel::<Work>(capacity);
            let work_rx = Arc::new(Mutex::new(work_rx));
            let (result_tx, result_rx) = mpsc::unbounded_channel::<Finished>();

            let writer = tokio::spawn(
                roles::write_loop(self.db.clone(), result_rx, flush_every)
                    .instrument(start_role_span("writer", 0)),
            );

            let worker_handles: Vec<_> = (0..workers)
                .map(|index| {
                    tokio::spawn(
                        roles::work_loop(
                            index,
                            Arc::clone(&self.sender),
                            Arc::clone(&work_rx),
                            work_tx.clone(),
                            result_tx.clone(),
                        )
                        .instrument(start_role_span("worker", index)),
                    )
                })
                .collect();

            let reader = tokio::spawn(
                roles::read_loop(self.db.clone(), work_tx, claim_batch)
                    .instrument(start_role_span("reader", 0)),
            );

            let mut report = DispatchReport::default();
            let mut first_error: Option<Error> = None;

            // 1. Reader finishes after sending Done.
            match reader.await {
                Ok(Ok(claimed)) => report.claimed = claimed,
                Ok(Err(e)) => first_error = Some(e),
                Err(e) => first_error = Some(Error::Other(format!("reader task failed: {e}"))),
            }

            // 2. Workers drain the channel and relay Done.
            for handle in worker_handles {
                match handle.await {
                    Ok(sent) => report.sent += sent,
                    Err(e) => {
                        error!(error = %e, "worker task failed");
                        first_error
                            .get_or_insert_with(|| Error::Other(format!("worker task failed: {e}")));
                    }
                }
            }

            // 3. Stop the writer and wait for its final flush.
            if result_tx.send(Finished::Stop).is_err() {
                error!("writer exited before stop");
            }
            drop(result_tx);
            match writer.await {
                Ok(Ok(written)) => {
                    report.recorded = written.recorded;
                    report.succeeded = written.succeeded;
                    report.failed = written.failed;
                    report.timed_out = written.timed_out;
                }
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert_with(|| Error::Other(format!("writer task failed: {e}")));
                }
            }

            // 4. Release storage.
            self.db.close().await;

            record_run_totals(&tracing::Span::current(), report.claimed, report.recorded);
            info!(
                claimed = report.claimed,
                sent = report.sent,
                recorded = report.recorded,
                succeeded = report.succeeded,
                failed = report.failed,
                timed_out = report.timed_out,
                "dispatch finished"
            );

            match first_error {
                Some(e) => Err(e),
                None => Ok(report),
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Ok200;

    #[async_trait]
    impl Sender for Ok200 {
        async fn send(&self, _payload: &str) -> Outcome {
            Outcome::Success {
                status: 200,
                body: String::new(),
            }
        }
    }

    async fn seeded(count: i64) -> Db {
        let db = Db::in_memory().await.unwrap();
        db.migrate().await.unwrap();
        let mut tx = db.begin_append().await.unwrap();
        for n in 0..count {
            let mut variant = crate::model::Variant::new();
            variant.set("n", n.into());
            tx.append(&crate::model::NewQueueEntry::from_variant(&variant).unwrap())
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();
        db
    }

    #[test]
    fn report_tallies_by_outcome() {
        let mut report = DispatchReport::default();
        report.tally(&Outcome::Timeout);
        report.tally(&Outcome::Failure {
            status: None,
            body: String::new(),
        });
        report.tally(&Outcome::Success {
            status: 200,
            body: String::new(),
        });
        assert_eq!(report.recorded, 3);
        assert_eq!((report.succeeded, report.failed, report.timed_out), (1, 1, 1));
    }

    #[tokio::test]
    async fn reader_error_still_shuts_down() {
        // No migrations: the first claim fails.
        let db = Db::in_memory().await.unwrap();
        let result = Dispatcher::new(db, Arc::new(Ok200), DispatchConfig::default())
            .run()
            .await;
        assert!(matches!(result, Err(Error::Storage(_))));
    }

    #[tokio::test]
    async fn writer_error_is_reported_after_drain() {
        let db = seeded(15).await;
        sqlx::query("DROP TABLE finished")
            .execute(db.pool())
            .await
            .unwrap();

        let result = Dispatcher::new(db, Arc::new(Ok200), DispatchConfig::default())
            .run()
            .await;
        assert!(matches!(result, Err(Error::Storage(_))));
    }

    #[tokio::test]
    async fn in_memory_run_drains_queue() {
        let db = seeded(42).await;
        let report = Dispatcher::new(
            db,
            Arc::new(Ok200),
            DispatchConfig {
                workers: 4,
                ..DispatchConfig::default()
            },
        )
        .run()
        .await
        .unwrap();

        assert_eq!(report.claimed, 42);
        assert_eq!(report.sent, 42);
        assert_eq!(report.succeeded, 42);
    }
}
