use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use super::{DispatchReport, Finished, Work};
use crate::db::Db;
use crate::error::{Error, Result};
use crate::model::FinishedRecord;
use crate::sender::Sender;

/// Claim batches until the queue is empty, then send [`Work::Done`].
///
/// Done is sent on every exit path, including a storage error, so the
/// workers always terminate. Returns the number of entries claimed.
pub(super) async fn read_loop(db: Db, work_tx: mpsc::Sender<Work>, batch: usize) -> Result<u64> {
    let mut claimed = 0u64;

    let result = 'claim: loop {
        let entries = match db.claim_batch(batch).await {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, claimed, "claim failed, stopping reader");
                break Err(e);
            }
        };

        if entries.is_empty() {
            break Ok(claimed);
        }

        claimed += entries.len() as u64;
        debug!(batch = entries.len(), claimed, "claimed batch");

        for entry in entries {
            if work_tx.send(Work::Item(entry)).await.is_err() {
                break 'claim Err(Error::Other("all workers exited early".to_string()));
            }
        }
    };

    if work_tx.send(Work::Done).await.is_err() {
        warn!("no worker left to receive done");
    }
    info!(claimed, "reader finished");

    result
}

/// Send each work item and forward the outcome to the writer.
///
/// On [`Work::Done`] the marker goes back into the channel for the next
/// worker. Returns the number of items sent.
pub(super) async fn work_loop(
    index: usize,
    sender: Arc<dyn Sender>,
    work_rx: Arc<Mutex<mpsc::Receiver<Work>>>,
    work_tx: mpsc::Sender<Work>,
    result_tx: mpsc::UnboundedSender<Finished>,
) -> u64 {
    let mut sent = 0u64;

    loop {
        let next = work_rx.lock().await.recv().await;

        match next {
            Some(Work::Item(entry)) => {
                let outcome = sender.send(&entry.payload).await;
                sent += 1;
                debug!(id = entry.id, outcome = outcome.label(), "variant sent");

                if result_tx
                    .send(Finished::Record(FinishedRecord::new(entry.id, outcome)))
                    .is_err()
                {
                    warn!(id = entry.id, "writer gone, outcome dropped");
                }
            }
            Some(Work::Done) => {
                if work_tx.send(Work::Done).await.is_err() {
                    debug!("work channel closed while relaying done");
                }
                break;
            }
            None => break,
        }
    }

    debug!(worker = index, sent, "worker finished");
    sent
}

/// Buffer finished records and persist them in batches of `flush_every`.
///
/// A failed flush is logged and its records dropped; the writer keeps
/// consuming so the pipeline can drain, and the first error is returned
/// after [`Finished::Stop`].
pub(super) async fn write_loop(
    db: Db,
    mut result_rx: mpsc::UnboundedReceiver<Finished>,
    flush_every: usize,
) -> Result<DispatchReport> {
    let mut buffer: Vec<FinishedRecord> = Vec::with_capacity(flush_every);
    let mut report = DispatchReport::default();
    let mut first_error: Option<Error> = None;

    while let Some(message) = result_rx.recv().await {
        match message {
            Finished::Record(record) => {
                buffer.push(record);
                if buffer.len() >= flush_every {
                    flush(&db, &mut buffer, &mut report, &mut first_error).await;
                }
            }
            Finished::Stop => break,
        }
    }

    flush(&db, &mut buffer, &mut report, &mut first_error).await;
    info!(recorded = report.recorded, "writer finished");

    match first_error {
        Some(e) => Err(e),
        None => Ok(report),
    }
}

async fn flush(
    db: &Db,
    buffer: &mut Vec<FinishedRecord>,
    report: &mut DispatchReport,
    first_error: &mut Option<Error>,
) {
    if buffer.is_empty() {
        return;
    }

    match db.record_finished(buffer).await {
        Ok(written) => {
            for record in buffer.iter() {
                report.tally(&record.outcome);
            }
            debug!(written, "flushed finished records");
        }
        Err(e) => {
            error!(error = %e, dropped = buffer.len(), "failed to flush finished records");
            first_error.get_or_insert(e);
        }
    }

    buffer.clear();
}
