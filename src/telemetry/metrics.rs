//! Metric instrument factories for varq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"varq"` meter; without a
//! provider they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for varq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("varq")
}

/// Counter: variant draws.
/// Labels: `result` ("appended" | "duplicate").
pub fn variants_generated() -> Counter<u64> {
    meter()
        .u64_counter("varq.variants.generated")
        .with_description("Number of variants drawn by the generator")
        .build()
}

/// Counter: queue entries handed out by `claim_batch`.
/// Labels: `result` ("batch" | "empty").
pub fn queue_claimed() -> Counter<u64> {
    meter()
        .u64_counter("varq.queue.claimed")
        .with_description("Number of queue entries claimed")
        .build()
}

/// Counter: sender outcomes.
/// Labels: `outcome` ("success" | "failure" | "timeout").
pub fn send_outcomes() -> Counter<u64> {
    meter()
        .u64_counter("varq.send.outcomes")
        .with_description("Number of send attempts by outcome")
        .build()
}

/// Histogram: send duration in milliseconds.
/// Labels: `outcome`.
pub fn send_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("varq.send.duration_ms")
        .with_description("Send duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: writer flushes of finished records.
pub fn finished_flushes() -> Counter<u64> {
    meter()
        .u64_counter("varq.finished.flushes")
        .with_description("Number of finished-record batch flushes")
        .build()
}

/// Histogram: finished records written per flush.
pub fn finished_flush_records() -> Histogram<u64> {
    meter()
        .u64_histogram("varq.finished.flush_records")
        .with_description("Finished records written per batch flush")
        .build()
}
