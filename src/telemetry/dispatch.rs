//! Dispatch span helpers.
//!
//! One span per dispatch run, one child span per dispatcher role.

use tracing::Span;

/// Start a span for a whole dispatch run.
///
/// The `dispatch.claimed` and `dispatch.recorded` fields are declared empty
/// and filled in by [`record_run_totals`].
pub fn start_run_span(workers: usize) -> Span {
    tracing::info_span!(
        "dispatch.run",
        "dispatch.workers" = workers,
        "dispatch.claimed" = tracing::field::Empty,
        "dispatch.recorded" = tracing::field::Empty,
    )
}

/// Start a span for one dispatcher role ("reader", "worker", "writer").
pub fn start_role_span(role: &'static str, index: usize) -> Span {
    tracing::info_span!("dispatch.role", "dispatch.role" = role, "dispatch.index" = index)
}

pub fn record_run_totals(span: &Span, claimed: u64, recorded: u64) {
    span.record("dispatch.claimed", claimed);
    span.record("dispatch.recorded", recorded);
}
