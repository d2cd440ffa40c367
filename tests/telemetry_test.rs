//! Integration tests for telemetry initialization and span helpers.

#[test]
fn local_logging_does_not_export() {
    let config = varq::config::Config::from_lookup(|name| match name {
        "VARQ_DATABASE" => Some("varq.db".to_string()),
        _ => None,
    })
    .unwrap();

    // Only one global subscriber per process; a second init is an error.
    if let Ok(guard) = varq::telemetry::init_telemetry((&config).into()) {
        assert!(!guard.is_exporting());
        guard.flush();
    }
}

#[test]
fn dispatch_run_span_records_totals() {
    let span = varq::telemetry::dispatch::start_run_span(4);
    varq::telemetry::dispatch::record_run_totals(&span, 100, 98);
}

#[test]
fn dispatch_role_spans_create() {
    let _reader = varq::telemetry::dispatch::start_role_span("reader", 0);
    let _worker = varq::telemetry::dispatch::start_role_span("worker", 3);
}

#[test]
fn metrics_record_without_provider() {
    use opentelemetry::KeyValue;

    varq::telemetry::metrics::variants_generated().add(1, &[KeyValue::new("result", "appended")]);
    varq::telemetry::metrics::send_duration_ms().record(12.5, &[KeyValue::new("outcome", "success")]);
    varq::telemetry::metrics::finished_flushes().add(1, &[]);
    varq::telemetry::metrics::finished_flush_records().record(10, &[]);
}
