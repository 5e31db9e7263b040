//! Telemetry module tests.

use batch_orchestrator::telemetry::metrics::{
    ACTIVE_WORKERS, BATCHES_FAILED, BATCHES_OK, BATCH_LATENCY_MS, ITEMS_COMPLETED, ITEMS_FAILED,
    QUEUE_DEPTH, SCALE_UPS,
};
use batch_orchestrator::telemetry::{
    record_batch, record_queue_depth, record_scale_event, BatchSpan, LogConfig, LogFormat,
    MetricsStore, SpanExt,
};
use batch_orchestrator::scheduler::{BatchId, WorkerId};
use std::path::PathBuf;

// =============================================================================
// LogConfig Tests
// =============================================================================

#[test]
fn log_config_default_is_json() {
    let config = LogConfig::default();
    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, "info");
    assert!(config.output_path.is_none());
}

#[test]
fn log_config_with_output_path() {
    let config = LogConfig {
        format: LogFormat::Pretty,
        level: "batch_orchestrator=debug".to_string(),
        output_path: Some(PathBuf::from("/tmp/orchestrator.log")),
    };
    assert_eq!(config.format, LogFormat::Pretty);
    assert_eq!(config.output_path, Some(PathBuf::from("/tmp/orchestrator.log")));
}

// =============================================================================
// Span Tests
// =============================================================================

#[test]
fn batch_span_records_results_without_subscriber() {
    let span = BatchSpan::new(BatchId(7), WorkerId(2), 4);
    let ok: Result<(), String> = Ok(());
    let err: Result<(), String> = Err("boom".to_string());
    span.record_result(&ok);
    span.record_result(&err);
}

// =============================================================================
// Metrics Tests
// =============================================================================

#[test]
fn batch_metrics_split_by_outcome() {
    let store = MetricsStore::new();
    record_batch(&store, 4, 12, 4, 0);
    record_batch(&store, 2, 30, 0, 2);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.counter(BATCHES_OK), 1);
    assert_eq!(snapshot.counter(BATCHES_FAILED), 1);
    assert_eq!(snapshot.counter(ITEMS_COMPLETED), 4);
    assert_eq!(snapshot.counter(ITEMS_FAILED), 2);

    let latency = &snapshot.histograms[BATCH_LATENCY_MS];
    assert_eq!(latency.count, 2);
    assert_eq!(latency.mean(), 21.0);
}

#[test]
fn gauges_keep_latest_value() {
    let store = MetricsStore::new();
    record_queue_depth(&store, 9);
    record_queue_depth(&store, 3);
    record_scale_event(&store, true, 2);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.gauge(QUEUE_DEPTH), Some(3.0));
    assert_eq!(snapshot.gauge(ACTIVE_WORKERS), Some(2.0));
    assert_eq!(snapshot.counter(SCALE_UPS), 1);
}
