//! Metrics facade for the orchestrator.
//!
//! Each helper emits through the `metrics` crate (a no-op until a recorder
//! is installed) and mirrors the value into the given [`MetricsStore`].

use super::store::MetricsStore;

pub const SUBMISSIONS_ACCEPTED: &str = "orchestrator_submissions_accepted_total";
pub const SUBMISSIONS_REJECTED: &str = "orchestrator_submissions_rejected_total";
pub const QUEUE_DEPTH: &str = "orchestrator_queue_depth";
pub const BATCHES_OK: &str = "orchestrator_batches_ok_total";
pub const BATCHES_FAILED: &str = "orchestrator_batches_failed_total";
pub const BATCH_SIZE: &str = "orchestrator_batch_size";
pub const BATCH_LATENCY_MS: &str = "orchestrator_batch_latency_ms";
pub const ITEMS_COMPLETED: &str = "orchestrator_items_completed_total";
pub const ITEMS_FAILED: &str = "orchestrator_items_failed_total";
pub const SCALE_UPS: &str = "orchestrator_scale_up_total";
pub const SCALE_DOWNS: &str = "orchestrator_scale_down_total";
pub const ACTIVE_WORKERS: &str = "orchestrator_active_workers";
pub const BUSY_WORKERS: &str = "orchestrator_busy_workers";
pub const SINK_FAILURES: &str = "orchestrator_sink_failures_total";

/// Record the outcome of a `submit` call.
pub fn record_submission(store: &MetricsStore, accepted: bool) {
    let name = if accepted { SUBMISSIONS_ACCEPTED } else { SUBMISSIONS_REJECTED };
    metrics::counter!(name).increment(1);
    store.increment_counter(name, 1);
}

pub fn record_queue_depth(store: &MetricsStore, depth: usize) {
    metrics::gauge!(QUEUE_DEPTH).set(depth as f64);
    store.set_gauge(QUEUE_DEPTH, depth as f64);
}

/// Record a finished batch and its per-item outcomes.
pub fn record_batch(store: &MetricsStore, size: usize, latency_ms: u64, completed: usize, failed: usize) {
    let batch_counter = if failed == 0 { BATCHES_OK } else { BATCHES_FAILED };
    metrics::counter!(batch_counter).increment(1);
    metrics::histogram!(BATCH_SIZE).record(size as f64);
    metrics::histogram!(BATCH_LATENCY_MS).record(latency_ms as f64);
    metrics::counter!(ITEMS_COMPLETED).increment(completed as u64);
    metrics::counter!(ITEMS_FAILED).increment(failed as u64);

    store.increment_counter(batch_counter, 1);
    store.record_histogram(BATCH_SIZE, size as f64);
    store.record_histogram(BATCH_LATENCY_MS, latency_ms as f64);
    store.increment_counter(ITEMS_COMPLETED, completed as u64);
    store.increment_counter(ITEMS_FAILED, failed as u64);
}

/// Record a scale event and the resulting pool size.
pub fn record_scale_event(store: &MetricsStore, scaled_up: bool, active_workers: usize) {
    let name = if scaled_up { SCALE_UPS } else { SCALE_DOWNS };
    metrics::counter!(name).increment(1);
    store.increment_counter(name, 1);
    record_pool_size(store, active_workers, None);
}

/// Record pool gauges; `busy` is skipped when unknown.
pub fn record_pool_size(store: &MetricsStore, active: usize, busy: Option<usize>) {
    metrics::gauge!(ACTIVE_WORKERS).set(active as f64);
    store.set_gauge(ACTIVE_WORKERS, active as f64);
    if let Some(busy) = busy {
        metrics::gauge!(BUSY_WORKERS).set(busy as f64);
        store.set_gauge(BUSY_WORKERS, busy as f64);
    }
}

pub fn record_sink_failure(store: &MetricsStore) {
    metrics::counter!(SINK_FAILURES).increment(1);
    store.increment_counter(SINK_FAILURES, 1);
}
