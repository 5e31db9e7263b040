//! Telemetry for the orchestrator.
//!
//! Provides structured logging, batch spans, and metrics collection.

mod logging;
pub mod metrics;
mod spans;
mod store;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    record_batch, record_pool_size, record_queue_depth, record_scale_event,
    record_sink_failure, record_submission,
};
pub use spans::{BatchSpan, SpanExt};
pub use store::{HistogramSummary, MetricsSnapshot, MetricsStore};
