//! Span utilities and extension traits for batch tracing.

use tracing::{info_span, Span};

use crate::scheduler::{BatchId, WorkerId};

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for standardized batch spans.
pub struct BatchSpan;

impl BatchSpan {
    /// Create a span covering one batch on one worker.
    ///
    /// `status`, `error.message` and `latency_ms` are filled in on completion.
    pub fn new(batch_id: BatchId, worker_id: WorkerId, size: usize) -> Span {
        info_span!(
            "batch",
            batch_id = %batch_id,
            worker_id = %worker_id,
            size = size,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }
}
