//! Result delivery.
//!
//! Every accepted work item produces exactly one [`WorkResult`], delivered
//! to the configured [`ResultSink`] once. Delivery is fire-and-forget:
//! a failing sink is logged and never rolls back processing.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};

use crate::scheduler::{BatchId, WorkItemId, WorkerId};

/// Terminal state of a processed work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Completed { output: String },
    Failed { error: String },
}

/// Result for a single work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkResult {
    pub work_item_id: WorkItemId,
    pub outcome: Outcome,
    /// Wall time the executor spent on the enclosing batch.
    pub processing_duration_ms: u64,
    pub batch_id: BatchId,
    pub worker_id: WorkerId,
}

impl WorkResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Completed { .. })
    }

    pub fn output(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Completed { output } => Some(output),
            Outcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("result sink is closed")]
    Closed,
    #[error("result sink rejected delivery: {0}")]
    Rejected(String),
}

/// Receives completed results.
///
/// `deliver` is called from worker tasks and must not block.
pub trait ResultSink: Send + Sync {
    fn deliver(&self, result: WorkResult) -> Result<(), SinkError>;
}

/// Forwards results over an unbounded tokio channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<WorkResult>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WorkResult>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ResultSink for ChannelSink {
    fn deliver(&self, result: WorkResult) -> Result<(), SinkError> {
        self.tx.send(result).map_err(|_| SinkError::Closed)
    }
}

/// Keeps every delivered result in memory.
#[derive(Default)]
pub struct CollectingSink {
    results: Mutex<Vec<WorkResult>>,
    notify: Notify,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.lock().is_empty()
    }

    /// Copy of everything delivered so far, in delivery order.
    pub fn results(&self) -> Vec<WorkResult> {
        self.results.lock().clone()
    }

    /// Wait until at least `count` results have been delivered.
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.len() >= count {
                return;
            }
            notified.await;
        }
    }
}

impl ResultSink for CollectingSink {
    fn deliver(&self, result: WorkResult) -> Result<(), SinkError> {
        self.results.lock().push(result);
        self.notify.notify_waiters();
        Ok(())
    }
}

/// Logs each result as a structured event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ResultSink for TracingSink {
    fn deliver(&self, result: WorkResult) -> Result<(), SinkError> {
        match &result.outcome {
            Outcome::Completed { output } => tracing::info!(
                work_item_id = %result.work_item_id,
                batch_id = %result.batch_id,
                worker_id = %result.worker_id,
                latency_ms = result.processing_duration_ms,
                output_len = output.len(),
                "work item completed"
            ),
            Outcome::Failed { error } => tracing::warn!(
                work_item_id = %result.work_item_id,
                batch_id = %result.batch_id,
                worker_id = %result.worker_id,
                error = %error,
                "work item failed"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str) -> WorkResult {
        WorkResult {
            work_item_id: WorkItemId::from(id),
            outcome: Outcome::Completed { output: "ok".into() },
            processing_duration_ms: 3,
            batch_id: BatchId(1),
            worker_id: WorkerId(1),
        }
    }

    #[tokio::test]
    async fn channel_sink_forwards_results() {
        let (sink, mut rx) = ChannelSink::new();
        sink.deliver(result("a")).unwrap();
        assert_eq!(rx.recv().await.unwrap().work_item_id.as_str(), "a");
    }

    #[test]
    fn channel_sink_reports_closed_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        assert!(matches!(sink.deliver(result("a")), Err(SinkError::Closed)));
    }

    #[tokio::test]
    async fn collecting_sink_wakes_waiters() {
        let sink = CollectingSink::new();
        let waiter = {
            let sink = sink.clone();
            tokio::spawn(async move { sink.wait_for(2).await })
        };
        sink.deliver(result("a")).unwrap();
        sink.deliver(result("b")).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(result("a")).unwrap();
        assert_eq!(json["outcome"]["status"], "completed");
        assert_eq!(json["work_item_id"], "a");
    }
}
