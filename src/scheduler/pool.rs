//! Dynamically sized worker pool.
//!
//! Each worker processes at most one batch at a time. The busy flag of every
//! worker lives behind a single lock, so finding and claiming an idle worker
//! happens in one critical section and a claimed worker can never be removed.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span};

use super::batch::Batch;
use crate::executor::{InferenceExecutor, ItemOutput, ProcessingError};
use crate::shutdown::ShutdownGuard;
use crate::sink::{Outcome, ResultSink, WorkResult};
use crate::telemetry::{self, BatchSpan, MetricsStore, SpanExt};

/// Identifier of a pool member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct WorkerId(pub u32);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleUpOutcome {
    Added(WorkerId),
    AtCapacity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDownOutcome {
    Removed(WorkerId),
    /// Every worker is busy; nothing is removed.
    Deferred,
    /// Only one worker left.
    AtFloor,
}

/// Point-in-time view of pool utilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub active: usize,
    pub busy: usize,
    pub max: usize,
}

impl PoolSnapshot {
    pub fn idle(&self) -> usize {
        self.active - self.busy
    }

    pub fn all_idle(&self) -> bool {
        self.busy == 0
    }
}

struct Worker {
    id: WorkerId,
    busy: bool,
}

struct Workers {
    slots: Vec<Worker>,
    next_id: u32,
}

impl Workers {
    fn spawn(&mut self) -> WorkerId {
        let id = WorkerId(self.next_id);
        self.next_id += 1;
        self.slots.push(Worker { id, busy: false });
        id
    }

    fn busy_count(&self) -> usize {
        self.slots.iter().filter(|w| w.busy).count()
    }

    fn claim(&mut self, id: WorkerId) -> bool {
        match self.slots.iter_mut().find(|w| w.id == id) {
            Some(worker) if !worker.busy => {
                worker.busy = true;
                true
            }
            _ => false,
        }
    }
}

/// Proof that a worker has been marked busy.
///
/// Consumed by [`WorkerPool::assign`]. Dropping the claim marks the worker
/// idle again, whether the batch finished, failed, panicked, or was never
/// assigned at all.
pub struct WorkerClaim {
    workers: Arc<Mutex<Workers>>,
    worker_id: WorkerId,
}

impl WorkerClaim {
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }
}

impl fmt::Debug for WorkerClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerClaim").field("worker_id", &self.worker_id).finish()
    }
}

impl Drop for WorkerClaim {
    fn drop(&mut self) {
        let mut workers = self.workers.lock();
        if let Some(worker) = workers.slots.iter_mut().find(|w| w.id == self.worker_id) {
            worker.busy = false;
        }
    }
}

/// Variable-size set of workers sharing one executor and one result sink.
pub struct WorkerPool {
    workers: Arc<Mutex<Workers>>,
    max_workers: usize,
    executor: Arc<dyn InferenceExecutor>,
    sink: Arc<dyn ResultSink>,
    metrics: Arc<MetricsStore>,
    /// Signalled whenever a worker finishes a batch.
    released: Arc<Notify>,
}

impl WorkerPool {
    /// Create a pool with a single idle worker.
    pub fn new(
        max_workers: usize,
        executor: Arc<dyn InferenceExecutor>,
        sink: Arc<dyn ResultSink>,
        metrics: Arc<MetricsStore>,
    ) -> Self {
        let mut workers = Workers { slots: Vec::new(), next_id: 1 };
        workers.spawn();
        Self {
            workers: Arc::new(Mutex::new(workers)),
            max_workers: max_workers.max(1),
            executor,
            sink,
            metrics,
            released: Arc::new(Notify::new()),
        }
    }

    /// Add one worker unless the pool is at its ceiling.
    pub fn scale_up(&self) -> ScaleUpOutcome {
        let mut workers = self.workers.lock();
        if workers.slots.len() >= self.max_workers {
            return ScaleUpOutcome::AtCapacity;
        }
        ScaleUpOutcome::Added(workers.spawn())
    }

    /// Remove the newest idle worker. Busy workers are never removed and
    /// the pool never shrinks below one worker.
    pub fn scale_down(&self) -> ScaleDownOutcome {
        let mut workers = self.workers.lock();
        if workers.slots.len() <= 1 {
            return ScaleDownOutcome::AtFloor;
        }
        match workers.slots.iter().rposition(|w| !w.busy) {
            Some(index) => ScaleDownOutcome::Removed(workers.slots.remove(index).id),
            None => ScaleDownOutcome::Deferred,
        }
    }

    /// Look for an idle worker without claiming it.
    ///
    /// The answer can be stale by the time the caller acts on it; use
    /// [`try_claim`](Self::try_claim) or [`claim_idle`](Self::claim_idle)
    /// to actually reserve a worker.
    pub fn find_idle_worker(&self) -> Option<WorkerId> {
        self.workers.lock().slots.iter().find(|w| !w.busy).map(|w| w.id)
    }

    /// Claim a specific worker if it exists and is idle.
    pub fn try_claim(&self, id: WorkerId) -> Option<WorkerClaim> {
        if !self.workers.lock().claim(id) {
            return None;
        }
        Some(WorkerClaim { workers: self.workers.clone(), worker_id: id })
    }

    /// Find and claim an idle worker in one critical section.
    pub fn claim_idle(&self) -> Option<WorkerClaim> {
        let mut workers = self.workers.lock();
        let worker = workers.slots.iter_mut().find(|w| !w.busy)?;
        worker.busy = true;
        let worker_id = worker.id;
        drop(workers);
        Some(WorkerClaim { workers: self.workers.clone(), worker_id })
    }

    /// Run `batch` on the claimed worker in a background task.
    ///
    /// The task always ends with the worker idle and exactly one result per
    /// item handed to the sink, even if the executor errors or panics.
    /// `guard` is held until every result has been delivered.
    pub fn assign(&self, claim: WorkerClaim, batch: Batch, guard: ShutdownGuard) -> JoinHandle<()> {
        let span = BatchSpan::new(batch.id(), claim.worker_id(), batch.len());
        tracing::debug!(
            parent: &span,
            queued_ms = batch.formed_at().elapsed().as_millis() as u64,
            "batch dispatched"
        );
        let task = BatchTask {
            executor: self.executor.clone(),
            sink: self.sink.clone(),
            metrics: self.metrics.clone(),
            released: self.released.clone(),
        };
        tokio::spawn(task.run(claim, batch, guard).instrument(span))
    }

    pub fn is_busy(&self, id: WorkerId) -> Option<bool> {
        self.workers.lock().slots.iter().find(|w| w.id == id).map(|w| w.busy)
    }

    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.workers.lock().slots.iter().map(|w| w.id).collect()
    }

    pub fn active_count(&self) -> usize {
        self.workers.lock().slots.len()
    }

    pub fn busy_count(&self) -> usize {
        self.workers.lock().busy_count()
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let workers = self.workers.lock();
        PoolSnapshot {
            active: workers.slots.len(),
            busy: workers.busy_count(),
            max: self.max_workers,
        }
    }

    /// Wait until some worker finishes a batch.
    pub async fn worker_released(&self) {
        self.released.notified().await;
    }
}

/// Everything a spawned batch needs, detached from the pool's lifetime.
struct BatchTask {
    executor: Arc<dyn InferenceExecutor>,
    sink: Arc<dyn ResultSink>,
    metrics: Arc<MetricsStore>,
    released: Arc<Notify>,
}

impl BatchTask {
    async fn run(self, claim: WorkerClaim, batch: Batch, _guard: ShutdownGuard) {
        let worker_id = claim.worker_id();
        let started = Instant::now();
        let outcome = match AssertUnwindSafe(self.executor.process(&batch)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(ProcessingError::Panicked(panic_message(panic.as_ref()))),
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        let span = Span::current();
        span.record("latency_ms", latency_ms);
        span.record_result(&outcome);
        if let Err(e) = &outcome {
            tracing::warn!(error = %e, items = batch.len(), "batch failed");
        }

        let results = collate(&batch, outcome, latency_ms, worker_id);
        let failed = results.iter().filter(|r| !r.is_success()).count();
        telemetry::record_batch(&self.metrics, batch.len(), latency_ms, results.len() - failed, failed);

        // Free the worker before delivery so the next dispatch is not held
        // up by a slow sink.
        drop(claim);
        self.released.notify_one();

        for result in results {
            let id = result.work_item_id.clone();
            if let Err(e) = self.sink.deliver(result) {
                telemetry::record_sink_failure(&self.metrics);
                tracing::warn!(work_item_id = %id, error = %e, "result delivery failed");
            }
        }
        tracing::debug!(latency_ms, failed, "batch complete");
    }
}

/// Build exactly one result per batch item, in batch order.
fn collate(
    batch: &Batch,
    outcome: Result<Vec<ItemOutput>, ProcessingError>,
    processing_duration_ms: u64,
    worker_id: WorkerId,
) -> Vec<WorkResult> {
    let make = |item_id, outcome| WorkResult {
        work_item_id: item_id,
        outcome,
        processing_duration_ms,
        batch_id: batch.id(),
        worker_id,
    };

    let outputs = match outcome {
        Ok(outputs) => outputs,
        Err(e) => {
            let error = e.to_string();
            return batch
                .item_ids()
                .map(|id| make(id.clone(), Outcome::Failed { error: error.clone() }))
                .collect();
        }
    };

    let mut by_id: HashMap<_, _> = outputs
        .into_iter()
        .map(|out| (out.work_item_id, out.payload))
        .collect();
    let results = batch
        .item_ids()
        .map(|id| match by_id.remove(id) {
            Some(output) => make(id.clone(), Outcome::Completed { output }),
            None => make(
                id.clone(),
                Outcome::Failed { error: ProcessingError::MissingOutput.to_string() },
            ),
        })
        .collect();
    if !by_id.is_empty() {
        tracing::warn!(unknown = by_id.len(), "executor returned outputs for items not in the batch");
    }
    results
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
