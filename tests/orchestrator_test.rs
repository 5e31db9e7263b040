//! End-to-end tests for the orchestrator: submission, dispatch, scaling,
//! failure containment, and graceful shutdown.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use batch_orchestrator::scheduler::Batch;
use batch_orchestrator::shutdown::ShutdownState;
use batch_orchestrator::telemetry::metrics::{
    SCALE_DOWNS, SCALE_UPS, SUBMISSIONS_ACCEPTED, SUBMISSIONS_REJECTED,
};
use batch_orchestrator::{
    CollectingSink, ConfigError, InferenceExecutor, ItemOutput, Orchestrator, OrchestratorConfig,
    OrchestratorError, Outcome, ProcessingError, QueueError, WorkItem, WorkItemId,
};
use tokio::sync::Semaphore;

// ============================================================================
// Test executors
// ============================================================================

struct EchoExecutor;

#[async_trait]
impl InferenceExecutor for EchoExecutor {
    async fn process(&self, batch: &Batch) -> Result<Vec<ItemOutput>, ProcessingError> {
        Ok(batch
            .items()
            .iter()
            .map(|item| ItemOutput::new(item.id().clone(), format!("echo:{}", item.payload())))
            .collect())
    }
}

struct FailingExecutor;

#[async_trait]
impl InferenceExecutor for FailingExecutor {
    async fn process(&self, _batch: &Batch) -> Result<Vec<ItemOutput>, ProcessingError> {
        Err(ProcessingError::Backend("model crashed".into()))
    }
}

/// Blocks every batch until a permit is released, and records peak concurrency.
struct GatedExecutor {
    gate: Arc<Semaphore>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl GatedExecutor {
    fn new() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let exec = Arc::new(Self {
            gate: gate.clone(),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        (exec, gate)
    }
}

#[async_trait]
impl InferenceExecutor for GatedExecutor {
    async fn process(&self, batch: &Batch) -> Result<Vec<ItemOutput>, ProcessingError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let permit = self.gate.acquire().await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        permit.map_err(|e| ProcessingError::Backend(e.to_string()))?;
        Ok(batch
            .items()
            .iter()
            .map(|item| ItemOutput::new(item.id().clone(), item.payload()))
            .collect())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn config(queue_capacity: usize, max_batch_size: usize, max_workers: usize) -> OrchestratorConfig {
    OrchestratorConfig {
        queue_capacity,
        max_batch_size,
        max_workers,
        backlog_threshold_factor: 2.0,
        stabilization_window: Duration::ZERO,
        control_interval: Duration::from_millis(5),
        scale_down_window: Duration::ZERO,
        depth_history_len: 16,
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn collect(sink: &CollectingSink, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), sink.wait_for(count))
        .await
        .expect("results not delivered in time");
}

// ============================================================================
// Submission
// ============================================================================

#[tokio::test]
async fn full_queue_rejects_and_returns_item() {
    let (exec, _gate) = GatedExecutor::new();
    let sink = CollectingSink::new();
    let orch = Orchestrator::start(config(3, 1, 1), exec, sink).unwrap();

    // First item goes straight to the only worker and blocks there.
    orch.submit(WorkItem::with_id("busy", "x")).unwrap();
    wait_until(|| orch.pool_snapshot().busy == 1).await;

    for id in ["A", "B", "C"] {
        assert_eq!(orch.submit(WorkItem::with_id(id, id)).unwrap(), WorkItemId::from(id));
    }
    let err = orch.submit(WorkItem::with_id("D", "D")).unwrap_err();
    assert!(err.is_full());
    assert_eq!(err.into_item().id().as_str(), "D");
    assert_eq!(orch.queue_depth(), 3);

    let metrics = orch.metrics_snapshot();
    assert_eq!(metrics.counter(SUBMISSIONS_ACCEPTED), 4);
    assert_eq!(metrics.counter(SUBMISSIONS_REJECTED), 1);
}

#[tokio::test]
async fn invalid_config_fails_start() {
    let sink = CollectingSink::new();
    let result = Orchestrator::start(config(0, 1, 1), Arc::new(EchoExecutor), sink);
    assert!(matches!(
        result,
        Err(OrchestratorError::Config(ConfigError::QueueCapacity))
    ));
}

// ============================================================================
// Processing
// ============================================================================

#[tokio::test]
async fn every_accepted_item_gets_exactly_one_result() {
    let sink = CollectingSink::new();
    let orch = Orchestrator::start(config(64, 4, 4), Arc::new(EchoExecutor), sink.clone()).unwrap();

    let mut ids = HashSet::new();
    for n in 0..40 {
        ids.insert(orch.submit(WorkItem::new(format!("p{n}"))).unwrap());
    }
    collect(&sink, 40).await;

    let results = sink.results();
    assert_eq!(results.len(), 40);
    let seen: HashSet<_> = results.iter().map(|r| r.work_item_id.clone()).collect();
    assert_eq!(seen, ids);
    assert!(results.iter().all(|r| r.is_success()));
    assert!(results
        .iter()
        .all(|r| r.output().is_some_and(|o| o.starts_with("echo:p"))));

    let report = orch.shutdown().await;
    assert!(report.undelivered.is_empty());
}

#[tokio::test]
async fn single_worker_preserves_submission_order() {
    let sink = CollectingSink::new();
    let orch = Orchestrator::start(config(64, 3, 1), Arc::new(EchoExecutor), sink.clone()).unwrap();

    let submitted: Vec<WorkItemId> = (0..12)
        .map(|n| orch.submit(WorkItem::new(format!("{n}"))).unwrap())
        .collect();
    collect(&sink, 12).await;

    let delivered: Vec<WorkItemId> = sink.results().into_iter().map(|r| r.work_item_id).collect();
    assert_eq!(delivered, submitted);

    // Batches never exceed the configured size.
    let results = sink.results();
    let mut per_batch = std::collections::HashMap::new();
    for r in &results {
        *per_batch.entry(r.batch_id).or_insert(0usize) += 1;
    }
    assert!(per_batch.values().all(|&n| n <= 3));
}

#[tokio::test]
async fn failing_batch_fails_each_item_and_frees_worker() {
    let sink = CollectingSink::new();
    let orch = Orchestrator::start(config(8, 2, 1), Arc::new(FailingExecutor), sink.clone()).unwrap();

    orch.submit(WorkItem::with_id("a", "a")).unwrap();
    orch.submit(WorkItem::with_id("b", "b")).unwrap();
    collect(&sink, 2).await;

    for result in sink.results() {
        assert!(matches!(
            &result.outcome,
            Outcome::Failed { error } if error.contains("model crashed")
        ));
    }
    wait_until(|| orch.pool_snapshot().busy == 0).await;

    // The same worker picks up later work.
    orch.submit(WorkItem::with_id("c", "c")).unwrap();
    collect(&sink, 3).await;
    let workers: HashSet<_> = sink.results().iter().map(|r| r.worker_id).collect();
    assert_eq!(workers.len(), 1);
}

// ============================================================================
// Scaling
// ============================================================================

#[tokio::test]
async fn backlog_scales_up_then_drains_back_to_one() {
    let (exec, gate) = GatedExecutor::new();
    let sink = CollectingSink::new();
    let orch = Orchestrator::start(config(32, 1, 3), exec.clone(), sink.clone()).unwrap();

    for n in 0..12 {
        orch.submit(WorkItem::new(format!("{n}"))).unwrap();
    }
    wait_until(|| orch.pool_snapshot().active == 3).await;
    wait_until(|| orch.pool_snapshot().busy == 3).await;
    assert!(orch.pool_state().peak_depth() > 0);

    gate.add_permits(1000);
    collect(&sink, 12).await;

    // Never more concurrent batches than workers.
    assert!(exec.peak.load(Ordering::SeqCst) <= 3);
    wait_until(|| orch.pool_snapshot().active == 1).await;

    let metrics = orch.metrics_snapshot();
    assert_eq!(metrics.counter(SCALE_UPS), 2);
    assert_eq!(metrics.counter(SCALE_DOWNS), 2);
}

#[tokio::test]
async fn pool_never_exceeds_ceiling() {
    let (exec, gate) = GatedExecutor::new();
    let sink = CollectingSink::new();
    let orch = Orchestrator::start(config(128, 1, 2), exec.clone(), sink.clone()).unwrap();

    for n in 0..50 {
        orch.submit(WorkItem::new(format!("{n}"))).unwrap();
    }
    wait_until(|| orch.pool_snapshot().busy == 2).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(orch.pool_snapshot().active, 2);

    gate.add_permits(1000);
    collect(&sink, 50).await;
    assert!(exec.peak.load(Ordering::SeqCst) <= 2);
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn shutdown_waits_for_in_flight_and_reports_queued() {
    let (exec, gate) = GatedExecutor::new();
    let sink = CollectingSink::new();
    let orch = Arc::new(Orchestrator::start(config(8, 1, 1), exec, sink.clone()).unwrap());

    orch.submit(WorkItem::with_id("running", "r")).unwrap();
    wait_until(|| orch.pool_snapshot().busy == 1).await;
    orch.submit(WorkItem::with_id("q1", "1")).unwrap();
    orch.submit(WorkItem::with_id("q2", "2")).unwrap();
    assert_eq!(orch.queue_depth(), 2);

    let shutdown = tokio::spawn({
        let orch = orch.clone();
        async move { orch.shutdown().await }
    });
    wait_until(|| orch.shutdown_state() == ShutdownState::Draining).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!shutdown.is_finished());
    assert!(sink.is_empty());

    gate.add_permits(1);
    let report = shutdown.await.unwrap();

    let results = sink.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].work_item_id.as_str(), "running");
    assert_eq!(
        report.undelivered,
        vec![WorkItemId::from("q1"), WorkItemId::from("q2")]
    );
    assert_eq!(report.drained_batches, 1);
    assert_eq!(orch.shutdown_state(), ShutdownState::Stopped);
}

#[tokio::test]
async fn submit_after_shutdown_is_rejected() {
    let sink = CollectingSink::new();
    let orch = Orchestrator::start(config(8, 2, 1), Arc::new(EchoExecutor), sink).unwrap();
    orch.shutdown().await;

    let err = orch.submit(WorkItem::with_id("late", "x")).unwrap_err();
    assert!(matches!(err, QueueError::Closed { .. }));
    assert_eq!(err.into_item().id().as_str(), "late");
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    let sink = CollectingSink::new();
    let orch = Orchestrator::start(config(8, 2, 1), Arc::new(EchoExecutor), sink).unwrap();

    let first = orch.shutdown().await;
    let second = orch.shutdown().await;
    assert!(first.undelivered.is_empty());
    assert_eq!(second, Default::default());
    assert_eq!(orch.shutdown_state(), ShutdownState::Stopped);
}

#[tokio::test]
async fn concurrent_shutdown_waits_for_first_to_stop() {
    let (exec, gate) = GatedExecutor::new();
    let sink = CollectingSink::new();
    let orch = Arc::new(Orchestrator::start(config(8, 1, 1), exec, sink.clone()).unwrap());

    orch.submit(WorkItem::with_id("running", "r")).unwrap();
    wait_until(|| orch.pool_snapshot().busy == 1).await;

    let first = tokio::spawn({
        let orch = orch.clone();
        async move { orch.shutdown().await }
    });
    wait_until(|| orch.shutdown_state() == ShutdownState::Draining).await;
    let second = tokio::spawn({
        let orch = orch.clone();
        async move {
            let report = orch.shutdown().await;
            (report, orch.shutdown_state())
        }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!second.is_finished());

    gate.add_permits(1);
    let (late_report, state_seen) = second.await.unwrap();
    assert_eq!(late_report, Default::default());
    assert_eq!(state_seen, ShutdownState::Stopped);
    assert_eq!(first.await.unwrap().drained_batches, 1);
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn health_reflects_lifecycle() {
    let sink = CollectingSink::new();
    let orch = Orchestrator::start(config(8, 2, 2), Arc::new(EchoExecutor), sink).unwrap();

    let report = orch.health();
    assert!(report.ready);
    assert!(report.accepting_submissions);
    assert_eq!(report.queue_capacity, 8);
    assert_eq!(report.max_workers, 2);

    orch.shutdown().await;
    let report = orch.health();
    assert!(!report.ready);
    assert!(!report.accepting_submissions);
}
