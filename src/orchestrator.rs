//! Top-level coordinator.
//!
//! Owns the queue, the worker pool and the scaling state, and runs the
//! control loop on a dedicated task. Each cycle evaluates the autoscale
//! policy, applies its decision, then dispatches batches to idle workers
//! until either runs out. Cycles are driven by a periodic tick and also
//! triggered early when an item is enqueued or a worker frees up.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, OrchestratorConfig};
use crate::executor::InferenceExecutor;
use crate::health::{HealthChecker, HealthReport};
use crate::scheduler::{
    AutoscalePolicy, BatchFormer, BoundedQueue, PoolSnapshot, PoolState, QueueError,
    ScaleDecision, ScaleDownOutcome, ScaleUpOutcome, ScalingSignals, WorkItem, WorkItemId,
    WorkerPool,
};
use crate::shutdown::{ShutdownCoordinator, ShutdownState};
use crate::sink::ResultSink;
use crate::telemetry::{self, MetricsSnapshot, MetricsStore};

/// Construction failures. No orchestrator exists after one of these.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("orchestrator must be started inside a tokio runtime")]
    NoRuntime,
}

/// Outcome of [`Orchestrator::shutdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Items that were still queued and will never be processed.
    pub undelivered: Vec<WorkItemId>,
    /// Batches that were in flight when shutdown began and ran to completion.
    pub drained_batches: u32,
}

/// Batching, autoscaling work orchestrator.
pub struct Orchestrator {
    config: OrchestratorConfig,
    queue: Arc<BoundedQueue>,
    pool: Arc<WorkerPool>,
    state: Arc<Mutex<PoolState>>,
    coordinator: Arc<ShutdownCoordinator>,
    metrics: Arc<MetricsStore>,
    health: HealthChecker,
    cancel: CancellationToken,
    control_task: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Validate `config`, build every component and start the control loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: OrchestratorConfig,
        executor: Arc<dyn InferenceExecutor>,
        sink: Arc<dyn ResultSink>,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| OrchestratorError::NoRuntime)?;

        let metrics = Arc::new(MetricsStore::new());
        let queue = Arc::new(BoundedQueue::new(config.queue_capacity));
        let pool = Arc::new(WorkerPool::new(config.max_workers, executor, sink, metrics.clone()));
        let state = Arc::new(Mutex::new(PoolState::new(config.max_workers, config.depth_history_len)));
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let cancel = CancellationToken::new();

        let control = ControlLoop {
            queue: queue.clone(),
            pool: pool.clone(),
            former: BatchFormer::new(config.batch_config()),
            policy: AutoscalePolicy::new(config.autoscale_config()),
            state: state.clone(),
            coordinator: coordinator.clone(),
            metrics: metrics.clone(),
        };
        let handle = runtime.spawn(control.run(cancel.clone(), config.control_interval));

        tracing::info!(
            queue_capacity = config.queue_capacity,
            max_batch_size = config.max_batch_size,
            max_workers = config.max_workers,
            "orchestrator started"
        );

        Ok(Self {
            config,
            queue,
            pool,
            state,
            coordinator,
            metrics,
            health: HealthChecker::default(),
            cancel,
            control_task: Mutex::new(Some(handle)),
        })
    }

    /// Enqueue an item without blocking.
    ///
    /// Fails with [`QueueError::Full`] under backpressure and with
    /// [`QueueError::Closed`] once shutdown has begun; either way the item is
    /// handed back inside the error.
    pub fn submit(&self, item: WorkItem) -> Result<WorkItemId, QueueError> {
        let id = item.id().clone();
        match self.queue.enqueue(item) {
            Ok(depth) => {
                telemetry::record_submission(&self.metrics, true);
                telemetry::record_queue_depth(&self.metrics, depth);
                Ok(id)
            }
            Err(e) => {
                telemetry::record_submission(&self.metrics, false);
                tracing::debug!(work_item_id = %id, error = %e, "submission rejected");
                Err(e)
            }
        }
    }

    /// Stop dispatching, wait for in-flight batches, and report what is left.
    ///
    /// In-flight batches are never aborted. Items still queued are returned
    /// as undelivered. A later or concurrent call waits until the first one
    /// has stopped the orchestrator, then returns an empty report.
    pub async fn shutdown(&self) -> ShutdownReport {
        if !self.coordinator.begin_drain() {
            self.coordinator.stopped().await;
            return ShutdownReport::default();
        }
        tracing::info!("orchestrator shutdown requested");

        self.cancel.cancel();
        let control = self.control_task.lock().take();
        if let Some(handle) = control {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "control loop ended abnormally");
            }
        }

        let undelivered = self.queue.close_and_drain();
        let drained_batches = self.coordinator.in_flight_count();
        tracing::info!(
            undelivered = undelivered.len(),
            in_flight = drained_batches,
            "draining in-flight batches"
        );
        self.coordinator.drain().await;
        self.coordinator.finish();
        telemetry::record_queue_depth(&self.metrics, 0);
        tracing::info!("orchestrator stopped");

        ShutdownReport { undelivered, drained_batches }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    pub fn pool_snapshot(&self) -> PoolSnapshot {
        self.pool.snapshot()
    }

    /// Copy of the scaling state (worker count, depth history, cooldown).
    pub fn pool_state(&self) -> PoolState {
        self.state.lock().clone()
    }

    pub fn shutdown_state(&self) -> ShutdownState {
        self.coordinator.state()
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn health(&self) -> HealthReport {
        self.health.report(
            self.coordinator.state(),
            self.queue.depth(),
            self.queue.capacity(),
            self.pool.snapshot(),
        )
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// State moved into the control task.
struct ControlLoop {
    queue: Arc<BoundedQueue>,
    pool: Arc<WorkerPool>,
    former: BatchFormer,
    policy: AutoscalePolicy,
    state: Arc<Mutex<PoolState>>,
    coordinator: Arc<ShutdownCoordinator>,
    metrics: Arc<MetricsStore>,
}

impl ControlLoop {
    async fn run(self, cancel: CancellationToken, interval: Duration) {
        tracing::info!(interval_ms = interval.as_millis() as u64, "control loop started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                () = self.queue.notified() => {}
                () = self.pool.worker_released() => {}
            }
            self.cycle(Instant::now());
        }
        tracing::info!("control loop stopped");
    }

    fn cycle(&self, now: Instant) {
        self.autoscale(now);
        self.dispatch();
    }

    fn autoscale(&self, now: Instant) -> ScaleDecision {
        let signals = ScalingSignals {
            queue_depth: self.queue.depth(),
            pool: self.pool.snapshot(),
        };
        telemetry::record_queue_depth(&self.metrics, signals.queue_depth);
        telemetry::record_pool_size(&self.metrics, signals.pool.active, Some(signals.pool.busy));

        let mut state = self.state.lock();
        let decision = self.policy.evaluate(&mut state, signals, now);
        match decision {
            ScaleDecision::ScaleUp => match self.pool.scale_up() {
                ScaleUpOutcome::Added(worker_id) => {
                    state.record_scale_up(now);
                    tracing::info!(
                        %worker_id,
                        queue_depth = signals.queue_depth,
                        active_workers = state.active_workers(),
                        "scaled up"
                    );
                    telemetry::record_scale_event(&self.metrics, true, state.active_workers());
                }
                ScaleUpOutcome::AtCapacity => {
                    tracing::debug!("scale up skipped: pool at capacity");
                }
            },
            ScaleDecision::ScaleDown => match self.pool.scale_down() {
                ScaleDownOutcome::Removed(worker_id) => {
                    state.record_scale_down();
                    tracing::info!(
                        %worker_id,
                        active_workers = state.active_workers(),
                        "scaled down"
                    );
                    telemetry::record_scale_event(&self.metrics, false, state.active_workers());
                }
                outcome => tracing::debug!(?outcome, "scale down skipped"),
            },
            ScaleDecision::Hold => {}
        }
        state.sync_active(self.pool.active_count());
        decision
    }

    /// Pair idle workers with batches until one side runs out.
    fn dispatch(&self) -> usize {
        let mut dispatched = 0;
        while !self.queue.is_empty() {
            let Some(claim) = self.pool.claim_idle() else { break };
            let Some(guard) = self.coordinator.track() else { break };
            let Some(batch) = self.former.form_batch(&self.queue) else { break };
            self.pool.assign(claim, batch, guard);
            dispatched += 1;
        }
        dispatched
    }
}
