//! Inference executor seam.
//!
//! The orchestrator treats model execution as a black box: a batch goes in,
//! one output per item comes back, or the whole batch fails.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;

use crate::scheduler::{Batch, WorkItemId};

/// Errors raised while processing a batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProcessingError {
    #[error("executor failed: {0}")]
    Backend(String),
    #[error("executor panicked: {0}")]
    Panicked(String),
    #[error("executor produced no output for this item")]
    MissingOutput,
}

/// Output produced for a single work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutput {
    pub work_item_id: WorkItemId,
    pub payload: String,
}

impl ItemOutput {
    pub fn new(work_item_id: WorkItemId, payload: impl Into<String>) -> Self {
        Self { work_item_id, payload: payload.into() }
    }
}

/// Runs a batch to completion.
///
/// Implementations may take as long as they need; the caller never holds a
/// lock while awaiting `process`.
#[async_trait]
pub trait InferenceExecutor: Send + Sync {
    async fn process(&self, batch: &Batch) -> Result<Vec<ItemOutput>, ProcessingError>;
}

/// Configuration for the simulated executor.
#[derive(Debug, Clone)]
pub struct SimulatedExecutorConfig {
    /// Fixed cost paid once per batch.
    pub base_latency: Duration,
    /// Additional cost per item in the batch.
    pub per_item_latency: Duration,
    /// Probability in `[0, 1]` that a batch fails.
    pub failure_rate: f64,
}

impl Default for SimulatedExecutorConfig {
    fn default() -> Self {
        Self {
            base_latency: Duration::from_millis(5),
            per_item_latency: Duration::from_millis(10),
            failure_rate: 0.0,
        }
    }
}

/// Executor with latency proportional to batch size.
pub struct SimulatedExecutor {
    config: SimulatedExecutorConfig,
}

impl SimulatedExecutor {
    pub fn new(config: SimulatedExecutorConfig) -> Self {
        Self { config }
    }

    /// Latency the executor will simulate for a batch of `size` items.
    pub fn latency_for(&self, size: usize) -> Duration {
        self.config.base_latency + self.config.per_item_latency * size as u32
    }

    fn should_fail(&self) -> bool {
        let rate = self.config.failure_rate.clamp(0.0, 1.0);
        rate > 0.0 && rand::thread_rng().gen_bool(rate)
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(SimulatedExecutorConfig::default())
    }
}

#[async_trait]
impl InferenceExecutor for SimulatedExecutor {
    async fn process(&self, batch: &Batch) -> Result<Vec<ItemOutput>, ProcessingError> {
        let fail = self.should_fail();
        tokio::time::sleep(self.latency_for(batch.len())).await;
        if fail {
            return Err(ProcessingError::Backend(format!(
                "simulated failure for {}",
                batch.id()
            )));
        }
        Ok(batch
            .items()
            .iter()
            .map(|item| ItemOutput::new(item.id().clone(), format!("processed:{}", item.payload())))
            .collect())
    }
}
