//! Scheduling building blocks.
//!
//! Bounded queueing with backpressure, eager batch formation, the worker
//! pool, and the autoscale heuristic. The [`Orchestrator`](crate::Orchestrator)
//! wires them into a control loop.

mod autoscale;
mod batch;
mod pool;
mod queue;
mod work_item;

pub use autoscale::{
    AutoscaleConfig, AutoscalePolicy, DepthHistory, PoolState, ScaleDecision, ScalingSignals,
};
pub use batch::{Batch, BatchConfig, BatchFormer, BatchId};
pub use pool::{
    PoolSnapshot, ScaleDownOutcome, ScaleUpOutcome, WorkerClaim, WorkerId, WorkerPool,
};
pub use queue::{BoundedQueue, QueueError};
pub use work_item::{WorkItem, WorkItemId};
