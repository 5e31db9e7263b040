//! Batch Orchestrator
//!
//! An in-process scheduler for inference-style workloads: callers submit
//! work items into a bounded queue, a control loop groups them into batches
//! and dispatches them to a pool of concurrent workers, and a heuristic
//! autoscaler grows or shrinks that pool with the backlog.
//!
//! # Guarantees
//!
//! - **Backpressure**: `submit` never blocks; a full queue rejects the item
//!   and hands it back.
//! - **FIFO batches**: items inside one batch keep submission order.
//! - **One batch per worker**: a worker is claimed before assignment and is
//!   never removed while busy; the pool never shrinks below one worker.
//! - **Completeness**: every accepted item gets exactly one result at the
//!   sink, or is listed as undelivered by `shutdown`.
//!
//! Model execution and result handling are external, plugged in through
//! [`InferenceExecutor`] and [`ResultSink`].

pub mod cli;
pub mod config;
pub mod executor;
pub mod health;
pub mod orchestrator;
pub mod scheduler;
pub mod shutdown;
pub mod sink;
pub mod telemetry;

pub use config::{ConfigError, OrchestratorConfig};
pub use executor::{InferenceExecutor, ItemOutput, ProcessingError, SimulatedExecutor, SimulatedExecutorConfig};
pub use orchestrator::{Orchestrator, OrchestratorError, ShutdownReport};
pub use scheduler::{QueueError, WorkItem, WorkItemId};
pub use sink::{ChannelSink, CollectingSink, Outcome, ResultSink, TracingSink, WorkResult};
