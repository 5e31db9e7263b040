//! Health check support.
//!
//! Provides liveness, readiness, and full health reports so an embedding
//! application can expose them however it likes.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::scheduler::PoolSnapshot;
use crate::shutdown::ShutdownState;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Detailed health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub ready: bool,
    pub accepting_submissions: bool,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub active_workers: usize,
    pub busy_workers: usize,
    pub max_workers: usize,
    pub uptime_secs: u64,
}

/// Aggregates health information from orchestrator components.
pub struct HealthChecker {
    start_time: Instant,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self { start_time: Instant::now() }
    }

    /// Check liveness: process is responsive.
    pub fn is_alive(&self) -> bool {
        true
    }

    /// Check readiness: running and the queue has room.
    pub fn is_ready(&self, shutdown_state: ShutdownState, queue_depth: usize, queue_capacity: usize) -> bool {
        shutdown_state == ShutdownState::Running && queue_depth < queue_capacity
    }

    /// Generate full health report.
    pub fn report(
        &self,
        shutdown_state: ShutdownState,
        queue_depth: usize,
        queue_capacity: usize,
        pool: PoolSnapshot,
    ) -> HealthReport {
        HealthReport {
            state: self.compute_state(shutdown_state, queue_depth, queue_capacity, pool),
            ready: self.is_ready(shutdown_state, queue_depth, queue_capacity),
            accepting_submissions: shutdown_state == ShutdownState::Running,
            queue_depth,
            queue_capacity,
            active_workers: pool.active,
            busy_workers: pool.busy,
            max_workers: pool.max,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    fn compute_state(
        &self,
        shutdown_state: ShutdownState,
        queue_depth: usize,
        queue_capacity: usize,
        pool: PoolSnapshot,
    ) -> HealthState {
        if shutdown_state != ShutdownState::Running {
            return HealthState::Unhealthy;
        }
        if queue_depth >= queue_capacity {
            return HealthState::Degraded;
        }
        // Saturated: no headroom left to scale into and a backlog waiting.
        if pool.active >= pool.max && pool.busy == pool.active && queue_depth > 0 {
            return HealthState::Degraded;
        }
        HealthState::Healthy
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}
