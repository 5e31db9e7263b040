//! Graceful shutdown coordination.
//!
//! A small state machine (Running → Draining → Stopped) plus RAII tracking
//! of in-flight batches. Dispatch asks for a guard before assigning a batch;
//! once draining starts no new guards are handed out, and `drain` waits for
//! the outstanding ones to drop.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Notify;

/// Shutdown state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

/// Coordinates graceful shutdown across orchestrator components.
pub struct ShutdownCoordinator {
    state: RwLock<ShutdownState>,
    in_flight: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ShutdownState::Running),
            in_flight: Arc::new(AtomicU32::new(0)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.read()
    }

    /// Check if new dispatches are allowed.
    pub fn is_accepting(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Track an in-flight batch. Returns None once draining has begun.
    pub fn track(&self) -> Option<ShutdownGuard> {
        // Holding the read lock across the increment keeps `begin_drain`
        // from slipping in between the state check and the count.
        let state = self.state.read();
        if *state != ShutdownState::Running {
            return None;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Some(ShutdownGuard {
            counter: self.in_flight.clone(),
            notify: self.notify.clone(),
        })
    }

    /// Current in-flight batch count.
    pub fn in_flight_count(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop handing out guards. Returns false if already draining or stopped.
    pub fn begin_drain(&self) -> bool {
        let mut state = self.state.write();
        if *state != ShutdownState::Running {
            return false;
        }
        *state = ShutdownState::Draining;
        true
    }

    /// Wait until every outstanding guard has dropped. Never times out:
    /// in-flight work always runs to completion.
    pub async fn drain(&self) {
        loop {
            let notified = self.notify.notified();
            if self.in_flight_count() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Mark shutdown complete and wake anyone waiting in `stopped`.
    pub fn finish(&self) {
        *self.state.write() = ShutdownState::Stopped;
        self.notify.notify_waiters();
    }

    /// Wait until `finish` has been called.
    pub async fn stopped(&self) {
        loop {
            let notified = self.notify.notified();
            if self.state() == ShutdownState::Stopped {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for in-flight batch tracking.
pub struct ShutdownGuard {
    counter: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}
