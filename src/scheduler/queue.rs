//! Bounded FIFO queue with non-blocking backpressure.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;

use super::work_item::{WorkItem, WorkItemId};

/// Errors returned when an item cannot be enqueued.
///
/// The rejected item is handed back so the caller can retry or drop it.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is full (capacity {capacity})")]
    Full { capacity: usize, item: WorkItem },
    #[error("queue is closed")]
    Closed { item: WorkItem },
}

impl QueueError {
    /// Recover the rejected item.
    pub fn into_item(self) -> WorkItem {
        match self {
            Self::Full { item, .. } | Self::Closed { item } => item,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full { .. })
    }
}

struct QueueState {
    items: VecDeque<WorkItem>,
    closed: bool,
}

/// Thread-safe bounded FIFO of work items.
///
/// All operations take a single short-lived lock and never suspend.
pub struct BoundedQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    /// Wakes the control loop when new items are enqueued.
    notify: Arc<Notify>,
}

impl BoundedQueue {
    /// Create a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Enqueue an item, rejecting immediately when full or closed.
    pub fn enqueue(&self, item: WorkItem) -> Result<usize, QueueError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(QueueError::Closed { item });
        }
        if state.items.len() >= self.capacity {
            return Err(QueueError::Full { capacity: self.capacity, item });
        }
        state.items.push_back(item);
        let depth = state.items.len();
        drop(state);

        self.notify.notify_one();
        Ok(depth)
    }

    /// Remove up to `n` items from the front, preserving submission order.
    pub fn dequeue_up_to(&self, n: usize) -> Vec<WorkItem> {
        let mut state = self.state.lock();
        let take = n.min(state.items.len());
        state.items.drain(..take).collect()
    }

    /// Current number of queued items.
    pub fn depth(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Close the queue and take every remaining item id, atomically.
    ///
    /// After this returns, every `enqueue` fails with `QueueError::Closed`,
    /// so no accepted item can slip in behind the drain.
    pub fn close_and_drain(&self) -> Vec<WorkItemId> {
        let mut state = self.state.lock();
        state.closed = true;
        state.items.drain(..).map(WorkItem::into_id).collect()
    }

    /// Wait until an enqueue signals (a stored permit completes immediately).
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
