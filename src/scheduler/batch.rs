//! Batch formation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use super::queue::BoundedQueue;
use super::work_item::{WorkItem, WorkItemId};

/// Configuration for batch formation.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub max_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_batch_size: 8 }
    }
}

/// Sequence number assigned to each formed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BatchId(pub u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch-{}", self.0)
    }
}

/// A non-empty group of work items dispatched together to one worker.
#[derive(Debug)]
pub struct Batch {
    id: BatchId,
    items: Vec<WorkItem>,
    formed_at: Instant,
}

impl Batch {
    /// Build a batch; returns `None` for an empty item list.
    pub fn new(id: BatchId, items: Vec<WorkItem>) -> Option<Self> {
        if items.is_empty() {
            return None;
        }
        Some(Self { id, items, formed_at: Instant::now() })
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always false for a constructed batch.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item_ids(&self) -> impl Iterator<Item = &WorkItemId> {
        self.items.iter().map(WorkItem::id)
    }

    pub fn formed_at(&self) -> Instant {
        self.formed_at
    }
}

/// Turns queued items into dispatchable batches.
///
/// Batches are formed eagerly: whatever is queued (up to the size limit) is
/// dispatched right away instead of waiting for a full batch.
pub struct BatchFormer {
    config: BatchConfig,
    next_id: AtomicU64,
}

impl BatchFormer {
    pub fn new(config: BatchConfig) -> Self {
        Self { config, next_id: AtomicU64::new(1) }
    }

    pub fn max_batch_size(&self) -> usize {
        self.config.max_batch_size
    }

    /// Pull up to `max_batch_size` items; `None` when the queue is empty.
    pub fn form_batch(&self, queue: &BoundedQueue) -> Option<Batch> {
        let items = queue.dequeue_up_to(self.config.max_batch_size.max(1));
        if items.is_empty() {
            return None;
        }
        let id = BatchId(self.next_id.fetch_add(1, Ordering::Relaxed));
        Batch::new(id, items)
    }
}
