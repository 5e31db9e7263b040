//! Work item type accepted by the orchestrator queue.

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier for a submitted work item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItemId(String);

impl WorkItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random (v4 UUID) identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkItemId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for WorkItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A unit of submitted work.
///
/// Fields are private and there are no mutating accessors: once built, an
/// item is never changed on its way through the queue and the worker pool.
#[derive(Clone)]
pub struct WorkItem {
    id: WorkItemId,
    payload: String,
    submitted_at: DateTime<Utc>,
    arrived: Instant,
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("payload_len", &self.payload.len())
            .field("submitted_at", &self.submitted_at)
            .finish()
    }
}

impl WorkItem {
    /// Create an item with a generated identifier.
    pub fn new(payload: impl Into<String>) -> Self {
        Self::with_id(WorkItemId::generate(), payload)
    }

    /// Create an item with a caller-assigned identifier.
    pub fn with_id(id: impl Into<WorkItemId>, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            submitted_at: Utc::now(),
            arrived: Instant::now(),
        }
    }

    pub fn id(&self) -> &WorkItemId {
        &self.id
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Time spent since the item was created (queue wait plus processing).
    pub fn age(&self) -> std::time::Duration {
        self.arrived.elapsed()
    }

    pub fn into_id(self) -> WorkItemId {
        self.id
    }
}
