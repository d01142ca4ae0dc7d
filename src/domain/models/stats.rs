//! Queue statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::task::TaskStatus;

/// Aggregate view of the queue for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_tasks: u64,
    /// Per-status counts; absent statuses count zero
    pub status_counts: HashMap<TaskStatus, u64>,
    /// Mean calculated priority over all tasks
    pub avg_priority: f64,
    /// Maximum dependency depth seen
    pub max_depth: u32,
    /// Submission time of the oldest pending/blocked task
    pub oldest_pending: Option<DateTime<Utc>>,
    /// Submission time of the newest task
    pub newest_task: Option<DateTime<Utc>>,
}

impl QueueStats {
    pub fn count(&self, status: TaskStatus) -> u64 {
        self.status_counts.get(&status).copied().unwrap_or(0)
    }
}
