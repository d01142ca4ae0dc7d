//! Task pruning domain models.
//!
//! Filtering criteria and result statistics for bulk task deletion. The
//! filters build one shared WHERE clause used by both the preview and the
//! delete paths so the two can never disagree about selection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::task::TaskStatus;

/// Number of deleted tasks at which conditional VACUUM kicks in.
pub const VACUUM_THRESHOLD_TASKS: usize = 100;

/// Number of selected tasks at which conditional VACUUM is force-skipped.
/// A VACUUM after a six-figure delete can hold an exclusive lock for minutes.
pub const AUTO_SKIP_VACUUM_THRESHOLD: usize = 10_000;

/// VACUUM strategy after a prune commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VacuumMode {
    /// Always VACUUM and measure reclaimed bytes
    Always,
    /// VACUUM when at least [`VACUUM_THRESHOLD_TASKS`] tasks were deleted
    Conditional,
    /// Never VACUUM
    Never,
}

impl Default for VacuumMode {
    fn default() -> Self {
        Self::Conditional
    }
}

impl VacuumMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Conditional => "conditional",
            Self::Never => "never",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "always" => Some(Self::Always),
            "conditional" => Some(Self::Conditional),
            "never" => Some(Self::Never),
            _ => None,
        }
    }
}

/// Filtering criteria for a prune operation.
///
/// Selection strategies: explicit ids, time bound (`older_than_days` or
/// `before_date`), and a status set. Id-based selection may target any
/// status; filter-based selection is restricted to terminal statuses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PruneFilters {
    /// Specific task ids to delete (direct selection)
    pub task_ids: Option<Vec<Uuid>>,
    /// Delete tasks completed (or, if never completed, submitted) more than
    /// N days ago
    pub older_than_days: Option<u32>,
    /// Delete tasks completed/submitted before this instant
    pub before_date: Option<DateTime<Utc>>,
    /// Statuses to prune; defaults to the terminal set for time-based
    /// selection
    pub statuses: Option<Vec<TaskStatus>>,
    /// Maximum tasks to delete in one operation
    pub limit: Option<u32>,
    /// Preview mode: roll back the deletion after collecting stats
    pub dry_run: bool,
    /// VACUUM strategy
    pub vacuum_mode: VacuumMode,
    /// Delete whole descendant trees (leaves first) instead of single tasks
    pub recursive: bool,
}

impl PruneFilters {
    /// Select explicit task ids.
    pub fn for_ids(task_ids: Vec<Uuid>) -> Self {
        Self {
            task_ids: Some(task_ids),
            ..Self::default()
        }
    }

    /// Select terminal tasks older than `days`.
    pub fn older_than(days: u32) -> Self {
        Self {
            older_than_days: Some(days),
            ..Self::default()
        }
    }

    /// Validate the criteria and normalize defaults.
    ///
    /// Rejects empty criteria and non-terminal statuses in the status set.
    /// Time-based selection without an explicit status set defaults to the
    /// terminal statuses.
    pub fn validate(mut self) -> Result<Self, String> {
        let has_ids = self.task_ids.as_ref().is_some_and(|ids| !ids.is_empty());
        let has_time = self.older_than_days.is_some() || self.before_date.is_some();
        let has_status = self.statuses.as_ref().is_some_and(|s| !s.is_empty());

        if !(has_ids || has_time || has_status) {
            return Err(
                "At least one selection criterion must be specified: \
                 'task_ids', 'older_than_days', 'before_date', or 'statuses'"
                    .to_string(),
            );
        }

        if let Some(days) = self.older_than_days {
            if days == 0 {
                return Err("older_than_days must be at least 1".to_string());
            }
        }
        if let Some(limit) = self.limit {
            if limit == 0 {
                return Err("limit must be at least 1".to_string());
            }
        }
        if self.recursive && self.limit.is_some() {
            return Err("recursive pruning cannot be combined with a limit".to_string());
        }

        if let Some(statuses) = &self.statuses {
            let invalid: Vec<_> = statuses.iter().filter(|s| !s.is_terminal()).collect();
            if !invalid.is_empty() {
                let names: Vec<_> = invalid.iter().map(|s| s.as_str()).collect();
                return Err(format!(
                    "Cannot prune tasks with statuses: {}. \
                     Only completed, failed, or cancelled tasks can be pruned.",
                    names.join(", ")
                ));
            }
        }

        if has_time && self.statuses.is_none() {
            self.statuses = Some(vec![
                TaskStatus::Completed,
                TaskStatus::Failed,
                TaskStatus::Cancelled,
            ]);
        }

        Ok(self)
    }

    /// Build the shared WHERE clause and its positional parameters.
    ///
    /// Used by preview and delete paths alike so both select the same rows.
    /// The clause never includes the `WHERE` keyword itself.
    pub fn build_where_clause(&self) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(ids) = &self.task_ids {
            if !ids.is_empty() {
                let placeholders = vec!["?"; ids.len()].join(",");
                clauses.push(format!("id IN ({placeholders})"));
                params.extend(ids.iter().map(Uuid::to_string));
            }
        }

        // Timestamps are stored as RFC3339 text; julianday() normalizes them
        // for comparison against datetime('now') bounds.
        if let Some(days) = self.older_than_days {
            clauses.push(
                "(julianday(completed_at) < julianday(datetime('now', ?)) OR \
                 (completed_at IS NULL AND julianday(submitted_at) < julianday(datetime('now', ?))))"
                    .to_string(),
            );
            let bound = format!("-{days} days");
            params.push(bound.clone());
            params.push(bound);
        } else if let Some(before) = self.before_date {
            clauses.push(
                "(julianday(completed_at) < julianday(?) OR \
                 (completed_at IS NULL AND julianday(submitted_at) < julianday(?)))"
                    .to_string(),
            );
            let iso = before.to_rfc3339();
            params.push(iso.clone());
            params.push(iso);
        }

        if let Some(statuses) = &self.statuses {
            if !statuses.is_empty() {
                let placeholders = vec!["?"; statuses.len()].join(",");
                clauses.push(format!("status IN ({placeholders})"));
                params.extend(statuses.iter().map(|s| s.as_str().to_string()));
            }
        }

        if clauses.is_empty() {
            clauses.push("1=1".to_string());
        }

        (clauses.join(" AND "), params)
    }
}

/// Statistics from a prune operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PruneResult {
    /// Number of tasks deleted (or that would be deleted in a dry run)
    pub deleted_tasks: usize,
    /// Number of dependency edges deleted
    pub deleted_dependencies: usize,
    /// Bytes reclaimed by VACUUM; `None` when VACUUM did not run
    pub reclaimed_bytes: Option<u64>,
    /// Whether this was a dry run
    pub dry_run: bool,
    /// Count of deleted tasks by status
    pub breakdown_by_status: HashMap<TaskStatus, usize>,
    /// Whether conditional VACUUM was force-skipped due to prune size
    pub vacuum_auto_skipped: bool,
    /// Explicitly-selected parents refused because they have live children
    /// outside the selection (non-recursive id-based prune only)
    pub skipped_parents: Vec<Uuid>,
}
