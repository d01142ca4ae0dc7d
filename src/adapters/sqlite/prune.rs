//! Bulk task pruning with referential integrity.
//!
//! Selection and deletion share one WHERE clause (built by `PruneFilters`),
//! the whole delete runs in a single transaction, and every chunk walks the
//! same five-step referential sequence:
//!
//! 1. orphan children (`parent_task_id = NULL`) — lineage is cut, scheduling
//!    is unaffected;
//! 2. detach audit rows from agents about to cascade (`audit.agent_id` has an
//!    FK without cascade);
//! 3. delete legacy `state` rows (no cascade on that table);
//! 4. delete dependency edges touching the chunk;
//! 5. delete the tasks — `agents` and `checkpoints` cascade.
//!
//! Dry runs collect the same statistics and then roll back. VACUUM runs
//! after commit, outside the transaction, subject to the vacuum mode and the
//! large-prune auto-skip.

use std::collections::{HashMap, HashSet};

use sqlx::{Executor, Sqlite, Transaction};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    PruneFilters, PruneResult, TaskStatus, VacuumMode, AUTO_SKIP_VACUUM_THRESHOLD,
    VACUUM_THRESHOLD_TASKS,
};

use super::task_repository::{SqliteTaskRepository, SQL_IN_CHUNK};

impl SqliteTaskRepository {
    pub(crate) async fn prune_tasks_impl(
        &self,
        filters: &PruneFilters,
    ) -> DomainResult<PruneResult> {
        let filters = filters
            .clone()
            .validate()
            .map_err(DomainError::Validation)?;

        let mut selection = self.select_prune_targets(&filters).await?;
        let mut skipped_parents = Vec::new();

        if filters.recursive {
            selection = self.expand_recursive_selection(&selection).await?;
        } else if filters.task_ids.is_some() {
            skipped_parents = self
                .refuse_parents_with_live_children(&mut selection)
                .await?;
        }

        if selection.is_empty() {
            return Ok(PruneResult {
                dry_run: filters.dry_run,
                skipped_parents,
                ..PruneResult::default()
            });
        }

        // Conditional VACUUM is force-skipped for very large prunes; a
        // post-delete VACUUM at that scale holds an exclusive lock for
        // minutes. An explicit `always` is honored as requested.
        let mut vacuum_auto_skipped = false;
        let mut effective_vacuum = filters.vacuum_mode;
        if selection.len() >= AUTO_SKIP_VACUUM_THRESHOLD
            && filters.vacuum_mode == VacuumMode::Conditional
        {
            effective_vacuum = VacuumMode::Never;
            vacuum_auto_skipped = true;
        }

        let mut tx = self.pool().begin().await?;
        let stats = match delete_selection(&mut tx, &selection).await {
            Ok(stats) => stats,
            Err(e) => {
                tx.rollback().await.ok();
                return Err(e);
            }
        };

        if filters.dry_run {
            tx.rollback().await?;
            tracing::info!(
                would_delete = stats.deleted_tasks,
                dependencies = stats.deleted_dependencies,
                "prune dry run rolled back"
            );
            return Ok(PruneResult {
                deleted_tasks: stats.deleted_tasks,
                deleted_dependencies: stats.deleted_dependencies,
                reclaimed_bytes: None,
                dry_run: true,
                breakdown_by_status: stats.breakdown_by_status,
                vacuum_auto_skipped,
                skipped_parents,
            });
        }

        tx.commit().await?;

        let should_vacuum = match effective_vacuum {
            VacuumMode::Always => true,
            VacuumMode::Conditional => stats.deleted_tasks >= VACUUM_THRESHOLD_TASKS,
            VacuumMode::Never => false,
        };

        // VACUUM failures leave the committed delete intact.
        let reclaimed_bytes = if should_vacuum {
            match self.vacuum_and_measure().await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    tracing::warn!(error = %e, "VACUUM after prune failed");
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(
            deleted_tasks = stats.deleted_tasks,
            deleted_dependencies = stats.deleted_dependencies,
            reclaimed_bytes = ?reclaimed_bytes,
            vacuum_auto_skipped,
            "prune complete"
        );

        Ok(PruneResult {
            deleted_tasks: stats.deleted_tasks,
            deleted_dependencies: stats.deleted_dependencies,
            reclaimed_bytes,
            dry_run: false,
            breakdown_by_status: stats.breakdown_by_status,
            vacuum_auto_skipped,
            skipped_parents,
        })
    }

    /// Apply the shared WHERE clause, oldest first, respecting the limit.
    async fn select_prune_targets(&self, filters: &PruneFilters) -> DomainResult<Vec<Uuid>> {
        let (where_sql, params) = filters.build_where_clause();
        let limit_sql = filters
            .limit
            .map_or_else(String::new, |l| format!(" LIMIT {l}"));
        let sql = format!(
            "SELECT id FROM tasks WHERE {where_sql} ORDER BY submitted_at ASC{limit_sql}"
        );

        let mut query = sqlx::query_as::<_, (String,)>(&sql);
        for param in &params {
            query = query.bind(param);
        }

        query
            .fetch_all(self.pool())
            .await?
            .iter()
            .map(|(id,)| super::parse_uuid(id))
            .collect()
    }

    /// Non-recursive id-based prune refuses parents whose children are not
    /// themselves selected; returns the refused ids.
    async fn refuse_parents_with_live_children(
        &self,
        selection: &mut Vec<Uuid>,
    ) -> DomainResult<Vec<Uuid>> {
        let selected: HashSet<Uuid> = selection.iter().copied().collect();
        let mut blocked: HashSet<Uuid> = HashSet::new();

        let ids: Vec<Uuid> = selection.clone();
        for chunk in ids.chunks(SQL_IN_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT parent_task_id, id FROM tasks WHERE parent_task_id IN ({placeholders})"
            );
            let mut query = sqlx::query_as::<_, (String, String)>(&sql);
            for id in chunk {
                query = query.bind(id.to_string());
            }

            for (parent, child) in query.fetch_all(self.pool()).await? {
                let parent = super::parse_uuid(&parent)?;
                let child = super::parse_uuid(&child)?;
                if !selected.contains(&child) {
                    blocked.insert(parent);
                }
            }
        }

        if blocked.is_empty() {
            return Ok(Vec::new());
        }

        selection.retain(|id| !blocked.contains(id));
        let mut refused: Vec<Uuid> = blocked.into_iter().collect();
        refused.sort();
        tracing::warn!(
            refused = refused.len(),
            "prune refused parents with live children outside the selection"
        );
        Ok(refused)
    }

    /// Expand the selection with all lineage descendants, ordered
    /// leaves-first, refusing when a non-selected descendant is still active.
    async fn expand_recursive_selection(&self, roots: &[Uuid]) -> DomainResult<Vec<Uuid>> {
        if roots.is_empty() {
            return Ok(Vec::new());
        }

        let root_set: HashSet<Uuid> = roots.iter().copied().collect();
        let mut ordered: Vec<(Uuid, i64, String)> = Vec::new();

        for chunk in roots.chunks(SQL_IN_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "WITH RECURSIVE subtree(id, lvl) AS (
                     SELECT id, 0 FROM tasks WHERE id IN ({placeholders})
                     UNION
                     SELECT t.id, s.lvl + 1 FROM tasks t
                         JOIN subtree s ON t.parent_task_id = s.id
                 )
                 SELECT s.id, MAX(s.lvl), t.status FROM subtree s
                     JOIN tasks t ON t.id = s.id
                     GROUP BY s.id
                     ORDER BY MAX(s.lvl) DESC"
            );
            let mut query = sqlx::query_as::<_, (String, i64, String)>(&sql);
            for id in chunk {
                query = query.bind(id.to_string());
            }

            for (id, lvl, status) in query.fetch_all(self.pool()).await? {
                ordered.push((super::parse_uuid(&id)?, lvl, status));
            }
        }

        let offenders: Vec<Uuid> = ordered
            .iter()
            .filter(|(id, _, status)| {
                !root_set.contains(id)
                    && TaskStatus::from_str(status).is_some_and(|s| !s.is_terminal())
            })
            .map(|(id, _, _)| *id)
            .collect();

        if !offenders.is_empty() {
            return Err(DomainError::Validation(format!(
                "Recursive prune refused: {} descendant task(s) are not in a terminal \
                 status: {:?}. Cancel or complete them first, or prune without --recursive.",
                offenders.len(),
                offenders
            )));
        }

        // Deepest first so children always precede their parents.
        ordered.sort_by(|a, b| b.1.cmp(&a.1));
        let mut seen = HashSet::new();
        Ok(ordered
            .into_iter()
            .filter(|(id, _, _)| seen.insert(*id))
            .map(|(id, _, _)| id)
            .collect())
    }

    async fn vacuum_and_measure(&self) -> DomainResult<u64> {
        let (page_count_before,): (i64,) = sqlx::query_as("PRAGMA page_count")
            .fetch_one(self.pool())
            .await?;
        let (page_size,): (i64,) = sqlx::query_as("PRAGMA page_size")
            .fetch_one(self.pool())
            .await?;

        self.pool().execute("VACUUM").await?;

        let (page_count_after,): (i64,) = sqlx::query_as("PRAGMA page_count")
            .fetch_one(self.pool())
            .await?;

        let before = page_count_before.saturating_mul(page_size);
        let after = page_count_after.saturating_mul(page_size);
        Ok(before.saturating_sub(after).max(0) as u64)
    }
}

struct DeleteStats {
    deleted_tasks: usize,
    deleted_dependencies: usize,
    breakdown_by_status: HashMap<TaskStatus, usize>,
}

/// Run the five-step referential sequence for every chunk, collecting stats.
async fn delete_selection(
    tx: &mut Transaction<'_, Sqlite>,
    selection: &[Uuid],
) -> DomainResult<DeleteStats> {
    let mut deleted_dependencies = 0usize;
    let mut breakdown_by_status: HashMap<TaskStatus, usize> = HashMap::new();

    for chunk in selection.chunks(SQL_IN_CHUNK) {
        let ids: Vec<String> = chunk.iter().map(Uuid::to_string).collect();
        let placeholders = vec!["?"; ids.len()].join(",");

        // Stats before deletion.
        let status_sql = format!(
            "SELECT status, COUNT(*) FROM tasks WHERE id IN ({placeholders}) GROUP BY status"
        );
        let mut status_query = sqlx::query_as::<_, (String, i64)>(&status_sql);
        for id in &ids {
            status_query = status_query.bind(id);
        }
        for (status, count) in status_query.fetch_all(&mut **tx).await? {
            if let Some(status) = TaskStatus::from_str(&status) {
                *breakdown_by_status.entry(status).or_insert(0) += count.max(0) as usize;
            }
        }

        let dep_count_sql = format!(
            "SELECT COUNT(*) FROM task_dependencies \
             WHERE prerequisite_task_id IN ({placeholders}) \
                OR dependent_task_id IN ({placeholders})"
        );
        let mut dep_query = sqlx::query_as::<_, (i64,)>(&dep_count_sql);
        for id in ids.iter().chain(ids.iter()) {
            dep_query = dep_query.bind(id);
        }
        let (dep_count,) = dep_query.fetch_one(&mut **tx).await?;
        deleted_dependencies += dep_count.max(0) as usize;

        // Step 1: orphan children.
        let orphan_sql = format!(
            "UPDATE tasks SET parent_task_id = NULL WHERE parent_task_id IN ({placeholders})"
        );
        let mut orphan = sqlx::query(&orphan_sql);
        for id in &ids {
            orphan = orphan.bind(id);
        }
        orphan.execute(&mut **tx).await?;

        // Step 2: detach audit rows before agents cascade.
        let detach_sql = format!(
            "UPDATE audit SET agent_id = NULL WHERE agent_id IN \
             (SELECT id FROM agents WHERE task_id IN ({placeholders}))"
        );
        let mut detach = sqlx::query(&detach_sql);
        for id in &ids {
            detach = detach.bind(id);
        }
        detach.execute(&mut **tx).await?;

        // Step 3: legacy state rows, no cascade.
        let state_sql = format!("DELETE FROM state WHERE task_id IN ({placeholders})");
        let mut state = sqlx::query(&state_sql);
        for id in &ids {
            state = state.bind(id);
        }
        state.execute(&mut **tx).await?;

        // Step 4: dependency edges touching the chunk.
        let edges_sql = format!(
            "DELETE FROM task_dependencies \
             WHERE prerequisite_task_id IN ({placeholders}) \
                OR dependent_task_id IN ({placeholders})"
        );
        let mut edges = sqlx::query(&edges_sql);
        for id in ids.iter().chain(ids.iter()) {
            edges = edges.bind(id);
        }
        edges.execute(&mut **tx).await?;

        // Step 5: the tasks themselves; agents and checkpoints cascade.
        let delete_sql = format!("DELETE FROM tasks WHERE id IN ({placeholders})");
        let mut tasks = sqlx::query(&delete_sql);
        for id in &ids {
            tasks = tasks.bind(id);
        }
        tasks.execute(&mut **tx).await?;
    }

    Ok(DeleteStats {
        deleted_tasks: selection.len(),
        deleted_dependencies,
        breakdown_by_status,
    })
}
