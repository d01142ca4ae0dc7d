//! Embedded, forward-only schema migrations.
//!
//! Each migration is raw SQL applied at most once, tracked in a
//! `schema_migrations` version table. A migration that tightens an
//! ON DELETE clause declares an [`OrphanGuard`]; the migrator refuses to run
//! it while orphaned rows exist and reports a sample plus remediation
//! options instead of silently discarding data.

use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Failed to execute migration {version}: {source}")]
    ExecutionError {
        version: i64,
        #[source]
        source: sqlx::Error,
    },
    #[error("Failed to get schema version: {0}")]
    VersionCheckError(#[source] sqlx::Error),
    #[error(
        "Migration {version} refused: {count} orphaned row(s) in {table}.{column} \
         reference missing {parent} rows. Sample: {sample:?}.\n\
         Remediation options:\n\
         \x20 1. Delete the orphans:      DELETE FROM {table} WHERE {column} NOT IN (SELECT id FROM {parent});\n\
         \x20 2. Re-point them at a live {parent} row;\n\
         \x20 3. Restore the missing {parent} rows from backup.\n\
         Re-run after the data is consistent."
    )]
    OrphanedRows {
        version: i64,
        table: &'static str,
        column: &'static str,
        parent: &'static str,
        count: i64,
        sample: Vec<String>,
    },
}

/// Declarative pre-check for migrations that change ON DELETE behavior.
#[derive(Debug, Clone, Copy)]
pub struct OrphanGuard {
    pub table: &'static str,
    pub fk_column: &'static str,
    pub parent_table: &'static str,
}

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: String,
    pub sql: String,
    pub orphan_guard: Option<OrphanGuard>,
}

pub struct Migrator {
    pool: SqlitePool,
}

impl Migrator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply all pending migrations in version order. Returns how many ran.
    pub async fn run_embedded_migrations(
        &self,
        migrations: Vec<Migration>,
    ) -> Result<usize, MigrationError> {
        self.ensure_migrations_table().await?;
        let current_version = self.get_current_version().await?;
        let pending: Vec<_> = migrations
            .into_iter()
            .filter(|m| m.version > current_version)
            .collect();

        if pending.is_empty() {
            return Ok(0);
        }

        for migration in &pending {
            if let Some(guard) = &migration.orphan_guard {
                self.check_orphans(migration.version, guard).await?;
            }
            self.apply_migration(migration).await?;
            tracing::info!(
                version = migration.version,
                description = %migration.description,
                "applied schema migration"
            );
        }

        Ok(pending.len())
    }

    async fn ensure_migrations_table(&self) -> Result<(), MigrationError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now')),
                description TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MigrationError::ExecutionError {
            version: 0,
            source: e,
        })?;
        Ok(())
    }

    pub async fn get_current_version(&self) -> Result<i64, MigrationError> {
        let result: Option<(i64,)> =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_optional(&self.pool)
                .await
                .map_err(MigrationError::VersionCheckError)?;
        Ok(result.map_or(0, |(v,)| v))
    }

    async fn check_orphans(
        &self,
        version: i64,
        guard: &OrphanGuard,
    ) -> Result<(), MigrationError> {
        let query = format!(
            "SELECT {col} FROM {table} WHERE {col} IS NOT NULL \
             AND {col} NOT IN (SELECT id FROM {parent})",
            col = guard.fk_column,
            table = guard.table,
            parent = guard.parent_table,
        );
        let rows: Vec<(String,)> = sqlx::query_as(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrationError::ExecutionError { version, source: e })?;

        if rows.is_empty() {
            return Ok(());
        }

        let count = rows.len() as i64;
        let sample = rows.into_iter().take(5).map(|(id,)| id).collect();
        Err(MigrationError::OrphanedRows {
            version,
            table: guard.table,
            column: guard.fk_column,
            parent: guard.parent_table,
            count,
            sample,
        })
    }

    async fn apply_migration(&self, migration: &Migration) -> Result<(), MigrationError> {
        let applied = sqlx::raw_sql(&migration.sql).execute(&self.pool).await;

        // A script that disables foreign keys must not leave them off on any
        // exit path, including a mid-script failure.
        if applied.is_err() {
            let _ = sqlx::query("PRAGMA foreign_keys = ON")
                .execute(&self.pool)
                .await;
        }
        applied.map_err(|e| MigrationError::ExecutionError {
            version: migration.version,
            source: e,
        })?;

        sqlx::query("INSERT OR IGNORE INTO schema_migrations (version, description) VALUES (?, ?)")
            .bind(migration.version)
            .bind(&migration.description)
            .execute(&self.pool)
            .await
            .map_err(|e| MigrationError::ExecutionError {
                version: migration.version,
                source: e,
            })?;

        Ok(())
    }
}

pub fn all_embedded_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema".to_string(),
            sql: include_str!("../../../migrations/001_initial_schema.sql").to_string(),
            orphan_guard: None,
        },
        Migration {
            version: 2,
            description: "Checkpoint cascade on task delete".to_string(),
            sql: include_str!("../../../migrations/002_checkpoint_cascade.sql").to_string(),
            orphan_guard: Some(OrphanGuard {
                table: "checkpoints",
                fk_column: "task_id",
                parent_table: "tasks",
            }),
        },
    ]
}
