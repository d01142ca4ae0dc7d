//! Workspace initialization and validation.

use std::path::Path;

use serde_json::json;

use crate::adapters::sqlite::{
    all_embedded_migrations, initialize_database, Migrator, SqliteTaskRepository,
};
use crate::cli::output::{output, CommandOutput};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::TaskRepository;

struct InitOutput {
    message: String,
    payload: serde_json::Value,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }

    fn to_json(&self) -> serde_json::Value {
        self.payload.clone()
    }
}

pub async fn execute(
    validate: bool,
    db_path: Option<String>,
    skip_template: bool,
    json_mode: bool,
) -> DomainResult<()> {
    let db_path = db_path.unwrap_or_else(|| ".abathur/abathur.db".to_string());
    let database_url = format!("sqlite:{db_path}");

    if validate {
        return run_validation(&database_url, &db_path, json_mode).await;
    }

    std::fs::create_dir_all(".abathur")
        .map_err(|e| DomainError::StorageIo(format!("cannot create .abathur: {e}")))?;

    let config_path = Path::new(".abathur/config.yaml");
    let mut created_config = false;
    if !config_path.exists() {
        let config = crate::infrastructure::config::Config::default();
        let yaml = serde_yaml::to_string(&config)
            .map_err(|e| DomainError::Serialization(e.to_string()))?;
        std::fs::write(config_path, yaml)
            .map_err(|e| DomainError::StorageIo(format!("cannot write config.yaml: {e}")))?;
        created_config = true;
    }

    let pool = initialize_database(&database_url)
        .await
        .map_err(|e| DomainError::Internal(e.to_string()))?;
    let version = Migrator::new(pool)
        .get_current_version()
        .await
        .map_err(|e| DomainError::Internal(e.to_string()))?;

    if skip_template {
        tracing::info!("workspace template materialization skipped");
    }

    output(
        &InitOutput {
            message: format!(
                "Initialized workspace: database {db_path} at schema version {version}{}",
                if created_config {
                    ", wrote .abathur/config.yaml"
                } else {
                    ""
                }
            ),
            payload: json!({
                "database": db_path,
                "schema_version": version,
                "created_config": created_config,
                "skip_template": skip_template,
            }),
        },
        json_mode,
    );
    Ok(())
}

async fn run_validation(database_url: &str, db_path: &str, json_mode: bool) -> DomainResult<()> {
    if !Path::new(db_path).exists() {
        return Err(DomainError::Validation(format!(
            "Database {db_path} does not exist; run 'abathur init' first"
        )));
    }

    let pool = initialize_database(database_url)
        .await
        .map_err(|e| DomainError::Internal(e.to_string()))?;

    let version = Migrator::new(pool.clone())
        .get_current_version()
        .await
        .map_err(|e| DomainError::Internal(e.to_string()))?;
    let expected = all_embedded_migrations()
        .last()
        .map_or(0, |m| m.version);
    if version != expected {
        return Err(DomainError::Validation(format!(
            "Schema version {version} does not match expected {expected}"
        )));
    }

    let repo = SqliteTaskRepository::new(pool);
    let violations = repo.foreign_key_check().await?;
    if !violations.is_empty() {
        return Err(DomainError::StorageIntegrity(format!(
            "Foreign key check failed:\n  {}",
            violations.join("\n  ")
        )));
    }

    output(
        &InitOutput {
            message: format!("Workspace valid: schema version {version}, integrity OK"),
            payload: json!({
                "database": db_path,
                "schema_version": version,
                "integrity": "ok",
            }),
        },
        json_mode,
    );
    Ok(())
}
