//! Abathur CLI entry point.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use abathur::adapters::sqlite::{initialize_database, SqliteTaskRepository};
use abathur::cli::commands::{init, status, swarm, task};
use abathur::cli::output::render_error;
use abathur::cli::{Cli, Commands};
use abathur::domain::errors::{DomainError, DomainResult};
use abathur::infrastructure::config::ConfigLoader;
use abathur::infrastructure::logging;
use abathur::services::{DependencyResolver, PriorityCalculator, TaskQueueService};

const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", render_error(&e));
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> DomainResult<ExitCode> {
    // Init runs before configuration exists.
    let command = match cli.command {
        Commands::Init {
            validate,
            db_path,
            skip_template,
        } => {
            init::execute(validate, db_path, skip_template, cli.json).await?;
            return Ok(ExitCode::SUCCESS);
        }
        other => other,
    };

    let config = ConfigLoader::load().map_err(|e| DomainError::Validation(e.to_string()))?;
    let _log_guard = logging::init(&config.logging)
        .map_err(|e| DomainError::Internal(e.to_string()))?;

    let database_url = format!("sqlite:{}", config.database.path);
    let pool = initialize_database(&database_url)
        .await
        .map_err(|e| DomainError::Internal(e.to_string()))?;

    let repo = Arc::new(SqliteTaskRepository::new(pool));
    let resolver = Arc::new(DependencyResolver::new(repo.clone()));
    let service = Arc::new(TaskQueueService::new(
        repo,
        resolver,
        PriorityCalculator::new(),
    ));

    match command {
        Commands::Init { .. } => unreachable!("handled above"),

        Commands::Status => {
            with_interrupt(status::execute(&service, cli.json)).await?;
        }

        Commands::Task(args) => {
            with_interrupt(task::execute(&service, args.command, cli.json)).await?;
        }

        Commands::Swarm(args) => {
            // The swarm installs its own ctrl-c handler for graceful drain.
            swarm::execute(service, args.command, &config.swarm, cli.json).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Run a short-lived command, mapping ctrl-c to exit code 130.
async fn with_interrupt(fut: impl std::future::Future<Output = DomainResult<()>>) -> DomainResult<()> {
    tokio::select! {
        result = fut => result,
        _ = tokio::signal::ctrl_c() => {
            std::process::exit(i32::from(EXIT_INTERRUPTED));
        }
    }
}
