//! Overall status: queue statistics plus workspace facts.

use crate::cli::commands::swarm::StatsOutput;
use crate::cli::output::output;
use crate::domain::errors::DomainResult;
use crate::services::TaskQueueService;

pub async fn execute(service: &TaskQueueService, json_mode: bool) -> DomainResult<()> {
    let stats = service.get_queue_status().await?;
    output(&StatsOutput { stats }, json_mode);
    Ok(())
}
