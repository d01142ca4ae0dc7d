//! Short ID prefix resolution, git-style.
//!
//! Any unique prefix of a task UUID is accepted wherever a task id is
//! expected. Zero matches and ambiguous prefixes are errors; ambiguity
//! lists the candidates.

use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::services::TaskQueueService;

/// Resolve a task id or prefix to a full UUID.
pub async fn resolve_task_id(service: &TaskQueueService, prefix: &str) -> DomainResult<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(prefix) {
        return Ok(uuid);
    }

    validate_prefix(prefix)?;

    let matches = service.find_ids_by_prefix(prefix).await?;
    match matches.len() {
        0 => Err(DomainError::PrefixNotFound(prefix.to_string())),
        1 => Ok(matches[0]),
        _ => Err(DomainError::AmbiguousPrefix {
            prefix: prefix.to_string(),
            candidates: matches.iter().map(Uuid::to_string).collect(),
        }),
    }
}

fn validate_prefix(prefix: &str) -> DomainResult<()> {
    if prefix.is_empty() {
        return Err(DomainError::Validation(
            "ID prefix must not be empty".to_string(),
        ));
    }
    if !prefix.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
        return Err(DomainError::Validation(format!(
            "Invalid ID prefix '{prefix}': must contain only hex characters and dashes"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_prefix() {
        assert!(validate_prefix("ab12").is_ok());
        assert!(validate_prefix("ab12-cd").is_ok());
        assert!(validate_prefix("").is_err());
        assert!(validate_prefix("xyz").is_err());
    }
}
