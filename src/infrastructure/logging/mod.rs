//! Structured logging via `tracing`.
//!
//! Stdout gets the configured format (pretty or JSON); when a log directory
//! is set, a daily-rotated file additionally receives JSON lines. The
//! returned guard must stay alive for the non-blocking file writer to flush.

use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::infrastructure::config::LogSettings;

pub struct LogGuard {
    _guard: Option<WorkerGuard>,
}

/// Initialize the global tracing subscriber from settings.
pub fn init(settings: &LogSettings) -> Result<LogGuard> {
    let default_level = parse_log_level(&settings.level)?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let json_stdout = (settings.format == "json")
        .then(|| tracing_subscriber::fmt::layer().json().with_target(true));
    let pretty_stdout = (settings.format != "json")
        .then(|| tracing_subscriber::fmt::layer().with_target(false));

    let (file_layer, guard) = match &settings.log_dir {
        Some(log_dir) => {
            let appender = rolling::daily(log_dir, "abathur.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_stdout)
        .with(pretty_stdout)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logging: {e}"))?;

    Ok(LogGuard { _guard: guard })
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(anyhow!(
            "invalid log level '{other}': must be one of trace, debug, info, warn, error"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("info").unwrap(), Level::INFO);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert!(parse_log_level("loud").is_err());
    }
}
