//! Process-wide logging setup.
//!
//! The level is set once, at start-up, from `LOGGING_LEVEL` (default
//! `WARNING`). Python-style names (`WARNING`, `CRITICAL`, `NOTSET`) are
//! accepted next to the usual `tracing` ones, and anything else is handed
//! to [`EnvFilter`] as a directive string such as
//! `artsdata_import=debug,sqlx=warn`. Logs go to stderr; stdout carries
//! only the import summary.

use tracing_subscriber::EnvFilter;

use crate::error::{ImportError, Result};

/// Translate a level name into an [`EnvFilter`] directive.
pub fn filter_directive(level: &str) -> Result<String> {
    let trimmed = level.trim();
    let directive = match trimmed.to_ascii_uppercase().as_str() {
        "CRITICAL" | "FATAL" | "ERROR" => "error".to_string(),
        "WARNING" | "WARN" => "warn".to_string(),
        "INFO" => "info".to_string(),
        "DEBUG" => "debug".to_string(),
        "TRACE" | "NOTSET" => "trace".to_string(),
        "OFF" => "off".to_string(),
        _ => trimmed.to_string(),
    };
    EnvFilter::try_new(&directive).map_err(|e| {
        ImportError::Configuration(format!("invalid log level '{}': {}", level, e))
    })?;
    Ok(directive)
}

/// Install the global subscriber. Call once, before any work starts.
pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(filter_directive(level)?)
        .map_err(|e| ImportError::Configuration(e.to_string()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| ImportError::Configuration(format!("logging already initialized: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_level_names() {
        assert_eq!(filter_directive("WARNING").unwrap(), "warn");
        assert_eq!(filter_directive("critical").unwrap(), "error");
        assert_eq!(filter_directive(" Debug ").unwrap(), "debug");
        assert_eq!(filter_directive("NOTSET").unwrap(), "trace");
    }

    #[test]
    fn directives_pass_through() {
        assert_eq!(
            filter_directive("artsdata_import=debug,sqlx=warn").unwrap(),
            "artsdata_import=debug,sqlx=warn"
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(filter_directive("=[").is_err());
    }
}
