//! Run configuration.
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML
//! file (`--config`), the `LOGGING_LEVEL` environment variable, and the
//! command-line flags. Dataset URLs, field mappings and keys are not
//! configurable; they live in [`crate::recipes`].
//!
//! ```toml
//! datasets = ["species", "ninkode-2_3"]   # empty or absent: all
//!
//! [db]
//! path = "data/common.sqlite"
//! recreate = false
//!
//! [logging]
//! level = "INFO"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{ImportError, Result};

/// Environment variable holding the log level.
pub const LOGGING_LEVEL_ENV: &str = "LOGGING_LEVEL";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub db: DbConfig,
    pub logging: LoggingConfig,
    /// Tables to load. Empty means every dataset.
    pub datasets: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct DbConfig {
    pub path: PathBuf,
    /// Delete the store before loading anything.
    pub recreate: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("common.sqlite"),
            recreate: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "WARNING".to_string(),
        }
    }
}

impl Config {
    /// Apply `LOGGING_LEVEL` from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup(LOGGING_LEVEL_ENV).filter(|l| !l.trim().is_empty()) {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.db.path.as_os_str().is_empty() {
            return Err(ImportError::Configuration(
                "db.path must not be empty".to_string(),
            ));
        }
        crate::logging::filter_directive(&self.logging.level)?;
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ImportError::Configuration(format!(
            "failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    let config: Config = toml::from_str(&content).map_err(|e| {
        ImportError::Configuration(format!("failed to parse {}: {}", path.display(), e))
    })?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.db.path, PathBuf::from("common.sqlite"));
        assert!(!cfg.db.recreate);
        assert_eq!(cfg.logging.level, "WARNING");
        assert!(cfg.datasets.is_empty());
        cfg.validate().unwrap();
    }

    #[test]
    fn file_overrides_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("import.toml");
        std::fs::write(
            &path,
            "datasets = [\"species\"]\n[db]\npath = \"out/db.sqlite\"\n",
        )
        .unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.db.path, PathBuf::from("out/db.sqlite"));
        assert!(!cfg.db.recreate);
        assert_eq!(cfg.datasets, vec!["species"]);
        assert_eq!(cfg.logging.level, "WARNING");
    }

    #[test]
    fn bad_file_is_configuration_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("import.toml");
        std::fs::write(&path, "[db]\nurl = \"nope\"\n").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(ImportError::Configuration(_))
        ));
        assert!(matches!(
            load_config(&tmp.path().join("missing.toml")),
            Err(ImportError::Configuration(_))
        ));
    }

    #[test]
    fn env_overrides_file_level() {
        let mut cfg = Config::default();
        cfg.logging.level = "INFO".to_string();
        cfg.apply_env_with(|key| (key == LOGGING_LEVEL_ENV).then(|| "DEBUG".to_string()));
        assert_eq!(cfg.logging.level, "DEBUG");

        cfg.apply_env_with(|_| Some("  ".to_string()));
        assert_eq!(cfg.logging.level, "DEBUG");
    }

    #[test]
    fn invalid_level_fails_validation() {
        let mut cfg = Config::default();
        cfg.logging.level = "very loud".to_string();
        assert!(matches!(cfg.validate(), Err(ImportError::Configuration(_))));
    }
}
