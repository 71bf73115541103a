//! # Artsdata Import CLI (`artsdata-import`)
//!
//! Loads every dataset (or the ones named with `--dataset`) into one
//! SQLite file.
//!
//! ## Usage
//!
//! ```bash
//! artsdata-import [--database_path <path>] [--recreate | --no-recreate]
//!                 [--config <file.toml>] [--dataset <table>]...
//! ```
//!
//! Flags override the config file, which overrides the defaults.
//! `LOGGING_LEVEL` sets the log level (default `WARNING`).

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use artsdata_import::config::{self, Config};
use artsdata_import::fetch::HttpFetcher;
use artsdata_import::{import, logging};

/// Fetch biodiversity datasets from artsdatabanken.no into SQLite.
#[derive(Parser)]
#[command(
    name = "artsdata-import",
    about = "Fetch common data from artsdatabanken.no into a SQLite database",
    version
)]
struct Cli {
    /// Path of the database file to create or update [default: common.sqlite]
    #[arg(long = "database_path", value_name = "PATH")]
    database_path: Option<PathBuf>,

    /// Delete the database before importing.
    #[arg(long, overrides_with = "no_recreate")]
    recreate: bool,

    /// Keep the existing database and upsert into it.
    #[arg(long = "no-recreate", overrides_with = "recreate")]
    no_recreate: bool,

    /// Optional TOML configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Only import this table. Repeat for several.
    #[arg(long = "dataset", value_name = "TABLE")]
    datasets: Vec<String>,
}

impl Cli {
    fn apply(&self, cfg: &mut Config) {
        if let Some(path) = &self.database_path {
            cfg.db.path = path.clone();
        }
        if self.recreate {
            cfg.db.recreate = true;
        } else if self.no_recreate {
            cfg.db.recreate = false;
        }
        if !self.datasets.is_empty() {
            cfg.datasets = self.datasets.clone();
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => config::load_config(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };
    cfg.apply_env();
    cli.apply(&mut cfg);
    cfg.validate()?;

    logging::init_logging(&cfg.logging.level)?;

    let fetcher = HttpFetcher::new()?;
    import::run_import(&cfg, &fetcher)
        .await
        .with_context(|| format!("import into {} failed", cfg.db.path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let cli = Cli::try_parse_from(std::iter::once("artsdata-import").chain(args.iter().copied()))
            .unwrap();
        let mut cfg = Config::default();
        cli.apply(&mut cfg);
        cfg
    }

    #[test]
    fn defaults_without_flags() {
        let cfg = parse(&[]);
        assert_eq!(cfg.db.path, PathBuf::from("common.sqlite"));
        assert!(!cfg.db.recreate);
        assert!(cfg.datasets.is_empty());
    }

    #[test]
    fn last_recreate_flag_wins() {
        assert!(parse(&["--no-recreate", "--recreate"]).db.recreate);
        assert!(!parse(&["--recreate", "--no-recreate"]).db.recreate);
    }

    #[test]
    fn database_path_and_datasets() {
        let cfg = parse(&[
            "--database_path",
            "out/x.sqlite",
            "--dataset",
            "species",
            "--dataset",
            "livsmedium",
        ]);
        assert_eq!(cfg.db.path, PathBuf::from("out/x.sqlite"));
        assert_eq!(cfg.datasets, vec!["species", "livsmedium"]);
    }
}
