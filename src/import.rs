//! The import run: every selected dataset, one after the other, into a
//! single store.
//!
//! Datasets are loaded in the fixed order of [`recipes::all_recipes`].
//! The first failure aborts the run. Batches already committed for the
//! failing dataset, and every dataset before it, stay in the store.

use tracing::{info, info_span, Instrument};

use crate::config::Config;
use crate::db;
use crate::error::Result;
use crate::fetch::Fetch;
use crate::loader;
use crate::models::LoadStats;
use crate::recipes::{self, Recipe};

/// Run the import described by `config`, fetching through `fetcher`.
///
/// Dataset names are validated before the store is touched or anything is
/// fetched. Prints a short summary to stdout and returns the per-table
/// statistics.
pub async fn run_import(config: &Config, fetcher: &dyn Fetch) -> Result<Vec<LoadStats>> {
    let selected = recipes::select_recipes(&config.datasets)?;

    if config.db.recreate {
        db::recreate(&config.db.path)?;
    }
    let pool = db::connect(&config.db.path).await?;

    println!("import {}", config.db.path.display());
    let mut stats = Vec::with_capacity(selected.len());
    for recipe in &selected {
        let span = info_span!("dataset", table = recipe.table());
        let outcome = import_one(&pool, recipe.as_ref(), fetcher)
            .instrument(span)
            .await;
        match outcome {
            Ok(loaded) => {
                println!("  {}: {} records", loaded.table, loaded.records);
                stats.push(loaded);
            }
            Err(e) => {
                pool.close().await;
                return Err(e);
            }
        }
    }
    pool.close().await;
    println!("ok");

    Ok(stats)
}

async fn import_one(
    pool: &sqlx::SqlitePool,
    recipe: &dyn Recipe,
    fetcher: &dyn Fetch,
) -> Result<LoadStats> {
    info!("Importing {}", recipe.table());
    let stats = loader::load(pool, recipe.dataset(fetcher)).await?;
    if let Some(column) = recipe.full_text_column() {
        let indexed = loader::rebuild_fts(pool, recipe.table(), column).await?;
        info!("Indexed {} rows of {}.{}", indexed, recipe.table(), column);
    }
    Ok(stats)
}
