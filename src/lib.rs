//! # Artsdata Import
//!
//! Fetches biodiversity reference datasets from artsdatabanken.no and
//! upserts them into a single SQLite file.
//!
//! Each dataset is a fixed recipe: fetch the upstream document, decode it
//! (CSV, Excel, JSON or an HTML table), turn numeric-looking text into
//! numbers, reshape the rows, and write them in batches keyed by the
//! dataset's primary key. Re-running the import updates rows in place.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌─────────────┐
//! │   Fetch     │──▶│  Recipe          │──▶│   Loader    │
//! │ HTTP/mock   │   │ decode+autocast  │   │ SQLite+FTS5 │
//! └─────────────┘   └──────────────────┘   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! artsdata-import                                 # all datasets into common.sqlite
//! artsdata-import --database_path data/a.sqlite --recreate
//! artsdata-import --dataset species --dataset fab-2018
//! LOGGING_LEVEL=INFO artsdata-import
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Defaults, TOML file and environment overrides |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`error`] | Error type shared by every stage |
//! | [`models`] | Records, datasets and load statistics |
//! | [`fetch`] | HTTP fetcher and the [`fetch::Fetch`] seam |
//! | [`autocast`] | Numeric-looking text to numbers |
//! | [`decode`] | CSV, JSON and HTML table decoders |
//! | [`xlsx`] | Excel workbook decoder |
//! | [`recipes`] | The per-dataset pipelines |
//! | [`db`] | Store connection and recreation |
//! | [`loader`] | Batched upserts, schema growth, full-text index |
//! | [`import`] | The whole run |

pub mod autocast;
pub mod config;
pub mod db;
pub mod decode;
pub mod error;
pub mod fetch;
pub mod import;
pub mod loader;
pub mod logging;
pub mod models;
pub mod recipes;
pub mod xlsx;

#[cfg(test)]
mod testing;
