//! Core data types that flow through the import pipeline.
//!
//! Values are dynamically typed: a decoded field can be text, a number, a
//! boolean, null, or (for JSON sources) a nested mapping or sequence.
//! [`serde_json::Value`] is that tagged variant, and with the
//! `preserve_order` feature its maps keep insertion order, which is what a
//! [`Record`] needs.

use futures::stream::BoxStream;

use crate::error::Result;

pub use serde_json::Value;

/// One row: an ordered mapping from field name to value.
pub type Record = serde_json::Map<String, Value>;

/// A lazy, single-pass sequence of records.
///
/// Not restartable: polling a fresh stream re-runs the pipeline from the
/// fetcher, including every network call.
pub type RecordStream<'a> = BoxStream<'a, Result<Record>>;

/// A dataset ready for loading: its table, its key column and its records.
pub struct Dataset<'a> {
    pub table: &'static str,
    /// Literal column name. Names with spaces are kept verbatim.
    pub primary_key: &'static str,
    pub records: RecordStream<'a>,
}

/// Outcome of loading one dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadStats {
    pub table: String,
    pub records: u64,
    pub columns: usize,
}

/// A row returned from the full-text index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub key: Value,
    pub text: String,
}
