//! Loading datasets into SQLite.
//!
//! Tables are created on first sight from the records themselves: the first
//! batch decides each column's type, and columns that only show up later
//! are added with `ALTER TABLE`. Rows are written with `INSERT OR REPLACE`
//! keyed by the dataset's primary key, so loading the same key twice leaves
//! one row holding the newer record.
//!
//! The species table also gets a trigram FTS5 shadow table
//! (`<table>_fts`), rebuilt from scratch after the table is loaded.

use futures::TryStreamExt;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqlitePool};
use sqlx::Row;
use tracing::{debug, info, warn};

use crate::error::{ImportError, Result};
use crate::models::{Dataset, LoadStats, Record, SearchHit, Value};

/// Records written per transaction. The first batch fixes the initial schema.
pub const BATCH_SIZE: usize = 100;

/// Quote an identifier for SQLite. Names are used verbatim, spaces included.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Column affinity for a value. Mappings and sequences are stored as JSON text.
fn column_type(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "INTEGER",
        Value::Number(n) if n.is_i64() => "INTEGER",
        Value::Number(n) if n.is_u64() => "TEXT",
        Value::Number(_) => "REAL",
        _ => "TEXT",
    }
}

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if n.is_u64() {
                // Wider than SQLite's INTEGER; keep every digit as text.
                query.bind(n.to_string())
            } else {
                query.bind(n.as_f64())
            }
        }
        Value::String(s) => query.bind(s.clone()),
        Value::Array(_) | Value::Object(_) => query.bind(value.to_string()),
    }
}

/// Column names of `table` in declaration order; empty if it does not exist.
pub async fn table_columns(pool: &SqlitePool, table: &str) -> Result<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?)")
        .bind(table)
        .fetch_all(pool)
        .await?;
    Ok(names)
}

/// Tracks the columns a table has while a dataset streams in.
struct TableSchema {
    table: String,
    primary_key: String,
    columns: Vec<String>,
}

impl TableSchema {
    async fn open(pool: &SqlitePool, table: &str, primary_key: &str) -> Result<Self> {
        Ok(Self {
            table: table.to_string(),
            primary_key: primary_key.to_string(),
            columns: table_columns(pool, table).await?,
        })
    }

    /// Create the table from `batch` if it is missing, then add any column
    /// the batch has and the table lacks.
    async fn ensure(&mut self, pool: &SqlitePool, batch: &[Record]) -> Result<()> {
        // First non-null value decides a column's type.
        let mut wanted: Vec<(String, Option<&'static str>)> = Vec::new();
        for record in batch {
            for (name, value) in record {
                let ty = (!value.is_null()).then(|| column_type(value));
                match wanted.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
                    Some((_, slot)) if slot.is_none() => *slot = ty,
                    Some(_) => {}
                    None => wanted.push((name.clone(), ty)),
                }
            }
        }
        let declared = |ty: Option<&'static str>| ty.unwrap_or("TEXT");

        if self.columns.is_empty() {
            let defs: Vec<String> = wanted
                .iter()
                .map(|(name, ty)| {
                    if name.eq_ignore_ascii_case(&self.primary_key) {
                        format!("{} {} PRIMARY KEY", quote_ident(name), declared(*ty))
                    } else {
                        format!("{} {}", quote_ident(name), declared(*ty))
                    }
                })
                .collect();
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                quote_ident(&self.table),
                defs.join(", ")
            );
            sqlx::query(&sql).execute(pool).await?;
            info!(table = %self.table, columns = defs.len(), "created table");
            self.columns = wanted.into_iter().map(|(name, _)| name).collect();
            return Ok(());
        }

        for (name, ty) in wanted {
            if self.columns.iter().any(|c| c.eq_ignore_ascii_case(&name)) {
                continue;
            }
            let sql = format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                quote_ident(&self.table),
                quote_ident(&name),
                declared(ty)
            );
            sqlx::query(&sql).execute(pool).await?;
            debug!(table = %self.table, column = %name, "added column");
            self.columns.push(name);
        }
        Ok(())
    }
}

/// Upsert every record of `dataset` into its table.
///
/// Consumes the dataset's stream; the first stream error aborts the load
/// with whatever earlier batches had already committed left in place.
pub async fn load(pool: &SqlitePool, dataset: Dataset<'_>) -> Result<LoadStats> {
    let Dataset {
        table,
        primary_key,
        mut records,
    } = dataset;

    let mut schema = TableSchema::open(pool, table, primary_key).await?;
    let mut batch: Vec<Record> = Vec::with_capacity(BATCH_SIZE);
    let mut written = 0u64;

    while let Some(record) = records.try_next().await? {
        match record.get(primary_key) {
            None | Some(Value::Null) => {
                return Err(ImportError::Shape(format!(
                    "record {} for '{}' has no value for primary key '{}'",
                    written + batch.len() as u64 + 1,
                    table,
                    primary_key
                )))
            }
            Some(_) => batch.push(record),
        }
        if batch.len() == BATCH_SIZE {
            written += write_batch(pool, &mut schema, &batch).await?;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        written += write_batch(pool, &mut schema, &batch).await?;
    }

    info!(table, records = written, "loaded");
    Ok(LoadStats {
        table: table.to_string(),
        records: written,
        columns: schema.columns.len(),
    })
}

async fn write_batch(pool: &SqlitePool, schema: &mut TableSchema, batch: &[Record]) -> Result<u64> {
    schema.ensure(pool, batch).await?;

    let mut tx = pool.begin().await?;
    for record in batch {
        let fields = fold_case(record);
        let columns: Vec<String> = fields.iter().map(|(k, _)| quote_ident(k)).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            quote_ident(&schema.table),
            columns.join(", "),
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for (_, value) in fields {
            query = bind_value(query, value);
        }
        query.execute(&mut *tx).await?;
    }
    tx.commit().await?;

    debug!(table = %schema.table, records = batch.len(), "committed batch");
    Ok(batch.len() as u64)
}

/// A record's fields with names that differ only in ASCII case merged, since
/// SQLite column names are case-insensitive. The first spelling keeps its
/// position; the last value wins.
fn fold_case(record: &Record) -> Vec<(&str, &Value)> {
    let mut fields: Vec<(&str, &Value)> = Vec::with_capacity(record.len());
    for (name, value) in record {
        match fields.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(slot) => slot.1 = value,
            None => fields.push((name.as_str(), value)),
        }
    }
    fields
}

/// Drop and rebuild the trigram full-text index over `table.column`.
///
/// The index is an external-content FTS5 table named `<table>_fts` whose
/// rowids are the table's rowids. Must run after the table load committed.
/// Returns the number of indexed rows. A table that was never created, or
/// has no such column, leaves no index behind and indexes nothing.
pub async fn rebuild_fts(pool: &SqlitePool, table: &str, column: &str) -> Result<u64> {
    let fts = format!("{}_fts", table);

    sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote_ident(&fts)))
        .execute(pool)
        .await?;

    let columns = table_columns(pool, table).await?;
    if !columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
        warn!(table, column, "nothing to index");
        return Ok(0);
    }

    sqlx::query(&format!(
        "CREATE VIRTUAL TABLE {} USING fts5({}, content={}, tokenize='trigram')",
        quote_ident(&fts),
        quote_ident(column),
        quote_literal(table)
    ))
    .execute(pool)
    .await?;

    let result = sqlx::query(&format!(
        "INSERT INTO {fts}(rowid, {col}) SELECT rowid, {col} FROM {table}",
        fts = quote_ident(&fts),
        col = quote_ident(column),
        table = quote_ident(table)
    ))
    .execute(pool)
    .await?;

    info!(table = %fts, rows = result.rows_affected(), "rebuilt full-text index");
    Ok(result.rows_affected())
}

/// Search the `<table>_fts` index for `term` as a phrase.
///
/// Returns the matching rows' primary-key values with the indexed text,
/// best match first. Trigram matching needs at least three characters.
pub async fn search_fts(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    primary_key: &str,
    term: &str,
    limit: i64,
) -> Result<Vec<SearchHit>> {
    let fts = quote_ident(&format!("{}_fts", table));
    let sql = format!(
        r#"
        SELECT t.{pk} AS key, t.{col} AS text
        FROM {fts}
        JOIN {table} t ON t.rowid = {fts}.rowid
        WHERE {fts} MATCH ?
        ORDER BY rank
        LIMIT ?
        "#,
        pk = quote_ident(primary_key),
        col = quote_ident(column),
        fts = fts,
        table = quote_ident(table)
    );
    let phrase = format!("\"{}\"", term.replace('"', "\"\""));

    let rows = sqlx::query(&sql)
        .bind(phrase)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| {
            let key = if let Ok(i) = row.try_get::<i64, _>("key") {
                Value::from(i)
            } else if let Ok(f) = row.try_get::<f64, _>("key") {
                Value::from(f)
            } else {
                Value::from(row.try_get::<String, _>("key")?)
            };
            let text: Option<String> = row.try_get("text")?;
            Ok(SearchHit {
                key,
                text: text.unwrap_or_default(),
            })
        })
        .collect()
}
