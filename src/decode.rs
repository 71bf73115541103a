//! Format decoders for CSV, JSON and HTML-table sources.
//!
//! Each decoder turns a raw response body into records keyed by field name.
//! Values are left as the format delivers them (CSV and HTML yield text);
//! numeric typing is [`crate::autocast`]'s job. Excel lives in
//! [`crate::xlsx`].

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::error::{ImportError, Result};
use crate::models::{Record, Value};

// ═══════════════════════════════════════════════════════════════════════
// CSV
// ═══════════════════════════════════════════════════════════════════════

/// How a CSV export is laid out on the wire.
#[derive(Debug, Clone, Copy)]
pub struct CsvFormat {
    /// WHATWG encoding label, e.g. `"utf-8"` or `"utf-16le"`.
    pub encoding: &'static str,
    /// Record separator the body is split on, e.g. `"\r\n"`.
    pub separator: &'static str,
    pub delimiter: u8,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self {
            encoding: "utf-8",
            separator: "\r\n",
            delimiter: b',',
        }
    }
}

/// Decode a CSV body into a lazy iterator of records keyed by the header row.
///
/// The whole body is decoded up front and split on `format.separator`.
/// This is a plain string split, not a CSV-aware line reader: a separator
/// inside a quoted field would break that row in two. None of the exports
/// this tool reads contain one.
///
/// Empty lines are skipped. Rows shorter than the header get null for the
/// missing columns; cells beyond the header are dropped.
pub fn decode_csv(bytes: &[u8], format: CsvFormat) -> Result<CsvRecords> {
    let encoding = encoding_rs::Encoding::for_label(format.encoding.as_bytes()).ok_or_else(|| {
        ImportError::Decode(format!("unknown text encoding '{}'", format.encoding))
    })?;
    let text = encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .ok_or_else(|| {
            ImportError::Decode(format!("body is not valid {}", encoding.name()))
        })?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(&*text);

    let mut lines = text
        .split(format.separator)
        .map(str::to_string)
        .collect::<Vec<_>>()
        .into_iter();

    let mut header = Vec::new();
    for line in lines.by_ref() {
        if let Some(fields) = parse_csv_line(&line, format.delimiter)? {
            header = fields;
            break;
        }
    }

    Ok(CsvRecords {
        header,
        lines,
        delimiter: format.delimiter,
    })
}

/// Iterator returned by [`decode_csv`]. Parses one line per step.
pub struct CsvRecords {
    header: Vec<String>,
    lines: std::vec::IntoIter<String>,
    delimiter: u8,
}

impl CsvRecords {
    pub fn header(&self) -> &[String] {
        &self.header
    }

    fn to_record(&self, fields: Vec<String>) -> Record {
        if fields.len() > self.header.len() {
            warn!(
                extra = fields.len() - self.header.len(),
                "dropping CSV cells beyond the header"
            );
        }
        let mut fields = fields.into_iter();
        self.header
            .iter()
            .map(|name| {
                let value = fields.next().map(Value::String).unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect()
    }
}

impl Iterator for CsvRecords {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            match parse_csv_line(&line, self.delimiter) {
                Ok(Some(fields)) => return Some(Ok(self.to_record(fields))),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Parse a single line. `None` for a line with no fields.
fn parse_csv_line(line: &str, delimiter: u8) -> Result<Option<Vec<String>>> {
    if line.is_empty() {
        return Ok(None);
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(line.as_bytes());

    let mut records = reader.records();
    let fields = match records.next() {
        Some(record) => record.map_err(ImportError::decode)?,
        None => return Ok(None),
    };
    if records.next().is_some() {
        warn!("line holds more than one CSV record; keeping the first");
    }
    Ok(Some(fields.iter().map(str::to_string).collect()))
}

// ═══════════════════════════════════════════════════════════════════════
// JSON
// ═══════════════════════════════════════════════════════════════════════

/// Parse the whole body as one JSON document.
pub fn decode_json(bytes: &[u8]) -> Result<Value> {
    Ok(serde_json::from_slice(bytes)?)
}

// ═══════════════════════════════════════════════════════════════════════
// HTML table
// ═══════════════════════════════════════════════════════════════════════

/// One data row of a code-list table, by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRow {
    pub group: String,
    pub code: String,
    pub name: String,
}

/// Decode the first `<table>` of an HTML page into `(group, code, name)` rows.
///
/// The first `<tr>` is the header and must have at least three cells; its
/// wording is not used, since the output is positional. Every later row
/// contributes its first three cells. The group column is run-length encoded
/// upstream: a blank group cell means "same group as the row above", so the
/// last non-blank group is carried forward. Rows with fewer than three cells
/// are skipped.
pub fn decode_html_table(bytes: &[u8]) -> Result<Vec<CodeRow>> {
    let html = std::str::from_utf8(bytes)
        .map_err(|e| ImportError::Decode(format!("HTML body is not UTF-8: {}", e)))?;
    let document = Html::parse_document(html);

    let table_sel = selector("table")?;
    let row_sel = selector("tr")?;
    let cell_sel = selector("td, th")?;

    let table = document
        .select(&table_sel)
        .next()
        .ok_or_else(|| ImportError::Decode("no <table> element found".to_string()))?;

    let mut rows = table.select(&row_sel);
    let headers = rows
        .next()
        .map(|row| cell_texts(row, &cell_sel))
        .ok_or_else(|| ImportError::Decode("table has no header row".to_string()))?;
    if headers.len() < 3 {
        return Err(ImportError::Decode(format!(
            "expected 3 header cells, found {}",
            headers.len()
        )));
    }
    debug!(?headers, "HTML table header");

    let mut group = String::new();
    let mut out = Vec::new();
    for row in rows {
        let mut cells = cell_texts(row, &cell_sel).into_iter();
        let (Some(first), Some(code), Some(name)) = (cells.next(), cells.next(), cells.next())
        else {
            continue;
        };
        if !first.is_empty() {
            group = first;
        }
        out.push(CodeRow {
            group: group.clone(),
            code,
            name,
        });
    }
    Ok(out)
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ImportError::Decode(format!("bad selector {}: {:?}", css, e)))
}

fn cell_texts(row: ElementRef<'_>, cell_sel: &Selector) -> Vec<String> {
    row.select(cell_sel)
        .map(|cell| cell.text().collect::<String>().trim().to_string())
        .collect()
}
