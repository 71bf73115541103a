//! Excel (OOXML `.xlsx`) sheet decoding.
//!
//! An xlsx workbook is a ZIP archive of XML parts. To read one sheet by
//! name we resolve it through `xl/workbook.xml` (sheet name → relationship
//! id) and `xl/_rels/workbook.xml.rels` (relationship id → part path), load
//! the shared-string table, and walk the sheet's `<row>`/`<c>` elements.
//!
//! Cell typing follows the `t` attribute: shared strings, inline strings,
//! formula strings, booleans and errors become text or booleans; plain
//! numbers become integers when written without a fraction or exponent and
//! floats otherwise. Date-formatted numbers are not converted (that needs
//! the style sheet) and load as their serial number.

use std::io::{Cursor, Read};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{ImportError, Result};
use crate::models::{Record, Value};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 256 * 1024 * 1024;

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

/// Decode the sheet named `sheet` into records keyed by its first row.
///
/// Fails with [`ImportError::Decode`] if the bytes are not a workbook or
/// the sheet does not exist.
pub fn decode_excel(bytes: &[u8], sheet: &str) -> Result<SheetRecords> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ImportError::Decode(format!("not an xlsx workbook: {}", e)))?;

    let part = sheet_part(&mut archive, sheet)?;
    let shared_strings = read_shared_strings(&mut archive)?;
    let xml = read_zip_entry_bounded(&mut archive, &part, MAX_XML_ENTRY_BYTES)?;
    let mut rows = read_sheet_rows(&xml, &shared_strings)?.into_iter();

    let header = rows
        .next()
        .map(|row| row.into_iter().map(header_name).collect())
        .unwrap_or_default();

    Ok(SheetRecords { header, rows })
}

/// Iterator returned by [`decode_excel`].
///
/// Rows with no values at all are skipped; missing trailing cells read as
/// null; columns with a blank header are left out.
pub struct SheetRecords {
    header: Vec<Option<String>>,
    rows: std::vec::IntoIter<Vec<Value>>,
}

impl Iterator for SheetRecords {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            let row = self.rows.next()?;
            if row.iter().all(Value::is_null) {
                continue;
            }
            let record = self
                .header
                .iter()
                .enumerate()
                .filter_map(|(i, name)| {
                    let name = name.as_ref()?;
                    Some((name.clone(), row.get(i).cloned().unwrap_or(Value::Null)))
                })
                .collect();
            return Some(record);
        }
    }
}

fn header_name(cell: Value) -> Option<String> {
    match cell {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn ooxml_err(e: impl std::fmt::Display) -> ImportError {
    ImportError::Decode(format!("xlsx: {}", e))
}

fn read_zip_entry_bounded(archive: &mut Archive<'_>, name: &str, max_bytes: u64) -> Result<Vec<u8>> {
    let entry = archive.by_name(name).map_err(ooxml_err)?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(ooxml_err)?;
    if out.len() as u64 >= max_bytes {
        return Err(ooxml_err(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn attr(e: &BytesStart<'_>, local: &[u8]) -> Result<Option<String>> {
    for a in e.attributes() {
        let a = a.map_err(ooxml_err)?;
        if a.key.local_name().as_ref() == local {
            return Ok(Some(a.unescape_value().map_err(ooxml_err)?.into_owned()));
        }
    }
    Ok(None)
}

/// Resolve a sheet name to its part path inside the archive.
fn sheet_part(archive: &mut Archive<'_>, sheet: &str) -> Result<String> {
    let workbook = read_zip_entry_bounded(archive, "xl/workbook.xml", MAX_XML_ENTRY_BYTES)?;
    let mut reader = Reader::from_reader(workbook.as_slice());
    let mut buf = Vec::new();
    let mut rel_id = None;
    let mut available = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                let name = attr(&e, b"name")?.unwrap_or_default();
                if name == sheet {
                    rel_id = attr(&e, b"id")?;
                    break;
                }
                available.push(name);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    let rel_id = rel_id.ok_or_else(|| {
        ImportError::Decode(format!(
            "sheet '{}' not found (available: {})",
            sheet,
            available.join(", ")
        ))
    })?;

    let rels = read_zip_entry_bounded(archive, "xl/_rels/workbook.xml.rels", MAX_XML_ENTRY_BYTES)?;
    let mut reader = Reader::from_reader(rels.as_slice());
    buf.clear();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if attr(&e, b"Id")?.as_deref() == Some(rel_id.as_str()) {
                    let target = attr(&e, b"Target")?.unwrap_or_default();
                    return Ok(match target.strip_prefix('/') {
                        Some(absolute) => absolute.to_string(),
                        None => format!("xl/{}", target),
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Err(ooxml_err(format!("no relationship for sheet '{}'", sheet)))
}

/// Read `xl/sharedStrings.xml`. Workbooks without any text have none.
///
/// Rich-text entries (`<si><r><t>..</t></r>...</si>`) are concatenated.
fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>> {
    if archive.index_for_name("xl/sharedStrings.xml").is_none() {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    let mut in_phonetic = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => in_phonetic = true,
                b"t" => in_t = !in_phonetic,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().map_err(ooxml_err)?);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"rPh" => in_phonetic = false,
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Zero-based column index from a cell reference such as `"AB12"`.
fn column_index(reference: &str) -> Option<usize> {
    let letters = reference
        .bytes()
        .take_while(u8::is_ascii_alphabetic)
        .map(|b| b.to_ascii_uppercase());
    let mut index = 0usize;
    let mut seen = false;
    for b in letters {
        index = index * 26 + (b - b'A' + 1) as usize;
        seen = true;
    }
    seen.then(|| index - 1)
}

#[derive(Default)]
struct Cell {
    column: usize,
    kind: Option<String>,
    text: String,
    has_text: bool,
}

fn cell_value(cell: Cell, shared_strings: &[String]) -> Result<Value> {
    if !cell.has_text {
        return Ok(Value::Null);
    }
    let text = cell.text;
    Ok(match cell.kind.as_deref() {
        Some("s") => {
            let idx: usize = text
                .trim()
                .parse()
                .map_err(|_| ooxml_err(format!("bad shared string index '{}'", text)))?;
            let s = shared_strings
                .get(idx)
                .ok_or_else(|| ooxml_err(format!("shared string {} out of range", idx)))?;
            Value::String(s.clone())
        }
        Some("b") => Value::Bool(text.trim() == "1"),
        Some("inlineStr") | Some("str") | Some("e") | Some("d") => Value::String(text),
        _ => numeric_value(&text),
    })
}

fn numeric_value(text: &str) -> Value {
    let t = text.trim();
    if !t.contains(['.', 'e', 'E']) {
        if let Ok(i) = t.parse::<i64>() {
            return Value::Number(i.into());
        }
    }
    t.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(text.to_string()))
}

fn read_sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<Vec<Vec<Value>>> {
    let mut rows = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut row: Option<Vec<Value>> = None;
    let mut next_column = 0usize;
    let mut cell: Option<Cell> = None;
    let mut capture = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    row = Some(Vec::new());
                    next_column = 0;
                }
                b"c" => {
                    let column = attr(&e, b"r")?
                        .as_deref()
                        .and_then(column_index)
                        .unwrap_or(next_column);
                    cell = Some(Cell {
                        column,
                        kind: attr(&e, b"t")?,
                        ..Cell::default()
                    });
                }
                // <v> holds the value; <is><t> holds an inline string.
                b"v" | b"t" => capture = cell.is_some(),
                _ => {}
            },
            Ok(Event::Text(te)) if capture => {
                if let Some(c) = cell.as_mut() {
                    c.text.push_str(&te.unescape().map_err(ooxml_err)?);
                    c.has_text = true;
                }
            }
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"c" => {
                let column = attr(&e, b"r")?
                    .as_deref()
                    .and_then(column_index)
                    .unwrap_or(next_column);
                next_column = column + 1;
            }
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"row" => rows.push(Vec::new()),
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"c" => {
                    if let Some(c) = cell.take() {
                        let column = c.column;
                        next_column = column + 1;
                        let value = cell_value(c, shared_strings)?;
                        if let (Some(r), false) = (row.as_mut(), value.is_null()) {
                            if r.len() <= column {
                                r.resize(column + 1, Value::Null);
                            }
                            r[column] = value;
                        }
                    }
                }
                b"row" => {
                    if let Some(r) = row.take() {
                        rows.push(r);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

/// Builds minimal xlsx workbooks for tests.
#[cfg(test)]
pub(crate) mod fixture {
    use std::io::Write;

    /// One sheet per `(name, rows)`; every cell is written as an inline string
    /// unless it parses as a number.
    pub fn workbook(sheets: &[(&str, Vec<Vec<&str>>)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let opts = zip::write::SimpleFileOptions::default();

            let mut wb = String::from(
                "<?xml version=\"1.0\"?><workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" \
                 xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\"><sheets>",
            );
            let mut rels = String::from(
                "<?xml version=\"1.0\"?><Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
            );
            for (i, (name, _)) in sheets.iter().enumerate() {
                wb.push_str(&format!(
                    "<sheet name=\"{}\" sheetId=\"{}\" r:id=\"rId{}\"/>",
                    name,
                    i + 1,
                    i + 1
                ));
                rels.push_str(&format!(
                    "<Relationship Id=\"rId{}\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet\" Target=\"worksheets/sheet{}.xml\"/>",
                    i + 1,
                    i + 1
                ));
            }
            wb.push_str("</sheets></workbook>");
            rels.push_str("</Relationships>");

            zip.start_file("xl/workbook.xml", opts).unwrap();
            zip.write_all(wb.as_bytes()).unwrap();
            zip.start_file("xl/_rels/workbook.xml.rels", opts).unwrap();
            zip.write_all(rels.as_bytes()).unwrap();

            for (i, (_, rows)) in sheets.iter().enumerate() {
                let mut xml = String::from(
                    "<?xml version=\"1.0\"?><worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\"><sheetData>",
                );
                for (r, row) in rows.iter().enumerate() {
                    xml.push_str(&format!("<row r=\"{}\">", r + 1));
                    for (c, value) in row.iter().enumerate() {
                        let reference = format!("{}{}", (b'A' + c as u8) as char, r + 1);
                        if value.is_empty() {
                            continue;
                        }
                        if value.parse::<f64>().is_ok() {
                            xml.push_str(&format!("<c r=\"{}\"><v>{}</v></c>", reference, value));
                        } else {
                            xml.push_str(&format!(
                                "<c r=\"{}\" t=\"inlineStr\"><is><t>{}</t></is></c>",
                                reference, value
                            ));
                        }
                    }
                    xml.push_str("</row>");
                }
                xml.push_str("</sheetData></worksheet>");
                zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), opts)
                    .unwrap();
                zip.write_all(xml.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }
}
