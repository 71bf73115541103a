//! Dataset recipes.
//!
//! A recipe is a fixed pipeline for one upstream dataset:
//! fetch → decode → [`autocast`] → reshape. Each recipe hands back a lazy
//! [`RecordStream`]; nothing is fetched until the stream is first polled,
//! and polling a second stream fetches everything again.
//!
//! | Table | Format | Reshape | Key |
//! |-------|--------|---------|-----|
//! | `species` | JSON, one request per taxon group | scalar fields only | `Id` |
//! | `fab-2018` | CSV (UTF-16LE, `;`) | none | `Id` |
//! | `fab-2023` | Excel | none | `Id for vurderingen` |
//! | `rødlista-2021` | Excel | none | `Id` |
//! | `ninkode-2_2`, `ninkode-2_3`, `ninkode-3_0` | JSON | code hierarchy | `KodeId` |
//! | `livsmedium` | HTML table | group/code/name | `Kode` |
//! | `naturtyper-2_3` | JSON | code + description | `KodeId` |

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

use crate::autocast::{autocast, autocast_record};
use crate::decode::{decode_csv, decode_html_table, decode_json, CodeRow, CsvFormat};
use crate::error::{ImportError, Result};
use crate::fetch::Fetch;
use crate::models::{Dataset, Record, RecordStream, Value};
use crate::xlsx::decode_excel;

pub const TAXON_GROUPS_URL: &str =
    "https://artskart.artsdatabanken.no/publicapi/api/lookup?context=taxongroup";

/// Taxa of one group; `{}` is replaced by the group key.
pub const SPECIES_BY_GROUP_URL: &str =
    "https://artskart.artsdatabanken.no/publicapi/api/taxon?term=&taxonGroups={}&take=-1";

// ═══════════════════════════════════════════════════════════════════════
// Recipe trait
// ═══════════════════════════════════════════════════════════════════════

/// One upstream dataset and how to turn it into table rows.
pub trait Recipe: Send + Sync {
    /// Destination table.
    fn table(&self) -> &'static str;

    /// Literal primary-key column name.
    fn primary_key(&self) -> &'static str;

    /// Column to build the full-text index over after loading, if any.
    fn full_text_column(&self) -> Option<&'static str> {
        None
    }

    /// The lazy record stream. Single-pass: each call re-runs the pipeline.
    fn records<'a>(&'a self, fetcher: &'a dyn Fetch) -> RecordStream<'a>;

    fn dataset<'a>(&'a self, fetcher: &'a dyn Fetch) -> Dataset<'a> {
        Dataset {
            table: self.table(),
            primary_key: self.primary_key(),
            records: self.records(fetcher),
        }
    }
}

/// Fetch `url` on first poll, decode the body, and stream the rows.
fn fetched<'a, F, I>(fetcher: &'a dyn Fetch, url: String, decode: F) -> RecordStream<'a>
where
    F: FnOnce(Vec<u8>) -> Result<I> + Send + 'a,
    I: Iterator<Item = Result<Record>> + Send + 'a,
{
    stream::once(async move {
        let body = fetcher.fetch(&url).await?;
        decode(body).map(stream::iter)
    })
    .try_flatten()
    .boxed()
}

/// A JSON document that must be an array of objects.
fn json_records(value: Value, what: &str) -> Result<Vec<Record>> {
    let Value::Array(items) = value else {
        return Err(ImportError::Shape(format!("{}: expected a JSON array", what)));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(record) => Ok(record),
            other => Err(ImportError::Shape(format!(
                "{}: expected JSON objects, found {}",
                what, other
            ))),
        })
        .collect()
}

/// `map[key]`, failing with a shape error naming `path` when the key is absent.
fn required(map: &Record, key: &str, path: &str) -> Result<Value> {
    map.get(key)
        .cloned()
        .ok_or_else(|| ImportError::Shape(format!("missing field {}", path)))
}

fn nested<'v>(map: &'v Record, key: &str) -> Option<&'v Record> {
    map.get(key).and_then(Value::as_object)
}

// ═══════════════════════════════════════════════════════════════════════
// Species (fan-out over taxon groups)
// ═══════════════════════════════════════════════════════════════════════

/// The taxon-group lookup table, normalized.
pub fn taxon_groups(fetcher: &dyn Fetch) -> RecordStream<'_> {
    fetched(fetcher, TAXON_GROUPS_URL.to_string(), |body| {
        let rows = json_records(decode_json(&body)?, "taxon groups")?;
        Ok(rows.into_iter().map(|r| Ok(autocast_record(r))))
    })
}

/// The text form of a taxon group's `Key`, as used in the taxon query.
fn group_key(group: &Record) -> Result<String> {
    match group.get("Key") {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(ImportError::Shape("taxon group without Key".to_string())),
    }
}

/// Drop every field whose value is a mapping or a sequence.
pub fn scalar_fields(record: Record) -> Record {
    record
        .into_iter()
        .filter(|(_, value)| !value.is_object() && !value.is_array())
        .collect()
}

async fn species_in_group(fetcher: &dyn Fetch, key: String) -> Result<Vec<Record>> {
    let url = SPECIES_BY_GROUP_URL.replace("{}", &key);
    let body = fetcher.fetch(&url).await?;
    let rows = json_records(decode_json(&body)?, "taxa")?;
    debug!(group = %key, taxa = rows.len(), "decoded taxon group");
    Ok(rows
        .into_iter()
        .map(|r| scalar_fields(autocast_record(r)))
        .collect())
}

/// All taxa, one request per taxon group, flattened to scalar fields.
///
/// Groups are fetched one after another; the next group's request is only
/// made once the previous group's rows have been consumed.
pub struct SpeciesRecipe;

impl Recipe for SpeciesRecipe {
    fn table(&self) -> &'static str {
        "species"
    }

    fn primary_key(&self) -> &'static str {
        "Id"
    }

    fn full_text_column(&self) -> Option<&'static str> {
        Some("ScientificName")
    }

    fn records<'a>(&'a self, fetcher: &'a dyn Fetch) -> RecordStream<'a> {
        taxon_groups(fetcher)
            .and_then(|group| async move { group_key(&group) })
            .and_then(move |key| species_in_group(fetcher, key))
            .map_ok(|rows| stream::iter(rows.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tabular exports (CSV / Excel)
// ═══════════════════════════════════════════════════════════════════════

/// A CSV export loaded as-is after normalization.
pub struct CsvRecipe {
    pub table: &'static str,
    pub url: &'static str,
    pub format: CsvFormat,
    pub primary_key: &'static str,
}

/// Fremmedartslista 2018 (alien species assessments).
pub const FAB_2018: CsvRecipe = CsvRecipe {
    table: "fab-2018",
    url: "https://artsdatabanken.no/Fab2018/api/export/csv",
    format: CsvFormat {
        encoding: "utf-16le",
        separator: "\r\n",
        delimiter: b';',
    },
    primary_key: "Id",
};

impl Recipe for CsvRecipe {
    fn table(&self) -> &'static str {
        self.table
    }

    fn primary_key(&self) -> &'static str {
        self.primary_key
    }

    fn records<'a>(&'a self, fetcher: &'a dyn Fetch) -> RecordStream<'a> {
        let format = self.format;
        fetched(fetcher, self.url.to_string(), move |body| {
            let rows = decode_csv(&body, format)?;
            Ok(rows.map(|row| row.map(autocast_record)))
        })
    }
}

/// One sheet of an Excel export loaded as-is after normalization.
pub struct ExcelRecipe {
    pub table: &'static str,
    pub url: &'static str,
    pub sheet: &'static str,
    pub primary_key: &'static str,
}

/// Fremmedartslista 2023. The key column's upstream name contains spaces.
pub const FAB_2023: ExcelRecipe = ExcelRecipe {
    table: "fab-2023",
    url: "https://lister.artsdatabanken.no/fremmedartslista/2023/export/excel",
    sheet: "Vurderinger",
    primary_key: "Id for vurderingen",
};

/// Norsk rødliste for arter 2021 (red list).
pub const RODLISTA_2021: ExcelRecipe = ExcelRecipe {
    table: "rødlista-2021",
    url: "https://artsdatabanken.no/lister/rodlisteforarter/2021?Export=true",
    sheet: "Vurderinger",
    primary_key: "Id",
};

impl Recipe for ExcelRecipe {
    fn table(&self) -> &'static str {
        self.table
    }

    fn primary_key(&self) -> &'static str {
        self.primary_key
    }

    fn records<'a>(&'a self, fetcher: &'a dyn Fetch) -> RecordStream<'a> {
        let sheet = self.sheet;
        fetched(fetcher, self.url.to_string(), move |body| {
            let rows = decode_excel(&body, sheet)?;
            Ok(rows.map(|row| Ok(autocast_record(row))))
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// NiN codes (version dispatch)
// ═══════════════════════════════════════════════════════════════════════

/// Upstream JSON layout of a NiN code list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NinShape {
    /// Array of `{Kode: {Id, Definisjon}, Overordnet: {Kode: {Id}}, Navn, Kategori}`.
    Legacy,
    /// Object with a `Koder` array of flat entries.
    V3,
}

/// `(version, table, url, shape)` for every supported NiN release.
const NIN_VERSIONS: &[(&str, &str, &str, NinShape)] = &[
    (
        "2.2",
        "ninkode-2_2",
        "https://nin-kode-api.artsdatabanken.no/v2.2/koder/allekoder",
        NinShape::Legacy,
    ),
    (
        "2.3",
        "ninkode-2_3",
        "https://nin-kode-api.artsdatabanken.no/v2.3/koder/allekoder",
        NinShape::Legacy,
    ),
    (
        "3.0",
        "ninkode-3_0",
        "https://nin-kode-api.artsdatabanken.no/v3.0/koder/allekoder",
        NinShape::V3,
    ),
];

/// NiN code hierarchy for one release.
///
/// Rows are `{KodeId, KodeDefinisjon, OverordnetKodeId, Navn, Kategori}`;
/// `OverordnetKodeId` is null for roots. Parent ids are not checked against
/// the rest of the list.
#[derive(Debug)]
pub struct NinKodeRecipe {
    version: &'static str,
    table: &'static str,
    url: &'static str,
    shape: NinShape,
}

impl NinKodeRecipe {
    /// Select the release. Unknown versions fail here, before any request.
    pub fn new(version: &str) -> Result<Self> {
        NIN_VERSIONS
            .iter()
            .find(|(v, ..)| *v == version)
            .map(|&(version, table, url, shape)| Self {
                version,
                table,
                url,
                shape,
            })
            .ok_or_else(|| {
                let known: Vec<&str> = NIN_VERSIONS.iter().map(|(v, ..)| *v).collect();
                ImportError::Configuration(format!(
                    "unsupported NiN version '{}' (supported: {})",
                    version,
                    known.join(", ")
                ))
            })
    }

    pub fn version(&self) -> &str {
        self.version
    }

    pub fn shape(&self) -> NinShape {
        self.shape
    }
}

fn code_entry(id: Value, definition: Value, parent: Value, name: Value, category: Value) -> Record {
    let mut out = Record::new();
    out.insert("KodeId".into(), id);
    out.insert("KodeDefinisjon".into(), definition);
    out.insert("OverordnetKodeId".into(), parent);
    out.insert("Navn".into(), name);
    out.insert("Kategori".into(), category);
    out
}

/// Flatten one legacy entry. `Overordnet` may be absent or null for roots.
pub fn legacy_code_entry(row: &Record) -> Result<Record> {
    let kode =
        nested(row, "Kode").ok_or_else(|| ImportError::Shape("missing field Kode".to_string()))?;
    let parent = nested(row, "Overordnet")
        .and_then(|o| nested(o, "Kode"))
        .and_then(|k| k.get("Id"))
        .cloned()
        .unwrap_or(Value::Null);
    Ok(code_entry(
        required(kode, "Id", "Kode.Id")?,
        required(kode, "Definisjon", "Kode.Definisjon")?,
        parent,
        required(row, "Navn", "Navn")?,
        required(row, "Kategori", "Kategori")?,
    ))
}

/// Rename one v3 entry. Definition and parent are optional upstream.
pub fn v3_code_entry(row: &Record) -> Result<Record> {
    Ok(code_entry(
        required(row, "KodeId", "Koder[].KodeId")?,
        row.get("Definisjon").cloned().unwrap_or(Value::Null),
        row.get("OverordnetKodeId").cloned().unwrap_or(Value::Null),
        required(row, "Navn", "Koder[].Navn")?,
        required(row, "Kategori", "Koder[].Kategori")?,
    ))
}

fn nin_records(document: Value, shape: NinShape) -> Result<Vec<Record>> {
    match shape {
        NinShape::Legacy => json_records(document, "NiN codes")?
            .iter()
            .map(legacy_code_entry)
            .collect(),
        NinShape::V3 => {
            let Value::Object(mut root) = document else {
                return Err(ImportError::Shape(
                    "NiN 3 codes: expected a JSON object".to_string(),
                ));
            };
            let koder = root
                .remove("Koder")
                .ok_or_else(|| ImportError::Shape("missing field Koder".to_string()))?;
            json_records(koder, "NiN 3 codes")?
                .iter()
                .map(v3_code_entry)
                .collect()
        }
    }
}

impl Recipe for NinKodeRecipe {
    fn table(&self) -> &'static str {
        self.table
    }

    fn primary_key(&self) -> &'static str {
        "KodeId"
    }

    fn records<'a>(&'a self, fetcher: &'a dyn Fetch) -> RecordStream<'a> {
        let shape = self.shape;
        fetched(fetcher, self.url.to_string(), move |body| {
            let document = autocast(decode_json(&body)?);
            Ok(nin_records(document, shape)?.into_iter().map(Ok))
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Livsmedium (HTML table)
// ═══════════════════════════════════════════════════════════════════════

/// The life-medium code list, published only as an HTML table.
pub struct LivsmediumRecipe;

pub const LIVSMEDIUM_URL: &str = "https://artsdatabanken.no/nin/livsmedium/koder";

/// Fixed column names; the page's own header wording varies.
fn livsmedium_row(row: CodeRow) -> Record {
    let mut out = Record::new();
    out.insert("Gruppe".into(), Value::String(row.group));
    out.insert("Kode".into(), Value::String(row.code));
    out.insert("Navn".into(), Value::String(row.name));
    out
}

impl Recipe for LivsmediumRecipe {
    fn table(&self) -> &'static str {
        "livsmedium"
    }

    fn primary_key(&self) -> &'static str {
        "Kode"
    }

    fn records<'a>(&'a self, fetcher: &'a dyn Fetch) -> RecordStream<'a> {
        fetched(fetcher, LIVSMEDIUM_URL.to_string(), |body| {
            let rows = decode_html_table(&body)?;
            Ok(rows
                .into_iter()
                .map(|row| Ok(autocast_record(livsmedium_row(row)))))
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Habitat type descriptions
// ═══════════════════════════════════════════════════════════════════════

/// NiN 2.3 habitat type descriptions: `{KodeId, Navn, Beskrivelse}`.
pub struct NaturtypeRecipe;

pub const NATURTYPER_URL: &str = "https://nin-kode-api.artsdatabanken.no/v2.3/typer/allebeskrivelser";

pub fn naturtype_entry(row: &Record) -> Result<Record> {
    let kode =
        nested(row, "Kode").ok_or_else(|| ImportError::Shape("missing field Kode".to_string()))?;
    let mut out = Record::new();
    out.insert("KodeId".into(), required(kode, "Id", "Kode.Id")?);
    out.insert("Navn".into(), required(row, "Navn", "Navn")?);
    out.insert(
        "Beskrivelse".into(),
        row.get("Beskrivelse").cloned().unwrap_or(Value::Null),
    );
    Ok(out)
}

impl Recipe for NaturtypeRecipe {
    fn table(&self) -> &'static str {
        "naturtyper-2_3"
    }

    fn primary_key(&self) -> &'static str {
        "KodeId"
    }

    fn records<'a>(&'a self, fetcher: &'a dyn Fetch) -> RecordStream<'a> {
        fetched(fetcher, NATURTYPER_URL.to_string(), |body| {
            let rows = json_records(autocast(decode_json(&body)?), "habitat descriptions")?;
            let entries = rows
                .iter()
                .map(naturtype_entry)
                .collect::<Result<Vec<_>>>()?;
            Ok(entries.into_iter().map(Ok))
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Every dataset, in load order.
pub fn all_recipes() -> Result<Vec<Box<dyn Recipe>>> {
    let mut recipes: Vec<Box<dyn Recipe>> = vec![
        Box::new(SpeciesRecipe),
        Box::new(FAB_2018),
        Box::new(FAB_2023),
        Box::new(RODLISTA_2021),
    ];
    for (version, ..) in NIN_VERSIONS {
        recipes.push(Box::new(NinKodeRecipe::new(version)?));
    }
    recipes.push(Box::new(LivsmediumRecipe));
    recipes.push(Box::new(NaturtypeRecipe));
    Ok(recipes)
}

/// Restrict [`all_recipes`] to the named tables, keeping load order.
///
/// An empty selection means every dataset. Unknown names are a
/// configuration error.
pub fn select_recipes(tables: &[String]) -> Result<Vec<Box<dyn Recipe>>> {
    let all = all_recipes()?;
    if tables.is_empty() {
        return Ok(all);
    }
    for name in tables {
        if !all.iter().any(|r| r.table() == name) {
            let known: Vec<&str> = all.iter().map(|r| r.table()).collect();
            return Err(ImportError::Configuration(format!(
                "unknown dataset '{}' (available: {})",
                name,
                known.join(", ")
            )));
        }
    }
    Ok(all
        .into_iter()
        .filter(|r| tables.iter().any(|t| t == r.table()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockFetcher;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    async fn collect(stream: RecordStream<'_>) -> Result<Vec<Record>> {
        stream.try_collect().await
    }

    #[test]
    fn unsupported_nin_version_is_rejected() {
        let err = NinKodeRecipe::new("2.1").unwrap_err();
        assert!(matches!(err, ImportError::Configuration(_)));
        assert!(NinKodeRecipe::new("").is_err());
        assert!(NinKodeRecipe::new("v2.3").is_err());
    }

    #[test]
    fn nin_version_selects_shape() {
        assert_eq!(NinKodeRecipe::new("2.3").unwrap().shape(), NinShape::Legacy);
        assert_eq!(NinKodeRecipe::new("3.0").unwrap().shape(), NinShape::V3);
        assert_eq!(NinKodeRecipe::new("2.2").unwrap().table(), "ninkode-2_2");
    }

    #[test]
    fn legacy_entry_flattens() {
        let row = record(json!({
            "Kode": {"Id": "NA-T1", "Definisjon": "https://example/NA-T1"},
            "Overordnet": {"Kode": {"Id": "NA-T"}},
            "Navn": "Nakent berg",
            "Kategori": "Hovedtype",
            "Extra": [1, 2]
        }));
        let out = legacy_code_entry(&row).unwrap();
        assert_eq!(
            Value::Object(out),
            json!({
                "KodeId": "NA-T1",
                "KodeDefinisjon": "https://example/NA-T1",
                "OverordnetKodeId": "NA-T",
                "Navn": "Nakent berg",
                "Kategori": "Hovedtype"
            })
        );
    }

    #[test]
    fn legacy_entry_without_parent() {
        for row in [
            json!({"Kode": {"Id": "NA", "Definisjon": "d"}, "Navn": "Natursystem", "Kategori": "Hovedtypegruppe"}),
            json!({"Kode": {"Id": "NA", "Definisjon": "d"}, "Overordnet": null, "Navn": "Natursystem", "Kategori": "Hovedtypegruppe"}),
        ] {
            let out = legacy_code_entry(&record(row)).unwrap();
            assert_eq!(out["OverordnetKodeId"], Value::Null);
        }
    }

    #[test]
    fn legacy_entry_missing_id_is_shape_error() {
        let row = record(json!({"Kode": {"Definisjon": "d"}, "Navn": "x", "Kategori": "y"}));
        match legacy_code_entry(&row) {
            Err(ImportError::Shape(msg)) => assert!(msg.contains("Kode.Id")),
            other => panic!("expected shape error, got {:?}", other),
        }
    }

    #[test]
    fn scalar_filter_drops_containers() {
        let out = scalar_fields(record(json!({
            "Id": 1, "ScientificName": "Pica pica", "Parent": {"Id": 2},
            "Synonyms": ["a"], "Flag": true, "Missing": null
        })));
        assert_eq!(
            Value::Object(out),
            json!({"Id": 1, "ScientificName": "Pica pica", "Flag": true, "Missing": null})
        );
    }

    #[test]
    fn livsmedium_uses_fixed_column_names() {
        let row = CodeRow {
            group: "Levende".to_string(),
            code: "LM-1".to_string(),
            name: "Tre".to_string(),
        };
        assert_eq!(
            Value::Object(livsmedium_row(row)),
            json!({"Gruppe": "Levende", "Kode": "LM-1", "Navn": "Tre"})
        );
    }

    #[tokio::test]
    async fn nin_version_fetches_only_its_own_release() {
        for (version, url) in [
            ("2.2", "https://nin-kode-api.artsdatabanken.no/v2.2/koder/allekoder"),
            ("2.3", "https://nin-kode-api.artsdatabanken.no/v2.3/koder/allekoder"),
        ] {
            let recipe = NinKodeRecipe::new(version).unwrap();
            let fetcher = MockFetcher::new().with(
                url,
                json!([{"Kode": {"Id": "NA", "Definisjon": "d"}, "Navn": "Natursystem", "Kategori": "Hovedtypegruppe"}])
                    .to_string(),
            );
            let rows = collect(recipe.records(&fetcher)).await.unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(fetcher.calls(), vec![url.to_string()]);
        }
    }

    #[tokio::test]
    async fn nin_v3_document() {
        let recipe = NinKodeRecipe::new("3.0").unwrap();
        let fetcher = MockFetcher::new().with(
            "https://nin-kode-api.artsdatabanken.no/v3.0/koder/allekoder",
            json!({"Versjon": "3.0", "Koder": [
                {"KodeId": "T", "Navn": "Fastmark", "Kategori": "Hovedtypegruppe"},
                {"KodeId": "T1", "Definisjon": "d", "OverordnetKodeId": "T", "Navn": "Nakent berg", "Kategori": "Hovedtype"}
            ]})
            .to_string(),
        );
        let rows = collect(recipe.records(&fetcher)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["KodeDefinisjon"], Value::Null);
        assert_eq!(rows[1]["OverordnetKodeId"], json!("T"));
    }

    #[tokio::test]
    async fn stream_is_lazy() {
        let fetcher = MockFetcher::new();
        let recipe = FAB_2018;
        let stream = recipe.records(&fetcher);
        assert!(fetcher.calls().is_empty());
        drop(stream);
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn species_fans_out_per_group_in_order() {
        let fetcher = MockFetcher::new()
            .with(
                TAXON_GROUPS_URL,
                json!([{"Key": "1", "Value": "Fugler"}, {"Key": 8, "Value": "Pattedyr"}]).to_string(),
            )
            .with(
                &SPECIES_BY_GROUP_URL.replace("{}", "1"),
                json!([{"Id": "3804", "ScientificName": "Pica pica", "Parents": [{"Id": 1}]}]).to_string(),
            )
            .with(
                &SPECIES_BY_GROUP_URL.replace("{}", "8"),
                json!([
                    {"Id": 31133, "ScientificName": "Lynx lynx", "Taxon": {"Rank": "species"}},
                    {"Id": 31140, "ScientificName": "Canis lupus"}
                ])
                .to_string(),
            );

        let rows = collect(SpeciesRecipe.records(&fetcher)).await.unwrap();
        let ids: Vec<&Value> = rows.iter().map(|r| &r["Id"]).collect();
        assert_eq!(ids, vec![&json!(3804), &json!(31133), &json!(31140)]);
        assert!(rows.iter().all(|r| r.values().all(|v| !v.is_object() && !v.is_array())));
        assert_eq!(
            fetcher.calls(),
            vec![
                TAXON_GROUPS_URL.to_string(),
                SPECIES_BY_GROUP_URL.replace("{}", "1"),
                SPECIES_BY_GROUP_URL.replace("{}", "8"),
            ]
        );
    }

    #[tokio::test]
    async fn species_stops_at_first_failed_group() {
        let fetcher = MockFetcher::new().with(
            TAXON_GROUPS_URL,
            json!([{"Key": 1}, {"Key": 2}]).to_string(),
        );
        let err = collect(SpeciesRecipe.records(&fetcher)).await.unwrap_err();
        assert!(matches!(err, ImportError::Transport { .. }));
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[test]
    fn selection_keeps_load_order() {
        let picked = select_recipes(&["ninkode-2_3".to_string(), "species".to_string()]).unwrap();
        let tables: Vec<&str> = picked.iter().map(|r| r.table()).collect();
        assert_eq!(tables, vec!["species", "ninkode-2_3"]);

        assert_eq!(select_recipes(&[]).unwrap().len(), 9);
        assert!(matches!(
            select_recipes(&["nope".to_string()]),
            Err(ImportError::Configuration(_))
        ));
    }
}
