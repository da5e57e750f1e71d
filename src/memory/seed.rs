//! Load NDJSON or CSV records into a [`MemoryCollection`].

use super::MemoryCollection;
use crate::coerce::coerce;
use crate::errors::{DocumentRole, OpError};
use crate::value::{DataRow, DynamicValue};
use bson::Document as BsonDocument;
use std::io::{BufRead, BufReader, Read};

#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub has_headers: bool,
    pub type_infer: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self { delimiter: b',', has_headers: true, type_infer: true }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub inserted: u64,
    pub skipped: u64,
}

/// One JSON object per line. Blank lines are ignored; lines that are not
/// objects are skipped when `skip_errors` is set and fatal otherwise.
///
/// # Errors
/// I/O failures, or the first bad line when `skip_errors` is false.
pub fn seed_ndjson<R: Read>(
    collection: &MemoryCollection,
    reader: R,
    skip_errors: bool,
) -> Result<SeedReport, OpError> {
    let mut report = SeedReport::default();
    let mut reader = BufReader::new(reader);
    let mut buf = String::with_capacity(8 * 1024);
    let mut line_no: usize = 0;
    loop {
        buf.clear();
        if reader.read_line(&mut buf)? == 0 {
            break;
        }
        line_no += 1;
        let line = buf.trim();
        if line.is_empty() {
            continue;
        }
        match parse_object(line) {
            Ok(doc) => {
                collection.insert_document(doc);
                report.inserted += 1;
            }
            Err(e) if skip_errors => {
                log::warn!("seed '{}' line {line_no} skipped: {e}", collection.name());
                report.skipped += 1;
            }
            Err(e) => return Err(OpError::Parse(format!("line {line_no}: {e}"))),
        }
    }
    log::info!("seeded {} documents into '{}' (ndjson)", report.inserted, collection.name());
    Ok(report)
}

fn parse_object(line: &str) -> Result<BsonDocument, OpError> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    let serde_json::Value::Object(obj) = value else {
        return Err(OpError::Parse("expected a JSON object".into()));
    };
    BsonDocument::try_from(obj).map_err(|e| OpError::Parse(e.to_string()))
}

/// Each CSV record becomes a [`DataRow`] and goes through row coercion.
///
/// # Errors
/// CSV read failures, or the first bad record when `skip_errors` is false.
pub fn seed_csv<R: Read>(
    collection: &MemoryCollection,
    reader: R,
    opts: &CsvOptions,
    skip_errors: bool,
) -> Result<SeedReport, OpError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(opts.has_headers)
        .delimiter(opts.delimiter)
        .flexible(true)
        .from_reader(reader);
    let headers = if opts.has_headers { rdr.headers()?.clone() } else { csv::StringRecord::new() };
    let mut report = SeedReport::default();
    for (row_no, rec) in rdr.records().enumerate() {
        let doc = rec.map_err(OpError::from).and_then(|rec| {
            let row = DataRow::from_csv_record(&headers, &rec, opts.type_infer);
            coerce(DynamicValue::Row(row), DocumentRole::Update)
        });
        match doc {
            Ok(doc) => {
                collection.insert_document(doc.into_inner());
                report.inserted += 1;
            }
            Err(e) if skip_errors => {
                log::warn!("seed '{}' row {} skipped: {e}", collection.name(), row_no + 1);
                report.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    log::info!("seeded {} documents into '{}' (csv)", report.inserted, collection.name());
    Ok(report)
}
