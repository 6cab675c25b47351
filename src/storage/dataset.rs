// Flat CSV dataset of measurement records

use crate::error::PersistError;
use crate::measure::models::{EngineKind, ResultRecord, TIMESTAMP_FORMAT};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;

/// Column order for every dataset file
pub const COLUMNS: [&str; 7] = [
    "timestamp",
    "ping_ms",
    "download_mbps",
    "upload_mbps",
    "server_id",
    "server_name",
    "engine",
];

/// Row as it appears on disk. Every column is optional so files written by
/// older tools or edited by hand still load.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CsvRow {
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    ping_ms: String,
    #[serde(default)]
    download_mbps: String,
    #[serde(default)]
    upload_mbps: String,
    #[serde(default)]
    server_id: String,
    #[serde(default)]
    server_name: String,
    #[serde(default)]
    engine: String,
}

impl From<&ResultRecord> for CsvRow {
    fn from(record: &ResultRecord) -> Self {
        Self {
            timestamp: record.timestamp_text(),
            ping_ms: record.ping_ms().to_string(),
            download_mbps: record.download_mbps().to_string(),
            upload_mbps: record.upload_mbps().to_string(),
            server_id: record.server_id().to_string(),
            server_name: record.server_name().to_string(),
            engine: record.engine_label().to_string(),
        }
    }
}

impl CsvRow {
    fn into_record(self) -> Result<ResultRecord, String> {
        let timestamp = parse_timestamp(&self.timestamp)?;
        let engine = match self.engine.trim() {
            "" => None,
            tag => Some(EngineKind::from_label(tag).ok_or_else(|| format!("unknown engine tag '{}'", tag))?),
        };
        Ok(ResultRecord::new(
            timestamp,
            parse_number(&self.ping_ms, "ping_ms")?,
            parse_number(&self.download_mbps, "download_mbps")?,
            parse_number(&self.upload_mbps, "upload_mbps")?,
            Some(&self.server_id),
            Some(&self.server_name),
            engine,
        ))
    }
}

/// Parse the canonical form, falling back to any RFC 3339 instant
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, String> {
    let text = text.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT) {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{}': {}", text, e))
}

/// Empty and null-like cells read as zero
fn parse_number(text: &str, column: &str) -> Result<f64, String> {
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("nan") || text.eq_ignore_ascii_case("none") {
        return Ok(0.0);
    }
    text.parse::<f64>()
        .map_err(|e| format!("bad {} value '{}': {}", column, text, e))
}

/// Ordered records; insertion order kept, duplicates allowed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    records: Vec<ResultRecord>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a dataset file. A missing file is an empty dataset. Rows that
    /// cannot be decoded are logged and skipped; a file that cannot be read
    /// as CSV at all is `PersistError::Corrupt` so the caller chooses
    /// whether to reset.
    pub fn load(path: &Path) -> Result<Self, PersistError> {
        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(PersistError::io(path, e)),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let headers = reader.headers().map_err(|e| corrupt(path, &e))?.clone();

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row.map_err(|e| corrupt(path, &e))?;
            let line = row.position().map_or(0, |p| p.line());
            let decoded = row
                .deserialize::<CsvRow>(Some(&headers))
                .map_err(|e| e.to_string())
                .and_then(CsvRow::into_record);
            match decoded {
                Ok(record) => records.push(record),
                Err(reason) => {
                    tracing::warn!(path = %path.display(), line, %reason, "skipping unreadable row");
                }
            }
        }

        Ok(Self { records })
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push(&mut self, record: ResultRecord) {
        self.records.push(record);
    }

    pub fn extend<I: IntoIterator<Item = ResultRecord>>(&mut self, records: I) {
        self.records.extend(records);
    }

    /// Keep records with `timestamp >= cutoff`, preserving order
    pub fn retain_since(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.timestamp() >= cutoff);
        before - self.records.len()
    }

    /// Header plus one line per record
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, PersistError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.write_record(COLUMNS)?;
        for record in &self.records {
            writer.serialize(CsvRow::from(record))?;
        }
        writer
            .into_inner()
            .map_err(|e| PersistError::io("<buffer>", e.into_error()))
    }
}

fn corrupt(path: &Path, error: &csv::Error) -> PersistError {
    PersistError::Corrupt {
        path: path.to_path_buf(),
        line: error.position().map_or(0, |p| p.line()),
        reason: error.to_string(),
    }
}
