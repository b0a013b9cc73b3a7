//! Local dataset source: CSV, JSON array, or JSON Lines files.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use leadharvest_shared::{
    DatasetFormat, FetchAttempt, FetchError, FetchErrorKind, RawRecord, SourceDescriptor,
    SourceKind,
};

use super::{SourceFetcher, record_from_json, wrong_kind};

/// Reads every row of a local file as a raw record.
#[derive(Debug, Default, Clone, Copy)]
pub struct DatasetFetcher;

#[async_trait]
impl SourceFetcher for DatasetFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::Dataset
    }

    #[instrument(skip_all, fields(source = %source))]
    async fn fetch(&self, source: &SourceDescriptor, timeout: Duration) -> FetchAttempt {
        let SourceDescriptor::Dataset { path, format } = source else {
            return FetchAttempt::Failure(wrong_kind(self.kind(), source));
        };

        let Some(format) = (*format).or_else(|| DatasetFormat::from_path(path)) else {
            return FetchAttempt::Failure(FetchError::new(
                FetchErrorKind::MalformedPayload,
                format!("{}: cannot infer dataset format from extension", path.display()),
            ));
        };

        let bytes = match tokio::time::timeout(timeout, tokio::fs::read(path)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return FetchAttempt::Failure(classify_io(path, &e)),
            Err(_) => {
                return FetchAttempt::Failure(FetchError::new(
                    FetchErrorKind::Timeout,
                    format!("{}: read timed out after {timeout:?}", path.display()),
                ));
            }
        };

        let origin = path.display().to_string();
        let parsed = match format {
            DatasetFormat::Csv => parse_csv(&origin, &bytes),
            DatasetFormat::Json => parse_json_array(&origin, &bytes),
            DatasetFormat::Jsonl => parse_json_lines(&origin, &bytes),
        };

        if let Ok(records) = &parsed {
            debug!(rows = records.len(), ?format, "dataset parsed");
        }
        parsed.into()
    }
}

fn classify_io(path: &Path, err: &std::io::Error) -> FetchError {
    use std::io::ErrorKind;

    let kind = match err.kind() {
        ErrorKind::NotFound => FetchErrorKind::NotFound,
        ErrorKind::Interrupted | ErrorKind::WouldBlock => FetchErrorKind::Interrupted,
        ErrorKind::TimedOut => FetchErrorKind::Timeout,
        _ => FetchErrorKind::ClientError,
    };
    FetchError::new(kind, format!("{}: {err}", path.display()))
}

fn malformed(origin: &str, detail: impl std::fmt::Display) -> FetchError {
    FetchError::new(FetchErrorKind::MalformedPayload, format!("{origin}: {detail}"))
}

/// Header row names the fields; blank cells are left out of the record.
pub fn parse_csv(origin: &str, bytes: &[u8]) -> Result<Vec<RawRecord>, FetchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader.headers().map_err(|e| malformed(origin, e))?.clone();

    let mut records = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let row = row.map_err(|e| malformed(origin, format!("row {}: {e}", idx + 1)))?;
        let mut record = RawRecord::new(origin);
        for (name, value) in headers.iter().zip(row.iter()) {
            if !name.is_empty() && !value.is_empty() {
                record.insert(name, value);
            }
        }
        records.push(record);
    }
    Ok(records)
}

pub fn parse_json_array(origin: &str, bytes: &[u8]) -> Result<Vec<RawRecord>, FetchError> {
    let value: serde_json::Value = serde_json::from_slice(bytes).map_err(|e| malformed(origin, e))?;
    let serde_json::Value::Array(items) = value else {
        return Err(malformed(origin, "expected a JSON array of objects"));
    };
    Ok(objects_to_records(origin, &items))
}

pub fn parse_json_lines(origin: &str, bytes: &[u8]) -> Result<Vec<RawRecord>, FetchError> {
    let text = std::str::from_utf8(bytes).map_err(|e| malformed(origin, e))?;
    let mut items = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| malformed(origin, format!("line {}: {e}", idx + 1)))?;
        items.push(value);
    }
    Ok(objects_to_records(origin, &items))
}

pub(crate) fn objects_to_records(origin: &str, items: &[serde_json::Value]) -> Vec<RawRecord> {
    items
        .iter()
        .filter_map(|item| match item.as_object() {
            Some(obj) => Some(record_from_json(origin, obj)),
            None => {
                debug!(origin, "skipping non-object entry");
                None
            }
        })
        .collect()
}
