//! Tabular export of accepted leads (CSV rows or a JSON array).

use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use tracing::info;

use leadharvest_shared::{Enrichment, LeadHarvestError, LeadRecord, Result};

/// Column order shared by both formats.
pub const COLUMNS: [&str; 7] = [
    "email",
    "domain",
    "company_name",
    "source_url",
    "score",
    "fingerprint",
    "enrichment",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = LeadHarvestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(LeadHarvestError::validation(format!(
                "unknown export format '{other}' (expected csv or json)"
            ))),
        }
    }
}

/// Score rounded for display; sums of weights carry float noise.
fn rounded(score: f64) -> f64 {
    (score * 1000.0).round() / 1000.0
}

#[derive(Serialize)]
struct CsvRow<'a> {
    email: &'a str,
    domain: &'a str,
    company_name: &'a str,
    source_url: &'a str,
    score: f64,
    fingerprint: &'a str,
    /// Compact JSON, empty when absent.
    enrichment: String,
}

#[derive(Serialize)]
struct JsonRow<'a> {
    email: Option<&'a str>,
    domain: &'a str,
    company_name: Option<&'a str>,
    source_url: &'a str,
    score: f64,
    fingerprint: &'a str,
    enrichment: Option<&'a Enrichment>,
}

impl<'a> From<&'a LeadRecord> for JsonRow<'a> {
    fn from(r: &'a LeadRecord) -> Self {
        Self {
            email: r.email.as_deref(),
            domain: &r.domain,
            company_name: r.company_name.as_deref(),
            source_url: &r.source_url,
            score: rounded(r.score),
            fingerprint: &r.fingerprint,
            enrichment: r.enrichment.as_ref().filter(|e| !e.is_empty()),
        }
    }
}

/// Write leads as CSV with a header row, even when there are no leads.
pub fn write_csv<W: Write>(records: &[LeadRecord], writer: W) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    let export_err = |e: csv::Error| LeadHarvestError::Export(e.to_string());

    if records.is_empty() {
        out.write_record(COLUMNS).map_err(export_err)?;
    }
    for r in records {
        let enrichment = match r.enrichment.as_ref().filter(|e| !e.is_empty()) {
            Some(e) => serde_json::to_string(e).map_err(|e| LeadHarvestError::Export(e.to_string()))?,
            None => String::new(),
        };
        out.serialize(CsvRow {
            email: r.email.as_deref().unwrap_or_default(),
            domain: &r.domain,
            company_name: r.company_name.as_deref().unwrap_or_default(),
            source_url: &r.source_url,
            score: rounded(r.score),
            fingerprint: &r.fingerprint,
            enrichment,
        })
        .map_err(export_err)?;
    }
    out.flush()
        .map_err(|e| LeadHarvestError::Export(e.to_string()))
}

/// Write leads as a pretty-printed JSON array.
pub fn write_json<W: Write>(records: &[LeadRecord], writer: W) -> Result<()> {
    let rows: Vec<JsonRow<'_>> = records.iter().map(JsonRow::from).collect();
    serde_json::to_writer_pretty(writer, &rows).map_err(|e| LeadHarvestError::Export(e.to_string()))
}

/// Write leads to `path` in `format`, creating parent directories.
pub fn export_to_path(records: &[LeadRecord], path: &Path, format: ExportFormat) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| LeadHarvestError::io(parent, e))?;
    }
    let file = std::fs::File::create(path).map_err(|e| LeadHarvestError::io(path, e))?;
    let writer = std::io::BufWriter::new(file);

    match format {
        ExportFormat::Csv => write_csv(records, writer)?,
        ExportFormat::Json => write_json(records, writer)?,
    }
    info!(path = %path.display(), leads = records.len(), ?format, "leads exported");
    Ok(())
}

/// `{dir}/leads-{stamp}.{ext}`.
pub fn default_export_path(dir: &Path, stamp: &str, format: ExportFormat) -> PathBuf {
    dir.join(format!("leads-{stamp}.{}", format.extension()))
}
