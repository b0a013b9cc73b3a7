//! Core domain types for LeadHarvest runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// On-disk layout of a dataset source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetFormat {
    /// Comma-separated values with a header row.
    Csv,
    /// A JSON array of flat objects.
    Json,
    /// One JSON object per line.
    Jsonl,
}

impl DatasetFormat {
    /// Infer the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("csv") => Some(Self::Csv),
            Some("json") => Some(Self::Json),
            Some("jsonl") | Some("ndjson") => Some(Self::Jsonl),
            _ => None,
        }
    }
}

/// Discriminant of a [`SourceDescriptor`], used for fetcher dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Website,
    Dataset,
    Api,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Website => "website",
            Self::Dataset => "dataset",
            Self::Api => "api",
        }
    }
}

/// Where a batch of raw records comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDescriptor {
    /// A company website; one page yields one raw record.
    Website { url: String },
    /// A local CSV/JSON/JSONL file; each row is a raw record.
    Dataset {
        path: PathBuf,
        /// Inferred from the file extension when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<DatasetFormat>,
    },
    /// A JSON API response holding an array of record objects.
    Api {
        url: String,
        /// JSON pointer to the record array (root when absent).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        records_pointer: Option<String>,
    },
}

impl SourceDescriptor {
    /// Shorthand for a website source.
    pub fn website(url: impl Into<String>) -> Self {
        Self::Website { url: url.into() }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Website { .. } => SourceKind::Website,
            Self::Dataset { .. } => SourceKind::Dataset,
            Self::Api { .. } => SourceKind::Api,
        }
    }

    /// The URL or path this source points at.
    pub fn location(&self) -> String {
        match self {
            Self::Website { url } | Self::Api { url, .. } => url.clone(),
            Self::Dataset { path, .. } => path.display().to_string(),
        }
    }
}

impl std::fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind().as_str(), self.location())
    }
}

// ---------------------------------------------------------------------------
// RawRecord
// ---------------------------------------------------------------------------

/// An untyped record as scraped or read, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Location of the source this record came from.
    pub origin: String,
    /// Field name → raw string value.
    pub fields: BTreeMap<String, String>,
}

impl RawRecord {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Case-insensitive field lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// First non-blank value among `keys`, in order.
    pub fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.get(k))
            .find(|v| !v.trim().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ---------------------------------------------------------------------------
// LeadRecord
// ---------------------------------------------------------------------------

/// Supplemental data attached by an enrichment provider.
pub type Enrichment = serde_json::Map<String, serde_json::Value>;

/// A validated, canonical business contact.
///
/// Once accepted, only `enrichment` (and the `score` derived from it) may change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    /// Lowercased, syntactically valid contact email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Lowercased bare host (no scheme, port, or path).
    pub domain: String,
    /// Trimmed company name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    /// Page or file the record was taken from.
    pub source_url: String,
    /// Completeness score in `[0, 1]`.
    pub score: f64,
    /// Deduplication identity (hex SHA-256).
    pub fingerprint: String,
    /// Provider-supplied fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Enrichment>,
}

impl LeadRecord {
    /// Whether non-empty enrichment data is attached.
    pub fn has_enrichment(&self) -> bool {
        self.enrichment.as_ref().is_some_and(|e| !e.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Fetch outcomes
// ---------------------------------------------------------------------------

/// Classified reason a fetch attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// Request or read exceeded the per-fetch timeout.
    Timeout,
    /// Connection refused or reset.
    Connection,
    /// Remote asked us to slow down (HTTP 429).
    RateLimited,
    /// Remote 5xx.
    ServerError,
    /// Local I/O was interrupted.
    Interrupted,
    /// URL could not be parsed.
    MalformedUrl,
    /// 404/410 or missing file.
    NotFound,
    /// Any other 4xx.
    ClientError,
    /// Body or file could not be decoded into records.
    MalformedPayload,
    /// Target refused by the private-host guard.
    Blocked,
}

impl FetchErrorKind {
    /// Transient failures are retried; everything else fails the source at once.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::Connection
                | Self::RateLimited
                | Self::ServerError
                | Self::Interrupted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::Interrupted => "interrupted",
            Self::MalformedUrl => "malformed_url",
            Self::NotFound => "not_found",
            Self::ClientError => "client_error",
            Self::MalformedPayload => "malformed_payload",
            Self::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified fetch failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Outcome of a single fetch call.
#[derive(Debug, Clone)]
pub enum FetchAttempt {
    /// Records read from the source (possibly none).
    Success(Vec<RawRecord>),
    /// Classified failure.
    Failure(FetchError),
}

impl FetchAttempt {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<std::result::Result<Vec<RawRecord>, FetchError>> for FetchAttempt {
    fn from(result: std::result::Result<Vec<RawRecord>, FetchError>) -> Self {
        match result {
            Ok(records) => Self::Success(records),
            Err(e) => Self::Failure(e),
        }
    }
}

// ---------------------------------------------------------------------------
// FingerprintIndex
// ---------------------------------------------------------------------------

/// Fingerprint → first-seen timestamp, persisted across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FingerprintIndex {
    entries: BTreeMap<String, DateTime<Utc>>,
}

impl FingerprintIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.entries.contains_key(fingerprint)
    }

    /// Record `fingerprint` unless already known. Returns `true` if it was new.
    pub fn insert_if_absent(&mut self, fingerprint: &str, seen_at: DateTime<Utc>) -> bool {
        if self.entries.contains_key(fingerprint) {
            return false;
        }
        self.entries.insert(fingerprint.to_string(), seen_at);
        true
    }

    pub fn first_seen(&self, fingerprint: &str) -> Option<DateTime<Utc>> {
        self.entries.get(fingerprint).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DateTime<Utc>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, DateTime<Utc>)> for FingerprintIndex {
    fn from_iter<T: IntoIterator<Item = (String, DateTime<Utc>)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
