//! Run outcome: accepted leads plus per-category statistics.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use leadharvest_shared::{FetchErrorKind, FingerprintIndex, LeadRecord, RunId, SourceDescriptor};

use crate::validator::RejectionReason;

/// A source whose fetch ended in failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedSource {
    pub source: SourceDescriptor,
    pub error_kind: FetchErrorKind,
    pub message: String,
    pub attempts: u32,
}

/// Everything a finished run produced. A run always ends with a report.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
    /// Accepted leads in ordering-lane (completion) order.
    pub accepted: Vec<LeadRecord>,
    pub rejected_count: usize,
    pub rejections: BTreeMap<RejectionReason, usize>,
    pub duplicate_count: usize,
    pub failed_sources: Vec<FailedSource>,
    /// Sources never fetched because the run was cancelled.
    pub abandoned_sources: Vec<SourceDescriptor>,
    pub sources_total: usize,
    pub sources_succeeded: usize,
    /// Raw records received from successful fetches.
    pub records_seen: usize,
    /// Fetch attempts made, retries included.
    pub fetch_attempts: u64,
    pub cancelled: bool,
    /// Seed index plus every fingerprint admitted in this run.
    pub index: FingerprintIndex,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id.to_string(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            duration_ms: self.duration.as_millis() as u64,
            sources_total: self.sources_total,
            sources_succeeded: self.sources_succeeded,
            sources_failed: self.failed_sources.len(),
            sources_abandoned: self.abandoned_sources.len(),
            records_seen: self.records_seen,
            accepted: self.accepted.len(),
            rejected: self.rejected_count,
            rejections: self
                .rejections
                .iter()
                .map(|(reason, count)| (reason.as_str().to_string(), *count))
                .collect(),
            duplicates: self.duplicate_count,
            fetch_attempts: self.fetch_attempts,
            cancelled: self.cancelled,
            failures: self
                .failed_sources
                .iter()
                .map(|f| (f.source.to_string(), f.error_kind.as_str().to_string()))
                .collect(),
        }
    }
}

/// Serializable per-category counts of a run; stored as run history.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub sources_total: usize,
    pub sources_succeeded: usize,
    pub sources_failed: usize,
    pub sources_abandoned: usize,
    pub records_seen: usize,
    pub accepted: usize,
    pub rejected: usize,
    #[serde(default)]
    pub rejections: BTreeMap<String, usize>,
    pub duplicates: usize,
    pub fetch_attempts: u64,
    pub cancelled: bool,
    /// Failed source → error kind.
    #[serde(default)]
    pub failures: BTreeMap<String, String>,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Run {}", self.run_id)?;
        writeln!(
            f,
            "  sources:   {} total, {} ok, {} failed, {} abandoned",
            self.sources_total, self.sources_succeeded, self.sources_failed, self.sources_abandoned
        )?;
        writeln!(
            f,
            "  records:   {} seen, {} accepted, {} rejected, {} duplicates",
            self.records_seen, self.accepted, self.rejected, self.duplicates
        )?;
        for (reason, count) in &self.rejections {
            writeln!(f, "    rejected ({reason}): {count}")?;
        }
        for (source, kind) in &self.failures {
            writeln!(f, "    failed {source}: {kind}")?;
        }
        write!(
            f,
            "  attempts:  {} in {:.1}s{}",
            self.fetch_attempts,
            self.duration_ms as f64 / 1000.0,
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}
