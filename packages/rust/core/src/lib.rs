//! Core domain logic for LeadHarvest.
//!
//! This crate turns fetched raw records into accepted leads: validation,
//! deduplication, scoring, the ingestion pipeline that orchestrates them,
//! plus post-run enrichment and export.

pub mod dedup;
pub mod enrichment;
pub mod export;
pub mod pipeline;
pub mod report;
pub mod scoring;
pub mod validator;

pub use dedup::{Deduplicator, fingerprint, normalize_company};
pub use enrichment::{
    EnrichmentProvider, EnrichmentStats, HttpEnrichmentProvider, attach_enrichment,
    enrich_records,
};
pub use export::{ExportFormat, default_export_path, export_to_path, write_csv, write_json};
pub use pipeline::{IngestionPipeline, ProgressReporter, RunPhase, SilentProgress};
pub use report::{FailedSource, RunReport, RunSummary};
pub use scoring::QualityScorer;
pub use validator::{FieldValidator, Rejection, RejectionReason};
