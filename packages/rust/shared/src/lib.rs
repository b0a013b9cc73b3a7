//! Shared types, error model, and configuration for LeadHarvest.
//!
//! This crate is the foundation depended on by all other LeadHarvest crates.
//! It provides:
//! - [`LeadHarvestError`]: the unified error type
//! - Domain types ([`RawRecord`], [`LeadRecord`], [`SourceDescriptor`], [`FetchError`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DedupConfig, DefaultsConfig, EnrichmentConfig, FetchConfig, FingerprintStrategy,
    PipelineConfig, RateLimitConfig, RetryConfig, ScoreWeights, StorageConfig, ValidationConfig,
    config_dir, config_file_path, database_path, enrichment_api_key, init_config, load_config,
    load_config_from,
};
pub use error::{LeadHarvestError, Result};
pub use types::{
    DatasetFormat, Enrichment, FetchAttempt, FetchError, FetchErrorKind, FingerprintIndex,
    LeadRecord, RawRecord, RunId, SourceDescriptor, SourceKind,
};
