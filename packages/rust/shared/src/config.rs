//! Application configuration for LeadHarvest.
//!
//! User config lives at `~/.leadharvest/leadharvest.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LeadHarvestError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leadharvest.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leadharvest";

/// Default database file name inside the config directory.
const DB_FILE_NAME: &str = "leadharvest.db";

// ---------------------------------------------------------------------------
// Config structs (matching leadharvest.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default)]
    pub scoring: ScoreWeights,

    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory exports are written to when `--out` is not given.
    #[serde(default = "default_export_dir")]
    pub export_dir: String,

    /// Export format: "csv" or "json".
    #[serde(default = "default_export_format")]
    pub export_format: String,

    /// Upper bound on sources accepted in a single run.
    #[serde(default = "default_max_sources")]
    pub max_sources_per_batch: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            export_dir: default_export_dir(),
            export_format: default_export_format(),
            max_sources_per_batch: default_max_sources(),
        }
    }
}

fn default_export_dir() -> String {
    "./exports".into()
}
fn default_export_format() -> String {
    "csv".into()
}
fn default_max_sources() -> usize {
    50
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum sources fetched concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Per-fetch timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Allow fetching loopback/private hosts.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            allow_private_hosts: false,
        }
    }
}

fn default_concurrency() -> u32 {
    4
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[rate_limit]` section: at most `max_starts` fetch starts per `window_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_starts")]
    pub max_starts: u32,

    /// Rolling window in milliseconds. Zero disables throttling.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_starts: default_max_starts(),
            window_ms: default_window_ms(),
        }
    }
}

fn default_max_starts() -> u32 {
    1
}
fn default_window_ms() -> u64 {
    2_000
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Hard ceiling on attempts per source, first try included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff base delay in milliseconds (doubles per attempt).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Add random jitter on top of the backoff delay.
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            jitter: true,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    2_000
}
fn default_true() -> bool {
    true
}

/// `[validation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Placeholder and disposable domains that never anchor a lead.
    #[serde(default = "default_blocked_domains")]
    pub blocked_domains: Vec<String>,

    /// Substrings marking scraped emails as placeholders.
    #[serde(default = "default_placeholder_markers")]
    pub placeholder_markers: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            blocked_domains: default_blocked_domains(),
            placeholder_markers: default_placeholder_markers(),
        }
    }
}

fn default_blocked_domains() -> Vec<String> {
    [
        "example.com",
        "example.org",
        "test.com",
        "test.org",
        "domain.com",
        "localhost",
        "tempmail.com",
        "throwaway.com",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_placeholder_markers() -> Vec<String> {
    ["example", "test", "placeholder", "noreply", "no-reply"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// How a lead's deduplication identity is derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintStrategy {
    /// Email when present, else domain plus normalized company name.
    #[default]
    EmailOrDomainCompany,
    /// Email when present, else domain alone.
    EmailOrDomain,
    /// Domain alone: one lead per company domain.
    Domain,
}

/// `[dedup]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default)]
    pub strategy: FingerprintStrategy,
}

/// `[scoring]` section: per-field contribution to the quality score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    #[serde(default = "default_email_weight")]
    pub email: f64,
    #[serde(default = "default_field_weight")]
    pub domain: f64,
    #[serde(default = "default_field_weight")]
    pub company_name: f64,
    #[serde(default = "default_field_weight")]
    pub enrichment: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            email: default_email_weight(),
            domain: default_field_weight(),
            company_name: default_field_weight(),
            enrichment: default_field_weight(),
        }
    }
}

fn default_email_weight() -> f64 {
    0.4
}
fn default_field_weight() -> f64 {
    0.2
}

/// `[enrichment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Enrich accepted leads after each run.
    #[serde(default)]
    pub enabled: bool,

    /// Provider lookup endpoint.
    #[serde(default = "default_enrichment_endpoint")]
    pub endpoint: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-lookup timeout in seconds.
    #[serde(default = "default_enrichment_timeout")]
    pub timeout_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_enrichment_endpoint(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_enrichment_timeout(),
        }
    }
}

fn default_enrichment_endpoint() -> String {
    "https://enrichment.leadharvest.dev/v1/company".into()
}
fn default_api_key_env() -> String {
    "LEADHARVEST_ENRICHMENT_KEY".into()
}
fn default_enrichment_timeout() -> u64 {
    10
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database path; defaults to `~/.leadharvest/leadharvest.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum concurrent fetches.
    pub concurrency: usize,
    /// Per-fetch timeout.
    pub fetch_timeout: Duration,
    /// Allow loopback/private hosts (integration tests, intranet sources).
    pub allow_private_hosts: bool,
    /// Fetch starts allowed per `rate_window`.
    pub rate_max_starts: u32,
    /// Rolling rate-limit window; zero disables throttling.
    pub rate_window: Duration,
    /// Attempt ceiling per source.
    pub max_attempts: u32,
    /// Backoff base delay.
    pub retry_base_delay: Duration,
    /// Jitter on backoff delays.
    pub retry_jitter: bool,
    pub blocked_domains: Vec<String>,
    pub placeholder_markers: Vec<String>,
    pub fingerprint_strategy: FingerprintStrategy,
    pub score_weights: ScoreWeights,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.fetch.concurrency as usize,
            fetch_timeout: Duration::from_secs(config.fetch.timeout_secs),
            allow_private_hosts: config.fetch.allow_private_hosts,
            rate_max_starts: config.rate_limit.max_starts,
            rate_window: Duration::from_millis(config.rate_limit.window_ms),
            max_attempts: config.retry.max_attempts,
            retry_base_delay: Duration::from_millis(config.retry.base_delay_ms),
            retry_jitter: config.retry.jitter,
            blocked_domains: config.validation.blocked_domains.clone(),
            placeholder_markers: config.validation.placeholder_markers.clone(),
            fingerprint_strategy: config.dedup.strategy,
            score_weights: config.scoring,
        }
    }
}

impl PipelineConfig {
    /// Reject settings that would stall or corrupt a run.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(LeadHarvestError::config("fetch concurrency must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(LeadHarvestError::config("retry max_attempts must be at least 1"));
        }
        if self.fetch_timeout.is_zero() {
            return Err(LeadHarvestError::config("fetch timeout must be non-zero"));
        }
        if !self.rate_window.is_zero() && self.rate_max_starts == 0 {
            return Err(LeadHarvestError::config(
                "rate_limit max_starts must be at least 1 when a window is set",
            ));
        }
        let w = &self.score_weights;
        for (name, value) in [
            ("email", w.email),
            ("domain", w.domain),
            ("company_name", w.company_name),
            ("enrichment", w.enrichment),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(LeadHarvestError::config(format!(
                    "scoring weight `{name}` must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leadharvest/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LeadHarvestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leadharvest/leadharvest.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the database path from config, falling back to the config directory.
pub fn database_path(config: &AppConfig) -> Result<PathBuf> {
    match &config.storage.db_path {
        Some(p) => Ok(PathBuf::from(p)),
        None => Ok(config_dir()?.join(DB_FILE_NAME)),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LeadHarvestError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        LeadHarvestError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LeadHarvestError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LeadHarvestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LeadHarvestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the enrichment API key from the configured env var.
pub fn enrichment_api_key(config: &EnrichmentConfig) -> Result<String> {
    let var_name = &config.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(LeadHarvestError::config(format!(
            "enrichment API key not found. Set the {var_name} environment variable."
        ))),
    }
}
