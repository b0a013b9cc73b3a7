//! Source fetchers, one per [`SourceKind`], and the registry that dispatches
//! a [`SourceDescriptor`] to the right one.

mod api;
mod dataset;
mod website;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use leadharvest_shared::{
    FetchAttempt, FetchError, FetchErrorKind, PipelineConfig, RawRecord, Result,
    SourceDescriptor, SourceKind,
};

pub use api::{ApiFetcher, records_from_body};
pub use dataset::{DatasetFetcher, parse_csv, parse_json_array, parse_json_lines};
pub use website::{WebsiteFetcher, extract_record};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Fetches raw records for one kind of source.
///
/// Implementations never return `Err`: every failure is classified into a
/// [`FetchAttempt::Failure`] so the retry policy can decide what to do.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// The descriptor variant this fetcher handles.
    fn kind(&self) -> SourceKind;

    /// Make one attempt at fetching `source`, bounded by `timeout`.
    async fn fetch(&self, source: &SourceDescriptor, timeout: Duration) -> FetchAttempt;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps each source kind to its fetcher.
#[derive(Clone, Default)]
pub struct FetcherRegistry {
    fetchers: HashMap<SourceKind, Arc<dyn SourceFetcher>>,
}

impl FetcherRegistry {
    /// Registry with the built-in website, dataset and API fetchers.
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let client = crate::http::build_client(config.fetch_timeout)?;
        Ok(Self::empty()
            .register(Arc::new(WebsiteFetcher::new(
                client.clone(),
                config.allow_private_hosts,
                config.placeholder_markers.clone(),
            )))
            .register(Arc::new(DatasetFetcher))
            .register(Arc::new(ApiFetcher::new(
                client,
                config.allow_private_hosts,
            ))))
    }

    /// Registry with no fetchers; every fetch fails until one is registered.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add or replace the fetcher for `fetcher.kind()`.
    pub fn register(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetchers.insert(fetcher.kind(), fetcher);
        self
    }

    pub fn supports(&self, kind: SourceKind) -> bool {
        self.fetchers.contains_key(&kind)
    }

    /// Dispatch one fetch attempt on the descriptor's variant.
    pub async fn fetch(&self, source: &SourceDescriptor, timeout: Duration) -> FetchAttempt {
        match self.fetchers.get(&source.kind()) {
            Some(fetcher) => fetcher.fetch(source, timeout).await,
            None => FetchAttempt::Failure(FetchError::new(
                FetchErrorKind::ClientError,
                format!("no fetcher registered for {} sources", source.kind().as_str()),
            )),
        }
    }
}

impl std::fmt::Debug for FetcherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.fetchers.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("FetcherRegistry").field("kinds", &kinds).finish()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Flatten a JSON object into a raw record. Scalars become strings; nulls,
/// arrays and nested objects are left out.
pub(crate) fn record_from_json(
    origin: &str,
    obj: &serde_json::Map<String, serde_json::Value>,
) -> RawRecord {
    let mut record = RawRecord::new(origin);
    for (key, value) in obj {
        let text = match value {
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        if !text.is_empty() {
            record.insert(key.as_str(), text);
        }
    }
    record
}

pub(crate) fn wrong_kind(expected: SourceKind, source: &SourceDescriptor) -> FetchError {
    FetchError::new(
        FetchErrorKind::ClientError,
        format!("{} fetcher cannot handle {source}", expected.as_str()),
    )
}
