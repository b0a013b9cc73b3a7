//! Fetch side of LeadHarvest: rate limiting, retries, and source fetchers.
//!
//! This crate provides:
//! - [`RateLimiter`]: fair, window-based throttling of fetch starts
//! - [`RetryPolicy`]: bounded exponential-backoff retries with an attempt counter
//! - [`sources`]: website, dataset and API fetchers behind [`SourceFetcher`]
//! - [`http`]: shared client setup, failure classification, private-host guard

pub mod http;
pub mod rate;
pub mod retry;
pub mod sources;

pub use rate::RateLimiter;
pub use retry::{Attempt, RetryOutcome, RetryPolicy};
pub use sources::{
    ApiFetcher, DatasetFetcher, FetcherRegistry, SourceFetcher, WebsiteFetcher, extract_record,
};
