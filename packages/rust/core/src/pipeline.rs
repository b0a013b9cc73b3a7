//! Ingestion pipeline: sources → rate-limited, retried fetches → ordering
//! lane (validate → deduplicate → score) → run report.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use leadharvest_crawler::{FetcherRegistry, RateLimiter, RetryOutcome, RetryPolicy};
use leadharvest_shared::{
    FetchAttempt, FetchError, FetchErrorKind, FingerprintIndex, LeadRecord, PipelineConfig,
    RawRecord, Result, RunId, SourceDescriptor,
};

use crate::dedup::Deduplicator;
use crate::report::{FailedSource, RunReport};
use crate::scoring::QualityScorer;
use crate::validator::FieldValidator;

// ---------------------------------------------------------------------------
// Phases & progress
// ---------------------------------------------------------------------------

/// Where a run currently is. The lane cycles through the middle three for
/// every fetched batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Fetching,
    Validating,
    Deduplicating,
    Scoring,
    Completed,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when the run enters a new phase.
    fn phase(&self, phase: RunPhase);
    /// Called when the lane has finished handling one source.
    fn source_finished(&self, source: &SourceDescriptor, current: usize, total: usize);
    /// Called once with the final report.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _phase: RunPhase) {}
    fn source_finished(&self, _source: &SourceDescriptor, _current: usize, _total: usize) {}
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Outcome of one source, sent from a worker to the ordering lane.
struct SourceOutcome {
    index: usize,
    result: RetryOutcome,
}

/// One ingestion run. Consumed by [`IngestionPipeline::run`].
#[derive(Debug)]
pub struct IngestionPipeline {
    config: PipelineConfig,
    registry: FetcherRegistry,
    index: FingerprintIndex,
}

impl IngestionPipeline {
    /// Build a pipeline after checking the configuration.
    pub fn new(config: PipelineConfig, registry: FetcherRegistry) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            registry,
            index: FingerprintIndex::new(),
        })
    }

    /// Seed deduplication with a persisted fingerprint index.
    pub fn with_index(mut self, index: FingerprintIndex) -> Self {
        self.index = index;
        self
    }

    pub async fn run(self, sources: Vec<SourceDescriptor>, cancel: &CancellationToken) -> RunReport {
        self.run_with_progress(sources, cancel, &SilentProgress).await
    }

    /// Fetch every source and fold the results into a report.
    ///
    /// Never fails: fetch failures, rejections and duplicates are counted in
    /// the report. Cancelling stops new fetches and retries; fetches already
    /// in flight finish (bounded by the fetch timeout) and keep their records.
    #[instrument(skip_all, fields(sources = sources.len(), concurrency = self.config.concurrency))]
    pub async fn run_with_progress(
        self,
        sources: Vec<SourceDescriptor>,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> RunReport {
        let started = Instant::now();
        let started_at = Utc::now();
        let run_id = RunId::new();
        let total = sources.len();

        info!(
            %run_id,
            sources = total,
            concurrency = self.config.concurrency,
            max_attempts = self.config.max_attempts,
            "starting ingestion run"
        );
        progress.phase(RunPhase::Idle);

        let retry = RetryPolicy::from_config(&self.config);
        let (tx, mut rx) = mpsc::channel::<SourceOutcome>(self.config.concurrency.max(1) * 2);

        progress.phase(RunPhase::Fetching);
        let dispatcher = tokio::spawn(dispatch(
            sources.clone(),
            Arc::new(self.registry),
            Arc::new(RateLimiter::new(
                self.config.rate_max_starts,
                self.config.rate_window,
            )),
            retry.clone(),
            self.config.clone(),
            cancel.clone(),
            tx,
        ));

        let mut lane = OrderingLane::new(&self.config, Deduplicator::with_index(self.index));
        let mut reported = vec![false; total];
        let mut handled = 0usize;

        while let Some(outcome) = rx.recv().await {
            let Some(source) = sources.get(outcome.index) else {
                continue;
            };
            reported[outcome.index] = true;
            handled += 1;
            lane.handle(source, outcome.result, progress);
            progress.source_finished(source, handled, total);
        }

        if let Err(e) = dispatcher.await {
            warn!(error = %e, "fetch dispatcher ended abnormally");
        }

        // Anything the lane never heard about was not fetched.
        for (source, seen) in sources.iter().zip(&reported) {
            if !seen {
                lane.abandoned.push(source.clone());
            }
        }

        let report = lane.finish(
            run_id.clone(),
            started_at,
            started,
            total,
            retry.attempts_made(),
            cancel.is_cancelled(),
        );
        progress.phase(RunPhase::Completed);

        info!(
            %run_id,
            accepted = report.accepted.len(),
            rejected = report.rejected_count,
            duplicates = report.duplicate_count,
            failed = report.failed_sources.len(),
            abandoned = report.abandoned_sources.len(),
            attempts = report.fetch_attempts,
            duration_ms = report.duration.as_millis() as u64,
            "ingestion run completed"
        );
        progress.done(&report);
        report
    }
}

/// Spawn one retried fetch per source, at most `concurrency` at a time.
/// Stops dispatching as soon as the run is cancelled.
async fn dispatch(
    sources: Vec<SourceDescriptor>,
    registry: Arc<FetcherRegistry>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    config: PipelineConfig,
    cancel: CancellationToken,
    tx: mpsc::Sender<SourceOutcome>,
) {
    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    let mut workers = JoinSet::new();

    for (index, source) in sources.into_iter().enumerate() {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = semaphore.clone().acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            debug!(remaining_from = index, "run cancelled, no further sources dispatched");
            break;
        };

        let registry = registry.clone();
        let limiter = limiter.clone();
        let retry = retry.clone();
        let cancel = cancel.clone();
        let tx = tx.clone();
        let timeout = config.fetch_timeout;

        workers.spawn(async move {
            let _permit = permit;
            let registry = registry.as_ref();
            let source = &source;

            let result = retry
                .execute(&limiter, &cancel, move |attempt| async move {
                    debug!(%source, attempt = attempt.number(), "fetching source");
                    match tokio::time::timeout(timeout, registry.fetch(source, timeout)).await {
                        Ok(attempt) => attempt,
                        Err(_) => FetchAttempt::Failure(FetchError::new(
                            FetchErrorKind::Timeout,
                            format!("{source}: no response within {timeout:?}"),
                        )),
                    }
                })
                .await;

            if tx.send(SourceOutcome { index, result }).await.is_err() {
                warn!(%source, "ordering lane closed before outcome was delivered");
            }
        });
    }
    drop(tx);

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "fetch worker failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Ordering lane
// ---------------------------------------------------------------------------

/// Sequential consumer of source outcomes. Sole owner of the deduplicator.
struct OrderingLane {
    validator: FieldValidator,
    dedup: Deduplicator,
    scorer: QualityScorer,
    accepted: Vec<LeadRecord>,
    rejected_count: usize,
    rejections: BTreeMap<crate::validator::RejectionReason, usize>,
    duplicate_count: usize,
    failed: Vec<FailedSource>,
    abandoned: Vec<SourceDescriptor>,
    succeeded: usize,
    records_seen: usize,
}

impl OrderingLane {
    fn new(config: &PipelineConfig, dedup: Deduplicator) -> Self {
        Self {
            validator: FieldValidator::from_config(config),
            dedup,
            scorer: QualityScorer::new(config.score_weights),
            accepted: Vec::new(),
            rejected_count: 0,
            rejections: BTreeMap::new(),
            duplicate_count: 0,
            failed: Vec::new(),
            abandoned: Vec::new(),
            succeeded: 0,
            records_seen: 0,
        }
    }

    fn handle(
        &mut self,
        source: &SourceDescriptor,
        result: RetryOutcome,
        progress: &dyn ProgressReporter,
    ) {
        match result {
            RetryOutcome::Success { records, attempts } => {
                debug!(%source, records = records.len(), attempts, "source fetched");
                self.succeeded += 1;
                self.ingest(records, progress);
                progress.phase(RunPhase::Fetching);
            }
            RetryOutcome::Failed { error, attempts } => {
                warn!(%source, kind = %error.kind, attempts, error = %error.message, "source failed");
                self.failed.push(FailedSource {
                    source: source.clone(),
                    error_kind: error.kind,
                    message: error.message,
                    attempts,
                });
            }
            RetryOutcome::Cancelled => {
                debug!(%source, "source abandoned");
                self.abandoned.push(source.clone());
            }
        }
    }

    /// Validate → deduplicate → score one fetched batch, in order.
    fn ingest(&mut self, records: Vec<RawRecord>, progress: &dyn ProgressReporter) {
        self.records_seen += records.len();

        progress.phase(RunPhase::Validating);
        let mut valid = Vec::with_capacity(records.len());
        for raw in &records {
            match self.validator.validate(raw) {
                Ok(lead) => valid.push(lead),
                Err(rejection) => {
                    debug!(origin = %rejection.origin, reason = %rejection.reason, "record rejected");
                    self.rejected_count += 1;
                    *self.rejections.entry(rejection.reason).or_default() += 1;
                }
            }
        }

        progress.phase(RunPhase::Deduplicating);
        let mut fresh = Vec::with_capacity(valid.len());
        for lead in valid {
            if self.dedup.admit(&lead) {
                fresh.push(lead);
            } else {
                debug!(fingerprint = %lead.fingerprint, domain = %lead.domain, "duplicate dropped");
                self.duplicate_count += 1;
            }
        }

        progress.phase(RunPhase::Scoring);
        for mut lead in fresh {
            self.scorer.apply(&mut lead);
            debug!(fingerprint = %lead.fingerprint, score = lead.score, "lead accepted");
            self.accepted.push(lead);
        }
    }

    fn finish(
        self,
        run_id: RunId,
        started_at: chrono::DateTime<Utc>,
        started: Instant,
        total: usize,
        fetch_attempts: u64,
        cancelled: bool,
    ) -> RunReport {
        RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            duration: started.elapsed(),
            accepted: self.accepted,
            rejected_count: self.rejected_count,
            rejections: self.rejections,
            duplicate_count: self.duplicate_count,
            failed_sources: self.failed,
            abandoned_sources: self.abandoned,
            sources_total: total,
            sources_succeeded: self.succeeded,
            records_seen: self.records_seen,
            fetch_attempts,
            cancelled,
            index: self.dedup.into_index(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use leadharvest_crawler::SourceFetcher;
    use leadharvest_shared::SourceKind;

    use super::*;

    /// Scripted behavior per source URL.
    #[derive(Clone)]
    enum Script {
        Records(Vec<RawRecord>),
        AlwaysTransient,
        Permanent,
        Slow(Duration, Vec<RawRecord>),
    }

    #[derive(Default)]
    struct ScriptedFetcher {
        scripts: HashMap<String, Script>,
        calls: Mutex<HashMap<String, u32>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn with(mut self, url: &str, script: Script) -> Self {
            self.scripts.insert(url.to_string(), script);
            self
        }

        fn calls(&self, url: &str) -> u32 {
            self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl SourceFetcher for ScriptedFetcher {
        fn kind(&self) -> SourceKind {
            SourceKind::Website
        }

        async fn fetch(&self, source: &SourceDescriptor, _timeout: Duration) -> FetchAttempt {
            let url = source.location();
            *self.calls.lock().unwrap().entry(url.clone()).or_default() += 1;

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let script = self.scripts.get(&url).cloned();
            let attempt = match script {
                Some(Script::Records(records)) => {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    FetchAttempt::Success(records)
                }
                Some(Script::Slow(delay, records)) => {
                    tokio::time::sleep(delay).await;
                    FetchAttempt::Success(records)
                }
                Some(Script::AlwaysTransient) => FetchAttempt::Failure(FetchError::new(
                    FetchErrorKind::ServerError,
                    "HTTP 503",
                )),
                Some(Script::Permanent) | None => {
                    FetchAttempt::Failure(FetchError::new(FetchErrorKind::NotFound, "HTTP 404"))
                }
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            attempt
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            rate_window: Duration::ZERO,
            retry_base_delay: Duration::from_millis(100),
            retry_jitter: false,
            ..PipelineConfig::default()
        }
    }

    fn pipeline(config: PipelineConfig, fetcher: Arc<ScriptedFetcher>) -> IngestionPipeline {
        let registry = FetcherRegistry::empty().register(fetcher);
        IngestionPipeline::new(config, registry).unwrap()
    }

    fn rec(fields: &[(&str, &str)]) -> RawRecord {
        fields
            .iter()
            .fold(RawRecord::new("mem"), |r, (k, v)| r.with(*k, *v))
    }

    fn sites(urls: &[&str]) -> Vec<SourceDescriptor> {
        urls.iter().map(|u| SourceDescriptor::website(*u)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn case_variant_emails_collapse_to_one_lead() {
        let fetcher = Arc::new(ScriptedFetcher::default().with(
            "https://leads.test/a",
            Script::Records(vec![
                rec(&[("email", "a@Foo.com")]),
                rec(&[("email", "A@foo.com")]),
                rec(&[("url", "http://bar.com")]),
            ]),
        ));

        let report = pipeline(config(), fetcher)
            .run(sites(&["https://leads.test/a"]), &CancellationToken::new())
            .await;

        let domains: Vec<_> = report.accepted.iter().map(|l| l.domain.as_str()).collect();
        assert_eq!(domains, vec!["foo.com", "bar.com"]);
        assert_eq!(report.duplicate_count, 1);
        assert_eq!(report.rejected_count, 0);
        assert_eq!(report.records_seen, 3);
        assert!((report.accepted[0].score - 0.6).abs() < 1e-9);
        assert!((report.accepted[1].score - 0.2).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn always_transient_source_is_tried_max_attempts_times() {
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .with("https://flaky.io", Script::AlwaysTransient)
                .with("https://good.io", Script::Records(vec![rec(&[("email", "hi@good.io")])])),
        );

        let report = pipeline(config(), fetcher.clone())
            .run(sites(&["https://flaky.io", "https://good.io"]), &CancellationToken::new())
            .await;

        assert_eq!(fetcher.calls("https://flaky.io"), 3);
        assert_eq!(fetcher.calls("https://good.io"), 1);
        assert_eq!(report.failed_sources.len(), 1);
        let failed = &report.failed_sources[0];
        assert_eq!(failed.source, SourceDescriptor::website("https://flaky.io"));
        assert_eq!(failed.error_kind, FetchErrorKind::ServerError);
        assert_eq!(failed.attempts, 3);
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.sources_succeeded, 1);
        assert_eq!(report.fetch_attempts, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_single_attempt() {
        let fetcher = Arc::new(ScriptedFetcher::default().with("https://gone.io", Script::Permanent));
        let report = pipeline(config(), fetcher.clone())
            .run(sites(&["https://gone.io"]), &CancellationToken::new())
            .await;

        assert_eq!(fetcher.calls("https://gone.io"), 1);
        assert_eq!(report.failed_sources[0].error_kind, FetchErrorKind::NotFound);
        assert_eq!(report.failed_sources[0].attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn records_without_identity_are_rejected_and_counted() {
        let fetcher = Arc::new(ScriptedFetcher::default().with(
            "https://dir.io",
            Script::Records(vec![
                rec(&[("company", "Hooli")]),
                rec(&[("email", "jane@example.com")]),
                rec(&[("email", "ops@vandelay.io"), ("company", "Vandelay Industries")]),
            ]),
        ));

        let report = pipeline(config(), fetcher)
            .run(sites(&["https://dir.io"]), &CancellationToken::new())
            .await;

        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.rejected_count, 2);
        let summary = report.summary();
        assert_eq!(summary.rejections.get("missing_identity"), Some(&1));
        assert_eq!(summary.rejections.get("blocked_domain"), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn seeded_index_drops_leads_from_earlier_runs() {
        let records = vec![rec(&[("email", "a@foo.com")]), rec(&[("email", "b@foo.com")])];
        let fetcher =
            Arc::new(ScriptedFetcher::default().with("https://foo.com", Script::Records(records)));

        let first = pipeline(config(), fetcher.clone())
            .run(sites(&["https://foo.com"]), &CancellationToken::new())
            .await;
        assert_eq!(first.accepted.len(), 2);

        let second = pipeline(config(), fetcher)
            .with_index(first.index.clone())
            .run(sites(&["https://foo.com"]), &CancellationToken::new())
            .await;
        assert!(second.accepted.is_empty());
        assert_eq!(second.duplicate_count, 2);
        assert_eq!(second.index.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded() {
        let mut fetcher = ScriptedFetcher::default();
        let urls: Vec<String> = (0..10).map(|i| format!("https://s{i}.io")).collect();
        for url in &urls {
            fetcher = fetcher.with(
                url,
                Script::Slow(Duration::from_secs(1), vec![rec(&[("url", url.as_str())])]),
            );
        }
        let fetcher = Arc::new(fetcher);

        let cfg = PipelineConfig {
            concurrency: 3,
            ..config()
        };
        let sources = urls.iter().map(SourceDescriptor::website).collect();
        let report = pipeline(cfg, fetcher.clone())
            .run(sources, &CancellationToken::new())
            .await;

        assert_eq!(report.accepted.len(), 10);
        assert!(fetcher.max_in_flight.load(Ordering::SeqCst) <= 3);
        assert!(fetcher.max_in_flight.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn all_fetches_share_one_rate_limiter() {
        let mut fetcher = ScriptedFetcher::default();
        for url in ["https://a.io", "https://b.io", "https://c.io"] {
            fetcher = fetcher.with(url, Script::Records(vec![rec(&[("url", url)])]));
        }
        let cfg = PipelineConfig {
            concurrency: 3,
            rate_max_starts: 1,
            rate_window: Duration::from_secs(2),
            ..config()
        };

        let start = tokio::time::Instant::now();
        let report = pipeline(cfg, Arc::new(fetcher))
            .run(
                sites(&["https://a.io", "https://b.io", "https://c.io"]),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(report.accepted.len(), 3);
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_abandons_everything() {
        let fetcher = Arc::new(
            ScriptedFetcher::default().with("https://a.io", Script::Records(vec![rec(&[("url", "https://a.io")])])),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = pipeline(config(), fetcher.clone())
            .run(sites(&["https://a.io", "https://b.io"]), &cancel)
            .await;

        assert!(report.cancelled);
        assert_eq!(report.abandoned_sources.len(), 2);
        assert!(report.accepted.is_empty());
        assert_eq!(fetcher.calls("https://a.io"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_keeps_in_flight_results_and_abandons_the_rest() {
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .with(
                    "https://slow.io",
                    Script::Slow(Duration::from_secs(5), vec![rec(&[("email", "ceo@slow.io")])]),
                )
                .with("https://later.io", Script::Records(vec![rec(&[("email", "x@later.io")])])),
        );
        let cfg = PipelineConfig {
            concurrency: 1,
            ..config()
        };

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let report = pipeline(cfg, fetcher.clone())
            .run(sites(&["https://slow.io", "https://later.io"]), &cancel)
            .await;

        assert!(report.cancelled);
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.accepted[0].domain, "slow.io");
        assert_eq!(
            report.abandoned_sources,
            vec![SourceDescriptor::website("https://later.io")]
        );
        assert_eq!(fetcher.calls("https://later.io"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn first_completed_fetch_wins_the_fingerprint() {
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .with(
                    "https://slow.io",
                    Script::Slow(
                        Duration::from_secs(5),
                        vec![rec(&[("email", "a@foo.com"), ("company", "Slow")])],
                    ),
                )
                .with(
                    "https://fast.io",
                    Script::Records(vec![rec(&[("email", "a@foo.com"), ("company", "Fast")])]),
                ),
        );

        // Submitted slow-first; the fast source completes first.
        let report = pipeline(config(), fetcher)
            .run(sites(&["https://slow.io", "https://fast.io"]), &CancellationToken::new())
            .await;

        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.accepted[0].company_name.as_deref(), Some("Fast"));
        assert_eq!(report.duplicate_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_fetch_times_out_and_is_retried() {
        let fetcher = Arc::new(ScriptedFetcher::default().with(
            "https://hung.io",
            Script::Slow(Duration::from_secs(600), vec![rec(&[("email", "x@hung.io")])]),
        ));
        let cfg = PipelineConfig {
            fetch_timeout: Duration::from_secs(1),
            ..config()
        };

        let report = pipeline(cfg, fetcher.clone())
            .run(sites(&["https://hung.io"]), &CancellationToken::new())
            .await;

        assert!(report.accepted.is_empty());
        assert_eq!(report.failed_sources.len(), 1);
        assert_eq!(report.failed_sources[0].error_kind, FetchErrorKind::Timeout);
        assert_eq!(report.failed_sources[0].attempts, 3);
        assert_eq!(fetcher.calls("https://hung.io"), 3);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = PipelineConfig {
            concurrency: 0,
            ..PipelineConfig::default()
        };
        assert!(IngestionPipeline::new(cfg, FetcherRegistry::empty()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_source_list_completes() {
        let report = pipeline(config(), Arc::new(ScriptedFetcher::default()))
            .run(Vec::new(), &CancellationToken::new())
            .await;
        assert_eq!(report.sources_total, 0);
        assert!(report.accepted.is_empty());
        assert!(!report.cancelled);
    }
}
