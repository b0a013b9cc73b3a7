//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use leadharvest_core::{
    ExportFormat, HttpEnrichmentProvider, IngestionPipeline, ProgressReporter, QualityScorer,
    RunPhase, RunReport, RunSummary, default_export_path, enrich_records, export_to_path,
};
use leadharvest_crawler::FetcherRegistry;
use leadharvest_shared::{
    AppConfig, FingerprintIndex, LeadRecord, PipelineConfig, SourceDescriptor, database_path,
    init_config, load_config,
};
use leadharvest_storage::{LeadFilter, Storage};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::sources::load_sources;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// LeadHarvest: collect, clean and score business leads.
#[derive(Parser)]
#[command(
    name = "leadharvest",
    version,
    about = "Ingest leads from websites, datasets and APIs; validate, deduplicate and score them.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database path (overrides `[storage] db_path`).
    #[arg(long, env = "LEADHARVEST_DB", global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the ingestion pipeline over a sources file and export accepted leads.
    Run {
        /// JSON array of source descriptors, or one website URL per line.
        #[arg(short, long)]
        sources: PathBuf,

        /// Export file (defaults to `<export_dir>/leads-<timestamp>.<ext>`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Export format: csv or json (defaults to `[defaults] export_format`).
        #[arg(short, long, value_parser = parse_export_format)]
        format: Option<ExportFormat>,

        /// Maximum concurrent fetches.
        #[arg(short, long, env = "LEADHARVEST_CONCURRENCY")]
        concurrency: Option<usize>,

        /// Ignore the persisted fingerprint index and store nothing.
        #[arg(long)]
        no_index: bool,

        /// Enrich accepted leads before export.
        #[arg(long)]
        enrich: bool,
    },

    /// List stored leads, best score first.
    Leads {
        /// Only leads scoring at least this much.
        #[arg(long)]
        min_score: Option<f64>,

        /// Only leads for this domain.
        #[arg(long)]
        domain: Option<String>,
    },

    /// Enrich stored leads that have no enrichment yet.
    Enrich {
        /// Only leads for this domain.
        #[arg(long)]
        domain: Option<String>,
    },

    /// Show past runs.
    History {
        /// Number of runs to show.
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

fn parse_export_format(s: &str) -> std::result::Result<ExportFormat, String> {
    s.parse::<ExportFormat>().map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "leadharvest=info",
        1 => "leadharvest=debug",
        _ => "leadharvest=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let db = cli.db;
    match cli.command {
        Command::Run {
            sources,
            out,
            format,
            concurrency,
            no_index,
            enrich,
        } => {
            let opts = RunOptions {
                sources,
                out,
                format,
                concurrency,
                no_index,
                enrich,
                db,
            };
            cmd_run(opts).await
        }
        Command::Leads { min_score, domain } => cmd_leads(db, min_score, domain).await,
        Command::Enrich { domain } => cmd_enrich(db, domain).await,
        Command::History { limit } => cmd_history(db, limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

fn resolve_db_path(config: &AppConfig, db: Option<PathBuf>) -> Result<PathBuf> {
    match db {
        Some(p) => Ok(p),
        None => Ok(database_path(config)?),
    }
}

/// Cancellation token tripped by Ctrl-C.
fn cancel_on_ctrl_c() -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, letting in-flight fetches finish");
            token.cancel();
        }
    });
    (cancel, handle)
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

struct RunOptions {
    sources: PathBuf,
    out: Option<PathBuf>,
    format: Option<ExportFormat>,
    concurrency: Option<usize>,
    no_index: bool,
    enrich: bool,
    db: Option<PathBuf>,
}

async fn cmd_run(opts: RunOptions) -> Result<()> {
    let config = load_config()?;

    let mut pipeline_config = PipelineConfig::from(&config);
    if let Some(c) = opts.concurrency {
        pipeline_config.concurrency = c;
    }
    pipeline_config.validate()?;

    let format = match opts.format {
        Some(f) => f,
        None => config.defaults.export_format.parse()?,
    };
    let sources = load_sources(&opts.sources, config.defaults.max_sources_per_batch)?;

    // Fail on a missing key before spending time on fetches.
    let provider = if opts.enrich || config.enrichment.enabled {
        Some(HttpEnrichmentProvider::from_config(&config.enrichment)?)
    } else {
        None
    };

    let storage = if opts.no_index {
        None
    } else {
        let path = resolve_db_path(&config, opts.db)?;
        Some(Storage::open(&path).await?)
    };
    let index = match &storage {
        Some(s) => s.load_fingerprint_index().await?,
        None => FingerprintIndex::new(),
    };

    info!(
        sources = sources.len(),
        concurrency = pipeline_config.concurrency,
        known_fingerprints = index.len(),
        "starting run"
    );

    let scorer = QualityScorer::new(pipeline_config.score_weights);
    let registry = FetcherRegistry::new(&pipeline_config)?;
    let pipeline = IngestionPipeline::new(pipeline_config, registry)?.with_index(index);

    let (cancel, ctrl_c) = cancel_on_ctrl_c();
    let progress = CliProgress::new();
    let report = pipeline
        .run_with_progress(sources, &cancel, &progress)
        .await;

    let mut accepted = report.accepted.clone();
    let enrichment = match &provider {
        Some(provider) => {
            progress.message("Enriching accepted leads");
            Some(enrich_records(&mut accepted, provider, &scorer, &cancel).await)
        }
        None => None,
    };
    progress.finish();
    ctrl_c.abort();

    let out = match opts.out {
        Some(p) => p,
        None => {
            let stamp = report.started_at.format("%Y%m%d-%H%M%S").to_string();
            default_export_path(Path::new(&config.defaults.export_dir), &stamp, format)
        }
    };
    let summary = save_outputs(storage.as_ref(), &report, &accepted, &out, format).await?;

    println!();
    println!("{summary}");
    if let Some(stats) = enrichment {
        println!(
            "  enriched:  {} enriched, {} not found, {} unavailable",
            stats.enriched, stats.not_found, stats.unavailable
        );
    }
    println!("  export:    {} ({} leads)", out.display(), accepted.len());
    if report.cancelled {
        println!("  Run was interrupted; unfetched sources were abandoned.");
    }
    println!();

    Ok(())
}

/// Write the export, then record the run. The export goes first so a
/// storage failure never loses the accepted leads.
async fn save_outputs(
    storage: Option<&Storage>,
    report: &RunReport,
    accepted: &[LeadRecord],
    out: &Path,
    format: ExportFormat,
) -> Result<RunSummary> {
    let summary = report.summary();
    export_to_path(accepted, out, format)?;

    if let Some(storage) = storage {
        persist_run(storage, report, &summary, accepted)
            .await
            .wrap_err_with(|| {
                format!(
                    "leads were exported to {} but the run could not be stored",
                    out.display()
                )
            })?;
    }
    Ok(summary)
}

async fn persist_run(
    storage: &Storage,
    report: &RunReport,
    summary: &RunSummary,
    accepted: &[LeadRecord],
) -> Result<()> {
    storage.insert_run(&report.run_id, report.started_at).await?;
    let stored = storage.insert_leads(&report.run_id, accepted).await?;
    let new_fingerprints = storage.save_fingerprint_index(&report.index).await?;
    let stats_json = serde_json::to_string(summary)?;
    storage
        .finish_run(&report.run_id, report.finished_at, &stats_json)
        .await?;

    info!(
        run_id = %report.run_id,
        stored,
        new_fingerprints,
        "run persisted"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn message(&self, msg: &str) {
        self.spinner.set_message(msg.to_string());
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, phase: RunPhase) {
        if phase == RunPhase::Fetching {
            self.spinner.set_message("Fetching sources");
        }
    }

    fn source_finished(&self, source: &SourceDescriptor, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Fetched [{current}/{total}] {source}"));
    }

    fn done(&self, report: &RunReport) {
        self.spinner.set_message(format!(
            "Done: {} accepted from {} sources",
            report.accepted.len(),
            report.sources_total
        ));
    }
}

// ---------------------------------------------------------------------------
// leads / enrich / history
// ---------------------------------------------------------------------------

async fn cmd_leads(db: Option<PathBuf>, min_score: Option<f64>, domain: Option<String>) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open_readonly(&resolve_db_path(&config, db)?).await?;
    let leads = storage
        .list_leads(&LeadFilter {
            min_score,
            domain,
            missing_enrichment: false,
        })
        .await?;

    if leads.is_empty() {
        println!("No leads stored.");
        return Ok(());
    }

    println!(
        "{:<6} {:<28} {:<36} {:<28} {}",
        "SCORE", "DOMAIN", "EMAIL", "COMPANY", "ENRICHED"
    );
    for lead in &leads {
        let r = &lead.record;
        println!(
            "{:<6.3} {:<28} {:<36} {:<28} {}",
            r.score,
            r.domain,
            r.email.as_deref().unwrap_or("-"),
            r.company_name.as_deref().unwrap_or("-"),
            if r.has_enrichment() { "yes" } else { "no" }
        );
    }
    println!("\n  {} leads", leads.len());
    Ok(())
}

async fn cmd_enrich(db: Option<PathBuf>, domain: Option<String>) -> Result<()> {
    let config = load_config()?;
    let provider = HttpEnrichmentProvider::from_config(&config.enrichment)?;
    let scorer = QualityScorer::new(config.scoring);
    let storage = Storage::open(&resolve_db_path(&config, db)?).await?;

    let mut records: Vec<LeadRecord> = storage
        .list_leads(&LeadFilter {
            domain,
            missing_enrichment: true,
            ..Default::default()
        })
        .await?
        .into_iter()
        .map(|l| l.record)
        .collect();

    if records.is_empty() {
        println!("Nothing to enrich.");
        return Ok(());
    }
    info!(leads = records.len(), "enriching stored leads");

    let (cancel, ctrl_c) = cancel_on_ctrl_c();
    let stats = enrich_records(&mut records, &provider, &scorer, &cancel).await;
    ctrl_c.abort();

    for record in &records {
        if let Some(enrichment) = &record.enrichment {
            storage
                .attach_enrichment(&record.fingerprint, enrichment, record.score)
                .await?;
        }
    }

    println!(
        "  {} enriched, {} not found, {} unavailable",
        stats.enriched, stats.not_found, stats.unavailable
    );
    Ok(())
}

async fn cmd_history(db: Option<PathBuf>, limit: usize) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open_readonly(&resolve_db_path(&config, db)?).await?;
    let runs = storage.list_runs(limit).await?;

    if runs.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }

    for run in runs {
        let summary = run
            .stats_json
            .as_deref()
            .map(serde_json::from_str::<RunSummary>)
            .transpose()
            .map_err(|e| eyre!("run {} has unreadable stats: {e}", run.id))?;

        match summary {
            Some(summary) => println!("{summary}"),
            None => println!(
                "Run {}\n  started {} (did not finish)",
                run.id,
                run.started_at.to_rfc3339()
            ),
        }
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead(domain: &str) -> LeadRecord {
        LeadRecord {
            email: Some(format!("sales@{domain}")),
            domain: domain.into(),
            company_name: Some("Globex".into()),
            source_url: format!("https://{domain}"),
            score: 0.8,
            fingerprint: format!("fp-{domain}"),
            enrichment: None,
        }
    }

    async fn empty_report() -> RunReport {
        IngestionPipeline::new(PipelineConfig::default(), FetcherRegistry::empty())
            .unwrap()
            .run(Vec::new(), &CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn export_survives_a_storage_failure() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("leads.db");
        drop(Storage::open(&db).await.unwrap());
        let readonly = Storage::open_readonly(&db).await.unwrap();

        let out = dir.path().join("out").join("leads.csv");
        let report = empty_report().await;
        let err = save_outputs(
            Some(&readonly),
            &report,
            &[lead("globex.com")],
            &out,
            ExportFormat::Csv,
        )
        .await
        .unwrap_err();

        assert!(format!("{err:#}").contains("read-only"));
        let written = std::fs::read_to_string(&out).unwrap();
        assert!(written.contains("sales@globex.com"));
    }

    #[tokio::test]
    async fn outputs_are_exported_and_stored() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(&dir.path().join("leads.db")).await.unwrap();
        let out = dir.path().join("leads.json");
        let report = empty_report().await;

        let summary = save_outputs(
            Some(&storage),
            &report,
            &[lead("globex.com")],
            &out,
            ExportFormat::Json,
        )
        .await
        .unwrap();

        assert_eq!(summary.run_id, report.run_id.to_string());
        assert!(out.exists());
        assert!(storage.get_lead_by_fingerprint("fp-globex.com").await.unwrap().is_some());
        assert_eq!(storage.list_runs(5).await.unwrap().len(), 1);
    }
}
