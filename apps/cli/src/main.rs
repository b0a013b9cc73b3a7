//! LeadHarvest CLI: lead ingestion from websites, datasets and APIs.
//!
//! Fetches sources concurrently under a shared rate limit, validates,
//! deduplicates and scores the records, then stores and exports the
//! accepted leads.

mod commands;
mod sources;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
