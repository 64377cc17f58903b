//! # Opportunity Radar
//!
//! A batch job that pulls items from a fixed set of trusted news feeds,
//! asks a generative text model to turn each new item into a structured
//! "opportunity" record, filters low-quality results through a quality
//! gate, and appends the survivors to a persisted JSON collection capped
//! at 250 records.
//!
//! Designed for periodic unattended execution: an external scheduler (cron,
//! CI) triggers one run at a time; there is no long-running process. One
//! full cycle is fetch → deduplicate → transform → validate → merge →
//! persist, strictly sequential, with per-source and per-item failures
//! logged and skipped.
//!
//! ## Usage
//!
//! ```sh
//! OPENAI_API_KEY=sk-... radar --config radar.toml
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

mod config;
mod feed;
mod opportunity;
mod pipeline;
mod radar;
mod transform;

use config::Config;
use pipeline::Pipeline;
use transform::Transformer;

#[derive(Parser, Debug)]
#[command(
    name = "radar",
    about = "Turn trusted news feeds into a persisted opportunity radar"
)]
struct Args {
    /// Path to the TOML config file
    #[arg(long, value_name = "FILE", default_value = "radar.toml")]
    config: PathBuf,

    /// Override the radar collection path from the config
    #[arg(long, value_name = "FILE")]
    radar: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let start = std::time::Instant::now();

    let config = Config::load(&args.config).context("Failed to load configuration")?;

    // Fail fast, before any network call: a run without a credential or
    // without sources can accomplish nothing.
    let api_key = config.api_key().context(
        "Missing transformer credential: set OPENAI_API_KEY or api_key in the config file",
    )?;
    if config.sources.is_empty() {
        anyhow::bail!("No usable feed sources configured");
    }

    let client = reqwest::Client::builder()
        .user_agent(concat!("opportunity-radar/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let transformer = Transformer::new(
        client.clone(),
        api_key,
        &config.model,
        config.api_base.as_deref(),
    )
    .context("Failed to configure transformer client")?;

    let radar_path = args.radar.unwrap_or_else(|| config.radar_path.clone());
    tracing::info!(
        radar = %radar_path.display(),
        sources = config.sources.len(),
        model = %config.model,
        "Starting radar update"
    );

    let summary = Pipeline::new(&config, client, transformer)
        .run(&radar_path)
        .await
        .context("Pipeline run failed")?;

    tracing::info!(
        added = summary.added,
        elapsed_secs = start.elapsed().as_secs(),
        "Radar update finished"
    );

    Ok(())
}
