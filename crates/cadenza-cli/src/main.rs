//! cadenza CLI - run pipeline steps against a local data directory.
//!
//! The main entry point for the `cadenza` binary.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use cadenza_core::{init_logging, LocalFsBackend, LogFormat};
use cadenza_pipeline::{default_checks, Pipeline, PipelineConfig, PipelineError};

#[derive(Debug, Parser)]
#[command(name = "cadenza", about = "Star-schema pipeline over raw catalog and event streams")]
struct Cli {
    /// Directory holding raw inputs and the written warehouse.
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Catalog record prefix inside the data dir (overrides env config).
    #[arg(long)]
    catalog_prefix: Option<String>,

    /// Event log prefix inside the data dir (overrides env config).
    #[arg(long)]
    events_prefix: Option<String>,

    /// Output root inside the data dir (overrides env config).
    #[arg(long)]
    output_root: Option<String>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormatArg::Pretty)]
    log_format: LogFormatArg,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::from_env()?;
        if let Some(prefix) = &self.catalog_prefix {
            config.catalog_prefix = prefix.clone();
        }
        if let Some(prefix) = &self.events_prefix {
            config.events_prefix = prefix.clone();
        }
        if let Some(root) = &self.output_root {
            config.output_root = root.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => Self::Pretty,
            LogFormatArg::Json => Self::Json,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build and commit the four dimension tables.
    Dimensions,
    /// Build and commit the interaction fact table.
    Facts,
    /// Run the quality gate against the committed tables.
    Verify,
    /// Run dimensions, facts, and the quality gate in sequence.
    Run,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_format.into());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(execute(cli))
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let storage = LocalFsBackend::new(&cli.data_dir)
        .with_context(|| format!("failed to open data dir {}", cli.data_dir.display()))?;
    let config = cli.config()?;
    let pipeline = Pipeline::new(Arc::new(storage), config)?;

    match cli.command {
        Commands::Dimensions => {
            let counts = pipeline.build_dimensions().await?;
            println!(
                "dimensions committed: {} items, {} creators, {} actors, {} time buckets",
                counts.items, counts.creators, counts.actors, counts.time_buckets
            );
        }
        Commands::Facts => {
            let facts = pipeline.build_facts().await?;
            println!("facts committed: {facts} interaction events");
        }
        Commands::Verify => {
            if !verify(&pipeline).await? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Run => {
            let counts = pipeline.build_dimensions().await?;
            let facts = pipeline.build_facts().await?;
            println!(
                "pipeline committed: {} items, {} creators, {} actors, {} time buckets, {facts} facts",
                counts.items, counts.creators, counts.actors, counts.time_buckets
            );
            if !verify(&pipeline).await? {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn verify(pipeline: &Pipeline) -> Result<bool> {
    match pipeline.run_quality_gate(default_checks()).await {
        Ok(()) => {
            println!("quality gate passed");
            Ok(true)
        }
        Err(mismatch @ PipelineError::ExpectationMismatch { .. }) => {
            eprintln!("{mismatch}");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
