// src/main.rs
use anyhow::{Context, Result};
use cdp_harvest::{config::PipelineConfig, pipeline::Pipeline};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "cdp_harvest")]
#[command(about = "Parse CDP climate questionnaires into a validated workbook")]
struct Args {
    /// YAML config file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Workbook to append to (overrides the config)
    #[arg(short, long)]
    workbook: Option<PathBuf>,

    /// Relative tolerance for sum-to-total checks (overrides the config)
    #[arg(long)]
    sum_tolerance: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse the five questionnaires of one company
    Parse {
        /// Company name, the workbook key
        company: String,
        /// The five questionnaire HTML files, in any order
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },
    /// Parse every company folder under the companies directory
    Batch {
        /// Companies directory (overrides the config)
        dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    // ─── 2) config, with flags on top ────────────────────────────────
    let args = Args::parse();
    let mut config = PipelineConfig::load(args.config.as_deref())?;
    if let Some(workbook) = args.workbook {
        config.workbook = workbook;
    }
    if let Some(tolerance) = args.sum_tolerance {
        config.sum_tolerance = tolerance;
    }
    info!(workbook = %config.workbook.display(), "startup");

    let mut pipeline = Pipeline::open(&config)?;

    // ─── 3) run ──────────────────────────────────────────────────────
    match args.command {
        Command::Parse { company, files } => {
            let composed = pipeline
                .process_company(&company, &files)
                .with_context(|| format!("processing {}", company))?;
            info!(
                company = %composed.company,
                row = composed.row,
                status = %composed.status,
                flagged = composed.flagged.len(),
                "composed"
            );
        }
        Command::Batch { dir } => {
            let dir = dir.unwrap_or_else(|| config.companies_dir.clone());
            let report = pipeline.run_batch(&dir)?;
            for e in &report.failed {
                error!(company = %e.company(), "{}", e);
            }
            if !report.is_success() {
                anyhow::bail!("{} of {} companies failed", report.failed.len(), report.failed.len() + report.composed.len());
            }
        }
    }

    info!("all done");
    Ok(())
}
