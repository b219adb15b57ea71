// src/bin/aggregate.rs
use anyhow::{Context, Result};
use cdp_harvest::{
    aggregate::{load_references, provider_for, Aggregator},
    compose::Workbook,
    config::PipelineConfig,
    validate::Validator,
};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "aggregate")]
#[command(about = "Join validated workbook rows with reference tables into flat CSV databases")]
struct Args {
    /// YAML config file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Workbook to read (overrides the config)
    #[arg(short, long)]
    workbook: Option<PathBuf>,

    /// Output directory (overrides the config)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Company list: path or http(s) URL
    #[arg(long)]
    companies: Option<String>,

    /// RE100 membership list: path or http(s) URL
    #[arg(long)]
    re100: Option<String>,

    /// SBTi membership list: path or http(s) URL
    #[arg(long)]
    sbti: Option<String>,
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let args = Args::parse();
    let mut config = PipelineConfig::load(args.config.as_deref())?;
    if let Some(w) = args.workbook {
        config.workbook = w;
    }
    if let Some(o) = args.output {
        config.database_dir = o;
    }
    let refs = &mut config.references;
    for (arg, slot) in [
        (args.companies, &mut refs.companies),
        (args.re100, &mut refs.re100),
        (args.sbti, &mut refs.sbti),
    ] {
        if let Some(source) = arg {
            *slot = source;
        }
    }

    // 1) validated rows
    let workbook = Workbook::open(&config.workbook)
        .with_context(|| format!("opening workbook {}", config.workbook.display()))?;
    let rows = workbook.records();
    info!(rows = rows.len(), workbook = %config.workbook.display(), "read workbook");

    // 2) reference tables
    let refs = load_references(
        provider_for(&config.references.companies)?.as_ref(),
        provider_for(&config.references.re100)?.as_ref(),
        provider_for(&config.references.sbti)?.as_ref(),
    )?;

    // 3) join and write
    let db = Aggregator::new(Validator::new(config.sum_tolerance)).aggregate(&rows, &refs);
    let written = db.write(&config.database_dir)?;
    for path in &written {
        info!(path = %path.display(), "wrote");
    }
    Ok(())
}
