//! Runs a simulated configuration search and prints the report as JSON.
//!
//! Usage:
//!   sweep-sim [config.json] [--mode quick|brute|quick-plus-sweep] [--seed N]

use anyhow::Context;
use clap::{Parser, ValueEnum};
use ms_sim::{run_search, SimConfig};
use ms_types::SearchMode;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Quick,
    Brute,
    QuickPlusSweep,
}

impl From<ModeArg> for SearchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Quick => SearchMode::Quick,
            ModeArg::Brute => SearchMode::Brute,
            ModeArg::QuickPlusSweep => SearchMode::QuickPlusSweep,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON simulation config; built-in defaults when omitted
    config: Option<PathBuf>,

    /// Override the configured search mode
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Override the endpoint noise seed
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SimConfig::from_json_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => SimConfig::default(),
    };
    if let Some(mode) = cli.mode {
        config.search.mode = mode.into();
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }

    let mut endpoint = config.endpoint();
    let report = run_search(&config.search, &mut endpoint).context("search failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
