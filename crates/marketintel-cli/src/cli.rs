use std::path::PathBuf;

use clap::Parser;

/// The single entry point: run the pipeline once or keep it running on
/// the configured interval.
#[derive(Parser)]
#[command(name = "marketintel")]
#[command(about = "Market intelligence ingestion and ranking pipeline", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file path (TOML, layered with MARKETINTEL_-prefixed env vars)
    #[arg(short, long, value_name = "FILE", default_value = "marketintel.toml")]
    pub config: PathBuf,

    /// Run exactly one pass and exit instead of starting the scheduler
    #[arg(long)]
    pub once: bool,

    /// Verbose logging (overrides the configured log level with "debug")
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
