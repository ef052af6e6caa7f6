//! Argument parsing & validation.
//!
//! Strictly offline: the CLI drives one full pipeline from a manifest file
//! and writes canonical artifacts into an output directory. Networked paths
//! are rejected outright.

use camino::Utf8PathBuf;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "ff", about = "Deterministic financial forensics engine")]
pub struct Args {
    /// Pipeline manifest (records, fx bundle, parameters, actor).
    #[arg(long)]
    pub manifest: Utf8PathBuf,

    /// Output directory for run_summary.json and report.json.
    #[arg(long, default_value = ".")]
    pub out: Utf8PathBuf,

    /// Enable an engine id in addition to TODISCOPE_ENABLED_ENGINES.
    #[arg(long = "enable")]
    pub enable: Vec<String>,

    /// Stop after the run; skip lifecycle approval and report assembly.
    #[arg(long)]
    pub no_report: bool,

    /// Suppress the summary line on stdout.
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Debug)]
pub enum CliError {
    NonLocalPath(String),
    Io(String),
    Manifest(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::NonLocalPath(p) => write!(f, "non-local path rejected: {p}"),
            CliError::Io(e) => write!(f, "io: {e}"),
            CliError::Manifest(e) => write!(f, "manifest: {e}"),
        }
    }
}

/// Parse argv and validate the offline posture.
pub fn parse_and_validate() -> Result<Args, CliError> {
    let args = Args::parse();
    for path in [&args.manifest, &args.out] {
        if path.as_str().contains("://") {
            return Err(CliError::NonLocalPath(path.to_string()));
        }
    }
    Ok(args)
}
