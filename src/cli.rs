use astguard::patterns::Severity;
use astguard::utils::OutputFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "astguard")]
#[command(about = "A rule-based security auditor for Python sources")]
#[command(version)]
pub struct Cli {
    /// Read this TOML file instead of the per-user configuration
    #[arg(long, global = true, value_name = "FILE")]
    pub(crate) config: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a file or directory of Python sources
    Scan {
        /// Path to scan (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Output format (defaults to `output.default_format`)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Show only high severity issues
        #[arg(long)]
        high_only: bool,

        /// Hide findings below this severity
        #[arg(long, value_name = "SEVERITY")]
        min_severity: Option<Severity>,

        /// Exit with status 1 when a finding is at least this severe
        #[arg(long, value_name = "SEVERITY")]
        fail_on: Option<Severity>,

        /// Exit normally even when some files fail to parse
        #[arg(long)]
        ignore_file_errors: bool,
    },

    /// List the rule catalog
    List {
        /// Show descriptions and message templates
        #[arg(short, long)]
        verbose: bool,
    },
}
