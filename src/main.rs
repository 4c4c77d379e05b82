mod cli;
mod commands;

use astguard::errors::{AuditError, AuditResult};
use astguard::utils::Config;
use clap::Parser;
use cli::Cli;
use console::style;
use directories::ProjectDirs;
use std::fs;
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::fmt::time;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt};

fn init_tracing() {
    let fmt_layer = fmt::layer()
        .pretty()
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .with_timer(time::UtcTime::rfc_3339());

    Registry::default()
        .with(EnvFilter::from_default_env())
        .with(fmt_layer)
        .init();
}

fn load_config(explicit: Option<&std::path::Path>) -> AuditResult<Config> {
    if let Some(path) = explicit {
        return Config::from_file(path);
    }

    let proj_dirs = ProjectDirs::from("dev", "astguard", "astguard")
        .ok_or_else(|| AuditError::Other("unable to determine project directories".into()))?;
    let config_dir = proj_dirs.config_dir();
    fs::create_dir_all(config_dir)?;
    Config::load(config_dir)
}

fn run(cli: Cli) -> AuditResult<ExitCode> {
    let mut config = load_config(cli.config.as_deref())?;

    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .stack_size(config.performance.rayon_thread_stack_size)
        .num_threads(config.performance.worker_threads.unwrap_or(0))
        .build_global()
    {
        tracing::debug!("rayon pool already configured: {e}");
    }

    commands::handle_command(cli.command, &mut config)
}

fn main() -> ExitCode {
    let now = Instant::now();
    init_tracing();

    tracing::debug!("CLI starting up");
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => {
            eprintln!(
                "{} in {:.3}s.",
                style("Finished").green().bold(),
                now.elapsed().as_secs_f32()
            );
            code
        }
        Err(e) => {
            eprintln!("{}: {e}", style("error").red().bold());
            ExitCode::from(2)
        }
    }
}
