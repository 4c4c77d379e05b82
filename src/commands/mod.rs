pub mod list;
pub mod scan;

use crate::cli::Commands;
use astguard::errors::AuditResult;
use astguard::patterns::{self, Severity};
use astguard::utils::Config;
use std::process::ExitCode;

pub fn handle_command(command: Commands, config: &mut Config) -> AuditResult<ExitCode> {
    match command {
        Commands::Scan {
            path,
            format,
            high_only,
            min_severity,
            fail_on,
            ignore_file_errors,
        } => {
            if let Some(s) = min_severity {
                config.scanner.min_severity = s;
            }
            if high_only {
                config.scanner.min_severity = Severity::High
            };
            if let Some(s) = fail_on {
                config.scanner.fail_on = s;
            }
            if ignore_file_errors {
                config.scanner.ignore_file_errors = true;
            }
            if let Some(f) = format {
                config.output.default_format = f;
            }

            let registry = patterns::build(&config.rules)?;
            scan::handle(&path, &registry, config)
        }
        Commands::List { verbose } => {
            let registry = patterns::build(&config.rules)?;
            list::handle(verbose, &registry)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
