use astguard::ast::run_rules_on_file;
use astguard::errors::{AuditError, AuditResult};
use astguard::registry::RuleRegistry;
use astguard::report::Diagnostic;
use astguard::utils::{Config, OutputFormat};
use astguard::walk::spawn_senders;
use console::style;
use rayon::prelude::*;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
pub struct Diag {
    pub(crate) path: String,
    pub(crate) diagnostic: Diagnostic,
}

/// What one run over the file tree produced.
#[derive(Debug, Default)]
struct ScanSummary {
    diags: Vec<Diag>,
    /// Files that were parsed and checked.
    files: usize,
    /// Files that could not be read, decoded or parsed.
    errors: usize,
}

/// Entry point called by the CLI.
pub fn handle(path: &str, registry: &RuleRegistry, config: &Config) -> AuditResult<ExitCode> {
    let scan_path = Path::new(path).canonicalize()?;
    let ScanSummary { diags, files, errors } = scan_filesystem(&scan_path, registry, config)?;

    let failed = diags
        .iter()
        .any(|d| d.diagnostic.severity.at_least(config.scanner.fail_on));
    let shown = select(diags, config);

    if !config.output.quiet {
        for d in &shown {
            println!("{}", render(d, config.output.default_format));
        }
        eprintln!(
            "{} {} finding(s) in {} file(s)",
            style("Scanned:").bold(),
            shown.len(),
            files
        );
    }
    if errors > 0 {
        eprintln!("{} {} file(s) could not be scanned", style("warning:").yellow().bold(), errors);
    }

    Ok(exit_code(failed, errors, config.scanner.ignore_file_errors))
}

/// Unscannable files outrank findings: a tree that did not parse has not
/// been audited.
fn exit_code(failed: bool, errors: usize, ignore_file_errors: bool) -> ExitCode {
    if errors > 0 && !ignore_file_errors {
        ExitCode::from(2)
    } else if failed {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

/// Severity filter and result cap; order is preserved.
fn select(diags: Vec<Diag>, config: &Config) -> Vec<Diag> {
    let limit = config.output.max_results.map_or(usize::MAX, |n| n as usize);
    diags
        .into_iter()
        .filter(|d| d.diagnostic.severity.at_least(config.scanner.min_severity))
        .take(limit)
        .collect()
}

fn render(d: &Diag, format: OutputFormat) -> String {
    match format {
        OutputFormat::Plain => format!("{}: {}", d.path, d.diagnostic),
        OutputFormat::Console => {
            let diag = &d.diagnostic;
            let func = diag
                .function
                .as_deref()
                .map(|f| format!("{} ", style(f).white().bold()))
                .unwrap_or_default();
            format!(
                "{}:{}:{}  [{}]  {}  {}{}",
                style(&d.path).blue().underlined(),
                diag.loc.line,
                diag.loc.col,
                diag.severity,
                style(diag.rule_id).bold(),
                func,
                diag.message,
            )
        }
    }
}

// --------------------------------------------------------------------------------------------
// Scanning helpers
// --------------------------------------------------------------------------------------------

/// Every diagnostic under `root`, grouped by path in path order and in
/// traversal order within a file.
fn scan_filesystem(root: &Path, registry: &RuleRegistry, cfg: &Config) -> AuditResult<ScanSummary> {
    let rx = spawn_senders(root, cfg);
    let acc: Mutex<Vec<(String, Vec<Diagnostic>)>> = Mutex::new(Vec::new());
    let errors = AtomicUsize::new(0);

    rx.into_iter()
        .flatten()
        .par_bridge()
        .for_each(|path| match run_rules_on_file(&path, registry) {
            Ok(diags) => {
                let entry = (path.to_string_lossy().into_owned(), diags);
                match acc.lock() {
                    Ok(mut guard) => guard.push(entry),
                    Err(poisoned) => poisoned.into_inner().push(entry),
                }
            }
            Err(e) => {
                errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("skipping {}: {e}", path.display());
            }
        });

    let mut per_file = acc
        .into_inner()
        .map_err(|_| AuditError::Other("result accumulator poisoned".into()))?;
    per_file.sort_by(|a, b| a.0.cmp(&b.0));

    let files = per_file.len();
    let diags = per_file
        .into_iter()
        .flat_map(|(path, diags)| {
            diags.into_iter().map(move |diagnostic| Diag { path: path.clone(), diagnostic })
        })
        .collect();
    Ok(ScanSummary { diags, files, errors: errors.into_inner() })
}

#[cfg(test)]
use astguard::node::Location;
#[cfg(test)]
use astguard::patterns::Severity;

#[cfg(test)]
fn diag(path: &str, severity: Severity) -> Diag {
    Diag {
        path: path.into(),
        diagnostic: Diagnostic {
            rule_id: "insecure_hash",
            severity,
            message: "uses an insecure hash function".into(),
            loc: Location::new(3, 12),
            function: Some("digest".into()),
        },
    }
}

#[test]
fn select_filters_by_severity_and_caps() {
    let mut cfg = Config::default();
    cfg.scanner.min_severity = Severity::Medium;
    let diags = vec![
        diag("a.py", Severity::Low),
        diag("a.py", Severity::High),
        diag("b.py", Severity::Medium),
    ];
    let shown = select(diags, &cfg);
    assert_eq!(shown.len(), 2);
    assert_eq!(shown[0].diagnostic.severity, Severity::High);

    cfg.output.max_results = Some(1);
    assert_eq!(select(vec![diag("a.py", Severity::High), diag("b.py", Severity::High)], &cfg).len(), 1);
}

#[test]
fn plain_rendering_prefixes_the_path() {
    assert_eq!(
        render(&diag("src/app.py", Severity::Medium), OutputFormat::Plain),
        "src/app.py: MEDIUM: digest uses an insecure hash function (3:12)"
    );
}

#[test]
fn directory_scan_is_sorted_by_path_and_counts_broken_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("b.py"), "import hashlib\nhashlib.md5(b'')\n").unwrap();
    std::fs::write(dir.path().join("a.py"), "eval(x)\n").unwrap();
    std::fs::write(dir.path().join("c.py"), "def broken(:\n").unwrap();

    let registry = astguard::patterns::build(&Default::default()).unwrap();
    let ScanSummary { diags, files, errors } = scan_filesystem(dir.path(), &registry, &Config::default()).unwrap();

    assert_eq!(files, 2);
    assert_eq!(errors, 1);
    let paths: Vec<_> = diags.iter().map(|d| Path::new(&d.path).file_name().unwrap().to_owned()).collect();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);
    assert!(diags.iter().any(|d| d.diagnostic.rule_id == "insecure_hash"));
    assert!(diags.iter().any(|d| d.diagnostic.rule_id == "dangerous_builtin"));
}

#[test]
fn unscannable_files_fail_the_run_unless_ignored() {
    assert_eq!(exit_code(false, 0, false), ExitCode::SUCCESS);
    assert_eq!(exit_code(true, 0, false), ExitCode::from(1));
    assert_eq!(exit_code(false, 1, false), ExitCode::from(2));
    assert_eq!(exit_code(true, 3, false), ExitCode::from(2));
    assert_eq!(exit_code(true, 3, true), ExitCode::from(1));
    assert_eq!(exit_code(false, 3, true), ExitCode::SUCCESS);
}

#[test]
fn a_tree_that_never_parses_exits_with_an_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.py"), "def broken(:\n").unwrap();
    let registry = astguard::patterns::build(&Default::default()).unwrap();
    let mut cfg = Config::default();
    cfg.output.quiet = true;

    let path = dir.path().to_string_lossy().into_owned();
    assert_eq!(handle(&path, &registry, &cfg).unwrap(), ExitCode::from(2));

    cfg.scanner.ignore_file_errors = true;
    assert_eq!(handle(&path, &registry, &cfg).unwrap(), ExitCode::SUCCESS);
}
