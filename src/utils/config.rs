use crate::errors::AuditResult;
use crate::patterns::{RuleSetConfig, Severity};
use clap::ValueEnum;
use console::style;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

static DEFAULT_CONFIG_TOML: &str = include_str!("../../default-astguard.conf");

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Coloured, one line per finding.
    #[default]
    Console,
    /// The `Diagnostic` display form, prefixed with the path.
    Plain,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ScannerConfig {
    /// The minimum severity level to output
    pub min_severity: Severity,

    /// Exit with status 1 when a finding is at least this severe.
    pub fail_on: Severity,

    /// The maximum file size to scan, in megabytes.
    pub max_file_size_mb: Option<u64>,

    /// Directories to exclude from scanning.
    pub excluded_directories: Vec<String>,

    /// Whether to follow symlinks or not.
    pub follow_symlinks: bool,

    /// Whether to scan hidden files or not.
    pub scan_hidden_files: bool,

    /// Exit normally even when some files could not be read or parsed.
    pub ignore_file_errors: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            min_severity: Severity::Low,
            fail_on: Severity::High,
            max_file_size_mb: None,
            excluded_directories: vec![
                ".git",
                ".venv",
                "venv",
                "__pycache__",
                ".tox",
                "node_modules",
                "build",
                "dist",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            follow_symlinks: false,
            scan_hidden_files: false,
            ignore_file_errors: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// The default output format.
    pub default_format: OutputFormat,

    /// Suppress per-finding output; only the exit code reports.
    pub quiet: bool,

    /// The maximum number of results to show.
    pub max_results: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PerformanceConfig {
    /// The maximum number of worker threads to use, or `None` to auto-detect.
    pub worker_threads: Option<usize>,

    /// capacity = threads × this
    pub channel_multiplier: usize,

    /// The stack size for Rayon threads, in bytes.
    pub rayon_thread_stack_size: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            channel_multiplier: 4,
            rayon_thread_stack_size: 8 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub scanner: ScannerConfig,
    pub output: OutputConfig,
    pub performance: PerformanceConfig,
    pub rules: RuleSetConfig,
}

impl Config {
    pub fn load(config_dir: &Path) -> AuditResult<Self> {
        let mut config = Config::default();

        let default_config_path = config_dir.join("astguard.conf");
        if !default_config_path.exists() {
            create_example_config(config_dir)?;
        }

        let user_config_path = config_dir.join("astguard.local");
        if user_config_path.exists() {
            let user_config = Config::from_file(&user_config_path)?;
            config = merge_configs(config, user_config);

            eprintln!(
                "{}: Loaded user config from: {}\n",
                style("note").green().bold(),
                style(user_config_path.display()).underlined().white().bold()
            );
        } else {
            eprintln!(
                "{}: Using {} configuration.\n      Create file in '{}' to customize.\n",
                style("note").green().bold(),
                style("default").bold(),
                style(user_config_path.display()).underlined().white().bold()
            );
        }

        Ok(config)
    }

    /// Read one TOML file; missing sections fall back to defaults.
    pub fn from_file(path: &Path) -> AuditResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        tracing::debug!("config read from {}", path.display());
        Ok(config)
    }
}

fn create_example_config(config_dir: &Path) -> AuditResult<()> {
    let example_path = config_dir.join("astguard.conf");
    if !example_path.exists() {
        fs::write(&example_path, DEFAULT_CONFIG_TOML)?;
        tracing::debug!("Example config created at: {}", example_path.display());
    }
    Ok(())
}

/// Merge user config into default config, preserving default exclusions and
/// overriding everything else.
fn merge_configs(mut default: Config, user: Config) -> Config {
    // --- ScannerConfig ---
    default.scanner.min_severity = user.scanner.min_severity;
    default.scanner.fail_on = user.scanner.fail_on;
    default.scanner.max_file_size_mb = user.scanner.max_file_size_mb;
    default.scanner.follow_symlinks = user.scanner.follow_symlinks;
    default.scanner.scan_hidden_files = user.scanner.scan_hidden_files;
    default.scanner.ignore_file_errors = user.scanner.ignore_file_errors;

    default
        .scanner
        .excluded_directories
        .extend(user.scanner.excluded_directories);
    default.scanner.excluded_directories.sort_unstable();
    default.scanner.excluded_directories.dedup();

    // --- OutputConfig / PerformanceConfig ---
    default.output = user.output;
    default.performance = user.performance;

    // --- RuleSetConfig ---
    default.rules = user.rules;

    default
}

#[test]
fn merge_configs_dedupes_exclusions() {
    let mut default_cfg = Config::default();
    default_cfg.scanner.excluded_directories = vec!["venv".into(), ".git".into()];

    let mut user_cfg = Config::default();
    user_cfg.scanner.excluded_directories = vec!["migrations".into(), "venv".into()];

    let merged = merge_configs(default_cfg, user_cfg);

    assert_eq!(merged.scanner.excluded_directories, vec![".git", "migrations", "venv"]);
}

#[test]
fn load_creates_example_and_reads_user_overrides() {
    let cfg_dir = tempfile::tempdir().unwrap();
    let cfg_path = cfg_dir.path();

    let user_toml = r#"
        [scanner]
        fail_on = "medium"
        excluded_directories = ["migrations"]

        [output]
        default_format = "plain"

        [rules]
        disabled = ["assert_used"]

        [rules.severity]
        insecure_random = "high"

        [rules.crypto]
        insecure_hash = "^md4$"
    "#;
    fs::write(cfg_path.join("astguard.local"), user_toml).unwrap();

    let cfg = Config::load(cfg_path).expect("Config::load should succeed");

    assert!(cfg_path.join("astguard.conf").is_file());
    assert_eq!(cfg.scanner.fail_on, Severity::Medium);
    assert_eq!(cfg.output.default_format, OutputFormat::Plain);
    assert!(cfg.scanner.excluded_directories.contains(&"migrations".to_string()));
    assert!(cfg.scanner.excluded_directories.contains(&".git".to_string()));
    assert_eq!(cfg.rules.disabled, vec!["assert_used"]);
    assert_eq!(cfg.rules.severity.get("insecure_random"), Some(&Severity::High));
    assert_eq!(cfg.rules.crypto.insecure_hash, "^md4$");
    assert!(!cfg.scanner.follow_symlinks);
}

#[test]
fn shipped_example_config_parses() {
    let cfg: Config = toml::from_str(DEFAULT_CONFIG_TOML).expect("example config is valid TOML");
    assert!(crate::patterns::build(&cfg.rules).is_ok());
}

#[test]
fn unknown_rule_parameters_are_rejected() {
    let bad = "[rules.crypto]\nno_such_knob = 1\n";
    assert!(toml::from_str::<Config>(bad).is_err());
}
