pub mod api;
pub mod auth;
mod common;
pub mod config_audit;
pub mod control_flow;
pub mod crypto;
pub mod logging;
pub mod secrets;
pub mod comms;
pub mod strings;

use crate::errors::{AuditError, AuditResult};
use crate::registry::{Rule, RuleRegistry};
use console::style;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[serde(alias = "HIGH", alias = "High")]
    High,
    #[serde(alias = "MEDIUM", alias = "Medium")]
    Medium,
    #[serde(alias = "LOW", alias = "Low")]
    Low,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Severity::High => style("HIGH").red().bold().to_string(),
            Severity::Medium => style("MEDIUM").yellow().bold().to_string(),
            Severity::Low => style("LOW").cyan().bold().to_string(),
        };
        f.write_str(&s)
    }
}

impl Severity {
    /// Unstyled upper-case name.
    pub fn label(self) -> &'static str {
        match self {
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }

    /// `High` is the most severe; `Low.at_least(Medium)` is false.
    pub fn at_least(self, threshold: Severity) -> bool {
        self <= threshold
    }
}

impl FromStr for Severity {
    type Err = AuditError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_lowercase().as_str() {
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            other => Err(AuditError::Other(format!("unknown severity `{other}`"))),
        }
    }
}

/// Static description of one rule in the catalog.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct RuleMeta {
    /// Unique identifier (snake-case).
    pub id: &'static str,
    /// Human-readable explanation.
    pub description: &'static str,
    /// Finding text; `{name}`-style holes are filled by [`RuleMeta::render`].
    pub message: &'static str,
    /// Default severity bucket.
    pub severity: Severity,
}

impl RuleMeta {
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        let mut out = self.message.to_owned();
        for (key, value) in vars {
            out = out.replace(&format!("{{{key}}}"), value);
        }
        out
    }
}

/// `[rules]` section: every matcher parameter the catalog reads.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default, deny_unknown_fields)]
pub struct RuleSetConfig {
    /// Rule ids that are not installed.
    pub disabled: Vec<String>,
    /// Per-rule severity overrides.
    pub severity: BTreeMap<String, Severity>,
    pub crypto: crypto::CryptoConfig,
    pub auth: auth::AuthConfig,
    pub logging: logging::LoggingConfig,
    pub secrets: secrets::SecretsConfig,
    pub comms: comms::CommsConfig,
    pub strings: strings::StringsConfig,
    pub control_flow: control_flow::ControlFlowConfig,
    pub config_audit: config_audit::ConfigAuditConfig,
    pub api: api::ApiConfig,
}

/// Every built-in rule, in registration order.
pub static CATALOG: Lazy<Vec<&'static RuleMeta>> = Lazy::new(|| {
    let families: [&'static [RuleMeta]; 9] = [
        crypto::RULES,
        auth::RULES,
        logging::RULES,
        secrets::RULES,
        comms::RULES,
        strings::RULES,
        control_flow::RULES,
        config_audit::RULES,
        api::RULES,
    ];
    let all: Vec<&'static RuleMeta> = families.into_iter().flat_map(|f| f.iter()).collect();
    tracing::debug!("rule catalog initialised ({} rules)", all.len());
    all
});

pub fn lookup(id: &str) -> Option<&'static RuleMeta> {
    CATALOG.iter().copied().find(|m| m.id == id)
}

/// Applies `[rules.severity]` overrides to catalog entries.
pub(crate) struct Overrides<'c> {
    severity: &'c BTreeMap<String, Severity>,
}

impl Overrides<'_> {
    pub(crate) fn meta(&self, base: &RuleMeta) -> RuleMeta {
        let mut meta = *base;
        if let Some(s) = self.severity.get(base.id) {
            meta.severity = *s;
        }
        meta
    }
}

pub(crate) fn compile(field: &str, pattern: &str) -> AuditResult<Regex> {
    Regex::new(pattern).map_err(|e| AuditError::config(format!("`{field}`: {e}")))
}

/// Validate `cfg` and build the registry. Any problem is fatal: no scan
/// starts with a half-valid rule set.
pub fn build(cfg: &RuleSetConfig) -> AuditResult<RuleRegistry> {
    for id in cfg.disabled.iter().chain(cfg.severity.keys()) {
        if lookup(id).is_none() {
            return Err(AuditError::config(format!("unknown rule id `{id}`")));
        }
    }

    let ov = Overrides { severity: &cfg.severity };
    let mut rules: Vec<Arc<dyn Rule>> = Vec::new();
    rules.extend(crypto::rules(&cfg.crypto, &ov)?);
    rules.extend(auth::rules(&cfg.auth, &ov)?);
    rules.extend(logging::rules(&cfg.logging, &ov)?);
    rules.extend(secrets::rules(&cfg.secrets, &ov)?);
    rules.extend(comms::rules(&cfg.comms, &ov)?);
    rules.extend(strings::rules(&cfg.strings, &ov)?);
    rules.extend(control_flow::rules(&cfg.control_flow, &ov)?);
    rules.extend(config_audit::rules(&cfg.config_audit, &ov)?);
    rules.extend(api::rules(&cfg.api, &ov)?);

    rules.retain(|r| !cfg.disabled.iter().any(|d| d == r.meta().id));
    RuleRegistry::new(rules)
}

#[test]
fn severity_label_roundtrip() {
    for &s in &[Severity::High, Severity::Medium, Severity::Low] {
        let db = s.label();
        assert!(matches!(db, "HIGH" | "MEDIUM" | "LOW"));

        assert_eq!(db.parse::<Severity>().unwrap(), s);
        assert_eq!(db.to_lowercase().parse::<Severity>().unwrap(), s);
    }
    assert!("critical".parse::<Severity>().is_err());
}

#[test]
fn severity_display_contains_uppercase_name() {
    assert!(Severity::High.to_string().contains("HIGH"));
    assert!(Severity::Medium.to_string().contains("MEDIUM"));
    assert!(Severity::Low.to_string().contains("LOW"));
}

#[test]
fn at_least_orders_high_first() {
    assert!(Severity::High.at_least(Severity::Medium));
    assert!(Severity::Medium.at_least(Severity::Medium));
    assert!(!Severity::Low.at_least(Severity::Medium));
}

#[test]
fn render_fills_named_holes() {
    let meta = RuleMeta {
        id: "x",
        description: "",
        message: "uses a weak key size for {primitive} ({bits} < {min})",
        severity: Severity::High,
    };
    assert_eq!(
        meta.render(&[("primitive", "RSA"), ("bits", "1024"), ("min", "2048")]),
        "uses a weak key size for RSA (1024 < 2048)"
    );
}

#[test]
fn catalog_ids_are_unique_and_default_set_builds() {
    let mut ids: Vec<_> = CATALOG.iter().map(|m| m.id).collect();
    let n = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), n);

    let reg = build(&RuleSetConfig::default()).expect("defaults are valid");
    // non_range_iterable is opt-in
    assert_eq!(reg.len(), n - 1);
}

#[test]
fn unknown_ids_and_bad_patterns_are_fatal() {
    let mut cfg = RuleSetConfig::default();
    cfg.disabled.push("no_such_rule".into());
    assert!(matches!(build(&cfg), Err(AuditError::Config(_))));

    let mut cfg = RuleSetConfig::default();
    cfg.crypto.insecure_hash = "(".into();
    assert!(matches!(build(&cfg), Err(AuditError::Config(_))));
}

#[test]
fn disabled_rules_are_not_installed_and_overrides_apply() {
    let mut cfg = RuleSetConfig::default();
    cfg.disabled.push("assert_used".into());
    cfg.severity.insert("insecure_hash".into(), Severity::Low);
    let reg = build(&cfg).unwrap();

    assert!(reg.rules().iter().all(|r| r.meta().id != "assert_used"));
    let hash = reg.rules().iter().find(|r| r.meta().id == "insecure_hash").unwrap();
    assert_eq!(hash.meta().severity, Severity::Low);
}
