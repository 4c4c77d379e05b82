//! Configuration sources, shell-outs and password prompts.

use crate::errors::AuditResult;
use crate::matchers::CallMatcher;
use crate::matchers::call::{call_name, call_path, str_arg};
use crate::node::{KindSet, Node};
use crate::patterns::common::{CallRule, strings};
use crate::patterns::{Overrides, RuleMeta, Severity};
use crate::registry::{Finding, Rule};
use crate::traverse::AncestorContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const CONFIG_SOURCE: RuleMeta = RuleMeta {
    id: "insecure_config_source",
    description: "Configuration read through ConfigParser or the environment",
    message: "uses an insecure configuration function ({name})",
    severity: Severity::Low,
};

pub const INI_FILE: RuleMeta = RuleMeta {
    id: "ini_config_file",
    description: "open() on an .ini configuration file",
    message: "uses an insecure configuration file format ({file})",
    severity: Severity::Low,
};

pub const SHELL_COMMAND: RuleMeta = RuleMeta {
    id: "insecure_shell_command",
    description: "subprocess call running ssh/scp from a literal command",
    message: "uses an insecure shell command ({command})",
    severity: Severity::Medium,
};

pub const GETPASS: RuleMeta = RuleMeta {
    id: "getpass_prompt",
    description: "getpass() used for password input",
    message: "uses {name}() instead of a secure password input function",
    severity: Severity::Low,
};

pub const RULES: &[RuleMeta] = &[CONFIG_SOURCE, INI_FILE, SHELL_COMMAND, GETPASS];

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigAuditConfig {
    pub sources: Vec<String>,
    pub file_suffixes: Vec<String>,
    /// Dotted paths of process launchers.
    pub launchers: Vec<String>,
    pub remote_tools: Vec<String>,
    pub prompts: Vec<String>,
}

impl Default for ConfigAuditConfig {
    fn default() -> Self {
        Self {
            sources: strings(&["ConfigParser", "environ"]),
            file_suffixes: strings(&[".ini"]),
            launchers: strings(&["subprocess.call", "subprocess.Popen"]),
            remote_tools: strings(&["ssh", "scp"]),
            prompts: strings(&["getpass"]),
        }
    }
}

struct IniFile {
    meta: RuleMeta,
    suffixes: Vec<String>,
}

impl Rule for IniFile {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::CALL
    }

    fn check(&self, node: &Node, _cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        if call_name(node) != Some("open") {
            return Vec::new();
        }
        match str_arg(node, 0) {
            Some(file) if self.suffixes.iter().any(|s| file.ends_with(s.as_str())) => {
                vec![Finding::at(node, self.meta.render(&[("file", file)]))]
            }
            _ => Vec::new(),
        }
    }
}

struct ShellCommand {
    meta: RuleMeta,
    launchers: Vec<String>,
    tools: Vec<String>,
}

impl Rule for ShellCommand {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::CALL
    }

    fn check(&self, node: &Node, _cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        let launched = call_path(node).is_some_and(|p| self.launchers.iter().any(|l| *l == p));
        if !launched {
            return Vec::new();
        }
        match str_arg(node, 0) {
            Some(cmd) if self.tools.iter().any(|t| cmd.contains(t.as_str())) => {
                vec![Finding::at(node, self.meta.render(&[("command", cmd)]))]
            }
            _ => Vec::new(),
        }
    }
}

pub(crate) fn rules(cfg: &ConfigAuditConfig, ov: &Overrides<'_>) -> AuditResult<Vec<Arc<dyn Rule>>> {
    let rules: Vec<Arc<dyn Rule>> = vec![
        Arc::new(CallRule::new(ov.meta(&CONFIG_SOURCE), CallMatcher::names(cfg.sources.iter().cloned()))),
        Arc::new(IniFile { meta: ov.meta(&INI_FILE), suffixes: cfg.file_suffixes.clone() }),
        Arc::new(ShellCommand {
            meta: ov.meta(&SHELL_COMMAND),
            launchers: cfg.launchers.clone(),
            tools: cfg.remote_tools.clone(),
        }),
        Arc::new(CallRule::new(ov.meta(&GETPASS), CallMatcher::names(cfg.prompts.iter().cloned()))),
    ];
    Ok(rules)
}

#[cfg(test)]
use crate::node::{NodeData, build::*};

#[cfg(test)]
fn dotted(base: &str, attr: &str) -> Node {
    at(1, NodeData::Attribute { value: Box::new(name(base)), attr: attr.into() })
}

#[test]
fn ini_files_only() {
    let rule = IniFile { meta: INI_FILE, suffixes: strings(&[".ini"]) };
    let cx = AncestorContext::empty();
    assert_eq!(rule.check(&call(name("open"), vec![string("settings.ini")]), &cx).len(), 1);
    assert!(rule.check(&call(name("open"), vec![string("settings.toml")]), &cx).is_empty());
}

#[test]
fn remote_shell_commands_through_subprocess() {
    let cfg = ConfigAuditConfig::default();
    let rule = ShellCommand { meta: SHELL_COMMAND, launchers: cfg.launchers, tools: cfg.remote_tools };
    let cx = AncestorContext::empty();

    let scp = call(dotted("subprocess", "call"), vec![string("scp db.dump backup:")]);
    assert_eq!(rule.check(&scp, &cx)[0].message, "uses an insecure shell command (scp db.dump backup:)");

    let ls = call(dotted("subprocess", "call"), vec![string("ls -l")]);
    assert!(rule.check(&ls, &cx).is_empty());

    let other = call(dotted("os", "system"), vec![string("ssh host")]);
    assert!(rule.check(&other, &cx).is_empty());
}
