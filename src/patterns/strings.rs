//! Suspicious string literals, imports and builtins.

use crate::errors::AuditResult;
use crate::matchers::call::call_path;
use crate::matchers::literal::Hidden;
use crate::matchers::{CallMatcher, Deobfuscator, LiteralMatcher};
use crate::node::{KindSet, Node, NodeData, NodeKind};
use crate::patterns::common::{CallRule, strings};
use crate::patterns::{Overrides, RuleMeta, Severity, compile};
use crate::registry::{Finding, Rule};
use crate::traverse::AncestorContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const MALICIOUS_STRING: RuleMeta = RuleMeta {
    id: "malicious_string",
    description: "String literal naming code execution primitives",
    message: "contains a possibly malicious string ('{fragment}')",
    severity: Severity::Medium,
};

pub const DANGEROUS_CONTEXT: RuleMeta = RuleMeta {
    id: "dangerous_string_context",
    description: "String literal passed straight to a dangerous callee",
    message: "passes a string literal to {callee}",
    severity: Severity::Medium,
};

pub const OBFUSCATED_STRING: RuleMeta = RuleMeta {
    id: "obfuscated_string",
    description: "Encoded literal that decodes to suspicious content",
    message: "contains a possibly obfuscated string ({encoding} hiding {hidden})",
    severity: Severity::High,
};

pub const SUSPICIOUS_IMPORT: RuleMeta = RuleMeta {
    id: "suspicious_import",
    description: "Import of a keyword, builtin or dangerous module name",
    message: "imports '{module}' ({reason})",
    severity: Severity::Medium,
};

pub const DANGEROUS_BUILTIN: RuleMeta = RuleMeta {
    id: "dangerous_builtin",
    description: "Call to a code-loading or file-opening builtin",
    message: "calls the dangerous builtin {name}()",
    severity: Severity::Medium,
};

pub const RULES: &[RuleMeta] = &[
    MALICIOUS_STRING,
    DANGEROUS_CONTEXT,
    OBFUSCATED_STRING,
    SUSPICIOUS_IMPORT,
    DANGEROUS_BUILTIN,
];

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct StringsConfig {
    pub malicious: String,
    /// Applied to decoded text; wider than `malicious`.
    pub rescan: String,
    pub base64_shape: String,
    pub rot13_shape: String,
    pub hex_shape: String,
    pub dangerous_modules: Vec<String>,
    pub dangerous_functions: Vec<String>,
    pub bad_keywords: Vec<String>,
    pub bad_builtins: Vec<String>,
    pub dangerous_builtins: Vec<String>,
}

impl Default for StringsConfig {
    fn default() -> Self {
        Self {
            malicious: r"(?i)exec|eval|subprocess|shell|os\.".into(),
            rescan: r"(?i)exec|eval|subprocess|shell|os\.|input|__import__".into(),
            base64_shape: r"^[a-zA-Z0-9+/=]+\s*$".into(),
            rot13_shape: r"^[a-zA-Z]+://[a-zA-Z0-9]+\s*$".into(),
            hex_shape: r"^(?:0x[0-9a-fA-F]{2})+\s*$".into(),
            dangerous_modules: strings(&["subprocess", "os", "shutil", "sys"]),
            dangerous_functions: strings(&["eval", "exec", "input", "open", "__import__"]),
            bad_keywords: strings(&["import", "from", "exec", "eval", "print", "assert", "exit", "quit"]),
            bad_builtins: strings(&["eval", "exec", "open", "input", "print", "exit", "quit", "compile"]),
            dangerous_builtins: strings(&["eval", "exec", "open", "__import__", "compile"]),
        }
    }
}

fn literal(node: &Node) -> Option<&str> {
    match &node.data {
        NodeData::Str { value, .. } => Some(value),
        _ => None,
    }
}

struct MaliciousString {
    meta: RuleMeta,
    matcher: LiteralMatcher,
}

impl Rule for MaliciousString {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::STR
    }

    fn check(&self, node: &Node, _cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        match literal(node).and_then(|v| self.matcher.find(v)) {
            Some(fragment) => vec![Finding::at(node, self.meta.render(&[("fragment", fragment)]))],
            None => Vec::new(),
        }
    }
}

/// Only a literal that is a direct argument counts; `f(g("x"))` is judged
/// against `g`.
struct DangerousContext {
    meta: RuleMeta,
    modules: Vec<String>,
    functions: Vec<String>,
}

impl DangerousContext {
    fn dangerous_callee(&self, call: &Node) -> Option<String> {
        let NodeData::Call { func, .. } = &call.data else {
            return None;
        };
        if let Some(n) = func.as_name() {
            return self.functions.iter().any(|f| f == n).then(|| format!("dangerous function {n}()"));
        }
        let path = call_path(call)?;
        let root = path.split('.').next()?;
        self.modules
            .iter()
            .any(|m| m == root)
            .then(|| format!("{path}() from dangerous module {root}"))
    }
}

impl Rule for DangerousContext {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::STR
    }

    fn check(&self, node: &Node, cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        let Some(parent) = cx.parent().filter(|p| p.kind() == NodeKind::Call) else {
            return Vec::new();
        };
        match self.dangerous_callee(parent) {
            Some(callee) => vec![Finding::at(node, self.meta.render(&[("callee", callee.as_str())]))],
            None => Vec::new(),
        }
    }
}

struct ObfuscatedString {
    meta: RuleMeta,
    deob: Deobfuscator,
}

impl Rule for ObfuscatedString {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::STR
    }

    fn check(&self, node: &Node, _cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        let Some(decoded) = literal(node).and_then(|v| self.deob.inspect(v)) else {
            return Vec::new();
        };
        let hidden = match &decoded.hidden {
            Hidden::NulByte => "a NUL byte".to_owned(),
            Hidden::Pattern(p) => format!("'{p}'"),
        };
        vec![Finding::at(
            node,
            self.meta.render(&[("encoding", decoded.encoding.as_str()), ("hidden", hidden.as_str())]),
        )]
    }
}

struct SuspiciousImport {
    meta: RuleMeta,
    bad_keywords: Vec<String>,
    bad_builtins: Vec<String>,
    dangerous_modules: Vec<String>,
}

impl SuspiciousImport {
    fn reason(&self, module: &str) -> Option<&'static str> {
        let root = module.split('.').next().unwrap_or(module);
        let has = |set: &[String]| set.iter().any(|s| s == root);
        if has(&self.bad_keywords) {
            Some("malicious keyword")
        } else if has(&self.bad_builtins) {
            Some("built-in function name")
        } else if has(&self.dangerous_modules) {
            Some("dangerous module")
        } else {
            None
        }
    }
}

impl Rule for SuspiciousImport {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::IMPORT | KindSet::IMPORT_FROM
    }

    fn check(&self, node: &Node, _cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        let modules: Vec<&str> = match &node.data {
            NodeData::Import { names } => names.iter().map(|a| a.name.as_str()).collect(),
            NodeData::ImportFrom { module: Some(m), .. } => vec![m.as_str()],
            _ => Vec::new(),
        };
        modules
            .into_iter()
            .filter_map(|m| {
                let reason = self.reason(m)?;
                Some(Finding::at(node, self.meta.render(&[("module", m), ("reason", reason)])))
            })
            .collect()
    }
}

/// `eval(...)`, not `obj.eval(...)`.
fn bare_callee(call: &Node, _cx: &AncestorContext<'_, '_>) -> bool {
    matches!(&call.data, NodeData::Call { func, .. } if func.as_name().is_some())
}

pub(crate) fn rules(cfg: &StringsConfig, ov: &Overrides<'_>) -> AuditResult<Vec<Arc<dyn Rule>>> {
    let deob = Deobfuscator {
        base64_shape: compile("strings.base64_shape", &cfg.base64_shape)?,
        rot13_shape: compile("strings.rot13_shape", &cfg.rot13_shape)?,
        hex_shape: compile("strings.hex_shape", &cfg.hex_shape)?,
        rescan: LiteralMatcher::new(compile("strings.rescan", &cfg.rescan)?),
    };

    let rules: Vec<Arc<dyn Rule>> = vec![
        Arc::new(MaliciousString {
            meta: ov.meta(&MALICIOUS_STRING),
            matcher: LiteralMatcher::new(compile("strings.malicious", &cfg.malicious)?),
        }),
        Arc::new(DangerousContext {
            meta: ov.meta(&DANGEROUS_CONTEXT),
            modules: cfg.dangerous_modules.clone(),
            functions: cfg.dangerous_functions.clone(),
        }),
        Arc::new(ObfuscatedString { meta: ov.meta(&OBFUSCATED_STRING), deob }),
        Arc::new(SuspiciousImport {
            meta: ov.meta(&SUSPICIOUS_IMPORT),
            bad_keywords: cfg.bad_keywords.clone(),
            bad_builtins: cfg.bad_builtins.clone(),
            dangerous_modules: cfg.dangerous_modules.clone(),
        }),
        Arc::new(
            CallRule::new(ov.meta(&DANGEROUS_BUILTIN), CallMatcher::names(cfg.dangerous_builtins.iter().cloned()))
                .with_guard(bare_callee),
        ),
    ];
    Ok(rules)
}

#[cfg(test)]
use crate::node::{Alias, build::*};

#[cfg(test)]
fn context_rule() -> DangerousContext {
    let cfg = StringsConfig::default();
    DangerousContext { meta: DANGEROUS_CONTEXT, modules: cfg.dangerous_modules, functions: cfg.dangerous_functions }
}

#[test]
fn literal_argument_of_a_dangerous_callee() {
    let rule = context_rule();
    let arg = string("/etc/passwd");

    let open = call(name("open"), vec![arg.clone()]);
    let chain = [&open];
    let found = rule.check(&arg, &AncestorContext::new(&chain));
    assert_eq!(found[0].message, "passes a string literal to dangerous function open()");

    let rm = call(
        at(1, NodeData::Attribute { value: Box::new(name("shutil")), attr: "rmtree".into() }),
        vec![arg.clone()],
    );
    let chain = [&rm];
    let found = rule.check(&arg, &AncestorContext::new(&chain));
    assert!(found[0].message.contains("dangerous module shutil"));

    let safe = call(name("len"), vec![arg.clone()]);
    let chain = [&safe];
    assert!(rule.check(&arg, &AncestorContext::new(&chain)).is_empty());
}

#[test]
fn imports_are_classified_by_their_root() {
    let cfg = StringsConfig::default();
    let rule = SuspiciousImport {
        meta: SUSPICIOUS_IMPORT,
        bad_keywords: cfg.bad_keywords,
        bad_builtins: cfg.bad_builtins,
        dangerous_modules: cfg.dangerous_modules,
    };
    let imp = at(
        1,
        NodeData::Import {
            names: vec![
                Alias { name: "os.path".into(), asname: None },
                Alias { name: "json".into(), asname: None },
                Alias { name: "compile".into(), asname: Some("c".into()) },
            ],
        },
    );
    let msgs: Vec<_> = rule.check(&imp, &AncestorContext::empty()).into_iter().map(|f| f.message).collect();
    assert_eq!(
        msgs,
        vec!["imports 'os.path' (dangerous module)", "imports 'compile' (built-in function name)"]
    );
}

#[test]
fn method_named_like_a_builtin_is_not_the_builtin() {
    let rule = CallRule::new(DANGEROUS_BUILTIN, CallMatcher::names(["eval"])).with_guard(bare_callee);
    let cx = AncestorContext::empty();
    assert_eq!(rule.check(&call(name("eval"), vec![string("1")]), &cx).len(), 1);
    let method = call(at(1, NodeData::Attribute { value: Box::new(name("model")), attr: "eval".into() }), vec![]);
    assert!(rule.check(&method, &cx).is_empty());
}
