//! Error handling and logging hygiene.

use crate::errors::AuditResult;
use crate::matchers::call::{call_path, receiver_name, str_arg};
use crate::matchers::{CallMatcher, LiteralMatcher};
use crate::node::{KindSet, Node, NodeData, NodeKind};
use crate::patterns::common::{CallRule, strings};
use crate::patterns::{Overrides, RuleMeta, Severity, compile};
use crate::registry::{Finding, Rule};
use crate::traverse::AncestorContext;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const BROAD_HANDLER: RuleMeta = RuleMeta {
    id: "broad_exception_handler",
    description: "try statement whose handlers only catch everything",
    message: "uses a broad exception handler",
    severity: Severity::Medium,
};

pub const UNLOGGED_HANDLER: RuleMeta = RuleMeta {
    id: "unlogged_exception_handler",
    description: "Exception handlers that never log",
    message: "handles an exception without logging it",
    severity: Severity::Low,
};

pub const DEPRECATED_CALL: RuleMeta = RuleMeta {
    id: "deprecated_logging_call",
    description: "Deprecated logging module function",
    message: "uses the deprecated logging function {name}",
    severity: Severity::Low,
};

pub const WITHOUT_LEVEL: RuleMeta = RuleMeta {
    id: "logging_without_level",
    description: "Logging call whose level argument is not a known level",
    message: "logs with an unknown level '{level}'",
    severity: Severity::Low,
};

pub const PRINT_CALL: RuleMeta = RuleMeta {
    id: "print_instead_of_logging",
    description: "print() in a function that never logs",
    message: "uses print() instead of logging",
    severity: Severity::Low,
};

pub const ASSERT_USED: RuleMeta = RuleMeta {
    id: "assert_used",
    description: "assert used for error handling",
    message: "uses assert for error handling (stripped under -O)",
    severity: Severity::Low,
};

pub const TODO_UNLOGGED: RuleMeta = RuleMeta {
    id: "todo_without_logging",
    description: "Function marked TODO/FIXME that does not log",
    message: "is marked {marker} and has no logging",
    severity: Severity::Low,
};

pub const RULES: &[RuleMeta] = &[
    BROAD_HANDLER,
    UNLOGGED_HANDLER,
    DEPRECATED_CALL,
    WITHOUT_LEVEL,
    PRINT_CALL,
    ASSERT_USED,
    TODO_UNLOGGED,
];

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// A call whose dotted path matches this counts as logging. The
    /// receiver is part of the match, so `login()` is not a logging call.
    pub logger: String,
    /// Receiver the deprecated functions are looked up on.
    pub deprecated_receiver: String,
    pub deprecated: Vec<String>,
    pub levels: Vec<String>,
    /// Exception types as wide as a bare `except:`.
    pub broad_exceptions: Vec<String>,
    pub todo_marker: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            logger: r"(^|\.)(logging|logger|log|LOGGER)\.\w+$".into(),
            deprecated_receiver: "logging".into(),
            deprecated: strings(&["warn", "fatal", "captureWarnings"]),
            levels: strings(&["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"]),
            broad_exceptions: strings(&["Exception", "BaseException"]),
            todo_marker: r"\b(TODO|FIXME)\b".into(),
        }
    }
}

/// Recognises logging calls.
#[derive(Debug, Clone)]
struct LogMatcher {
    logger: Regex,
}

impl LogMatcher {
    fn is_log_call(&self, node: &Node) -> bool {
        node.kind() == NodeKind::Call && call_path(node).is_some_and(|p| self.logger.is_match(&p))
    }

    fn logs_in(&self, subtree: &Node) -> bool {
        subtree.descendants().into_iter().any(|n| self.is_log_call(n))
    }

    fn logs_in_any(&self, stmts: &[Node]) -> bool {
        stmts.iter().any(|s| self.logs_in(s))
    }
}

fn handlers(node: &Node) -> &[Node] {
    match &node.data {
        NodeData::Try { handlers, .. } => handlers,
        _ => &[],
    }
}

struct BroadHandler {
    meta: RuleMeta,
    broad: Vec<String>,
}

impl BroadHandler {
    fn is_broad(&self, handler: &Node) -> bool {
        match &handler.data {
            NodeData::ExceptHandler { type_: None, .. } => true,
            NodeData::ExceptHandler { type_: Some(t), .. } => {
                t.as_name().is_some_and(|n| self.broad.iter().any(|b| b == n))
            }
            _ => false,
        }
    }
}

impl Rule for BroadHandler {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::TRY
    }

    fn check(&self, node: &Node, _cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        let hs = handlers(node);
        if !hs.is_empty() && hs.iter().all(|h| self.is_broad(h)) {
            vec![Finding::at(node, self.meta.render(&[]))]
        } else {
            Vec::new()
        }
    }
}

struct UnloggedHandler {
    meta: RuleMeta,
    log_matcher: LogMatcher,
}

impl Rule for UnloggedHandler {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::TRY
    }

    fn check(&self, node: &Node, _cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        let hs = handlers(node);
        if hs.is_empty() || hs.iter().any(|h| self.log_matcher.logs_in_any(h.body())) {
            return Vec::new();
        }
        vec![Finding::at(node, self.meta.render(&[]))]
    }
}

struct WithoutLevel {
    meta: RuleMeta,
    log_matcher: LogMatcher,
    levels: Vec<String>,
}

impl Rule for WithoutLevel {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::CALL
    }

    fn check(&self, node: &Node, _cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        let attribute_call = matches!(&node.data, NodeData::Call { func, .. } if func.kind() == NodeKind::Attribute);
        if !attribute_call || !self.log_matcher.is_log_call(node) {
            return Vec::new();
        }
        match str_arg(node, 1) {
            Some(level) if !self.levels.iter().any(|l| l == level) => {
                vec![Finding::at(node, self.meta.render(&[("level", level)]))]
            }
            _ => Vec::new(),
        }
    }
}

struct PrintCall {
    meta: RuleMeta,
    log_matcher: LogMatcher,
}

impl Rule for PrintCall {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::CALL
    }

    fn check(&self, node: &Node, cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        let is_print = matches!(&node.data, NodeData::Call { func, .. } if func.as_name() == Some("print"));
        if !is_print {
            return Vec::new();
        }
        match cx.enclosing_function() {
            Some(func) if !self.log_matcher.logs_in(func) => vec![Finding::at(node, self.meta.render(&[]))],
            _ => Vec::new(),
        }
    }
}

struct AssertUsed {
    meta: RuleMeta,
}

impl Rule for AssertUsed {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::ASSERT
    }

    fn check(&self, node: &Node, _cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        vec![Finding::at(node, self.meta.render(&[]))]
    }
}

/// Looks at the docstring and the direct body only; nested functions get
/// their own visit.
struct TodoUnlogged {
    meta: RuleMeta,
    log_matcher: LogMatcher,
    marker: LiteralMatcher,
}

impl Rule for TodoUnlogged {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::FUNCTION_DEF
    }

    fn check(&self, node: &Node, _cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        let NodeData::FunctionDef { docstring: Some(doc), body, .. } = &node.data else {
            return Vec::new();
        };
        let Some(marker) = self.marker.find(doc) else {
            return Vec::new();
        };
        let logs = body
            .iter()
            .filter(|s| s.kind() != NodeKind::FunctionDef)
            .any(|s| self.log_matcher.logs_in(s));
        if logs {
            return Vec::new();
        }
        vec![Finding::at(node, self.meta.render(&[("marker", marker)]))]
    }
}

/// Deprecated names only count on the configured receiver
/// (`logging.warn`, not `warnings.warn`).
struct Deprecated {
    inner: CallRule,
    receiver: String,
}

impl Rule for Deprecated {
    fn meta(&self) -> &RuleMeta {
        self.inner.meta()
    }

    fn kinds(&self) -> KindSet {
        self.inner.kinds()
    }

    fn check(&self, node: &Node, cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        if receiver_name(node) != Some(self.receiver.as_str()) {
            return Vec::new();
        }
        self.inner.check(node, cx)
    }
}

pub(crate) fn rules(cfg: &LoggingConfig, ov: &Overrides<'_>) -> AuditResult<Vec<Arc<dyn Rule>>> {
    let log_matcher = LogMatcher { logger: compile("logging.logger", &cfg.logger)? };
    let marker = LiteralMatcher::new(compile("logging.todo_marker", &cfg.todo_marker)?);

    let rules: Vec<Arc<dyn Rule>> = vec![
        Arc::new(BroadHandler { meta: ov.meta(&BROAD_HANDLER), broad: cfg.broad_exceptions.clone() }),
        Arc::new(UnloggedHandler { meta: ov.meta(&UNLOGGED_HANDLER), log_matcher: log_matcher.clone() }),
        Arc::new(Deprecated {
            inner: CallRule::new(ov.meta(&DEPRECATED_CALL), CallMatcher::names(cfg.deprecated.iter().cloned())),
            receiver: cfg.deprecated_receiver.clone(),
        }),
        Arc::new(WithoutLevel {
            meta: ov.meta(&WITHOUT_LEVEL),
            log_matcher: log_matcher.clone(),
            levels: cfg.levels.clone(),
        }),
        Arc::new(PrintCall { meta: ov.meta(&PRINT_CALL), log_matcher: log_matcher.clone() }),
        Arc::new(AssertUsed { meta: ov.meta(&ASSERT_USED) }),
        Arc::new(TodoUnlogged { meta: ov.meta(&TODO_UNLOGGED), log_matcher, marker }),
    ];
    Ok(rules)
}

#[cfg(test)]
use crate::node::build::*;

#[cfg(test)]
fn attr(base: Node, attr: &str) -> Node {
    at(1, NodeData::Attribute { value: Box::new(base), attr: attr.into() })
}

#[cfg(test)]
fn stmt(value: Node) -> Node {
    at(1, NodeData::Expr { value: Box::new(value) })
}

#[cfg(test)]
fn try_with(handlers: Vec<Node>) -> Node {
    at(1, NodeData::Try { body: vec![stmt(call(name("work"), vec![]))], handlers, orelse: vec![], finalbody: vec![] })
}

#[cfg(test)]
fn handler(type_: Option<Node>, body: Vec<Node>) -> Node {
    at(1, NodeData::ExceptHandler { type_: type_.map(Box::new), name: None, body })
}

#[cfg(test)]
fn log_matcher() -> LogMatcher {
    LogMatcher { logger: Regex::new(&LoggingConfig::default().logger).unwrap() }
}

#[test]
fn broad_handler_needs_every_clause_broad() {
    let rule = BroadHandler { meta: BROAD_HANDLER, broad: LoggingConfig::default().broad_exceptions };
    let cx = AncestorContext::empty();

    let bare = try_with(vec![handler(None, vec![])]);
    assert_eq!(rule.check(&bare, &cx).len(), 1);

    let mixed = try_with(vec![handler(Some(name("ValueError")), vec![]), handler(Some(name("Exception")), vec![])]);
    assert!(rule.check(&mixed, &cx).is_empty());
}

#[test]
fn handler_logging_silences_the_unlogged_rule() {
    let rule = UnloggedHandler { meta: UNLOGGED_HANDLER, log_matcher: log_matcher() };
    let cx = AncestorContext::empty();

    let log = stmt(call(attr(name("logging"), "exception"), vec![string("boom")]));
    assert!(rule.check(&try_with(vec![handler(None, vec![log])]), &cx).is_empty());

    let pass = stmt(call(name("cleanup"), vec![]));
    assert_eq!(rule.check(&try_with(vec![handler(None, vec![pass])]), &cx).len(), 1);
}

#[test]
fn unknown_level_literal_is_reported() {
    let rule = WithoutLevel { meta: WITHOUT_LEVEL, log_matcher: log_matcher(), levels: LoggingConfig::default().levels };
    let cx = AncestorContext::empty();
    let bad = call(attr(name("logger"), "log"), vec![string("msg"), string("VERBOSE")]);
    let good = call(attr(name("logger"), "log"), vec![string("msg"), string("INFO")]);
    assert_eq!(rule.check(&bad, &cx)[0].message, "logs with an unknown level 'VERBOSE'");
    assert!(rule.check(&good, &cx).is_empty());
}

#[test]
fn deprecated_calls_only_on_the_logging_module() {
    let rule = Deprecated {
        inner: CallRule::new(DEPRECATED_CALL, CallMatcher::names(["warn"])),
        receiver: "logging".into(),
    };
    let cx = AncestorContext::empty();
    assert_eq!(rule.check(&call(attr(name("logging"), "warn"), vec![]), &cx).len(), 1);
    assert!(rule.check(&call(attr(name("warnings"), "warn"), vec![]), &cx).is_empty());
}

#[test]
fn logger_pattern_needs_a_logging_receiver() {
    let p = log_matcher();
    for path in [attr(name("logging"), "info"), attr(name("log"), "debug"), attr(attr(name("self"), "logger"), "error")] {
        assert!(p.is_log_call(&call(path, vec![])));
    }
    assert!(!p.is_log_call(&call(name("login"), vec![])));
    assert!(!p.is_log_call(&call(name("logout"), vec![])));
    assert!(!p.is_log_call(&call(attr(name("auth"), "login_user"), vec![])));
}

#[test]
fn login_with_a_string_argument_is_not_a_levelled_log() {
    let rule = WithoutLevel { meta: WITHOUT_LEVEL, log_matcher: log_matcher(), levels: LoggingConfig::default().levels };
    let cx = AncestorContext::empty();
    let login = call(name("login"), vec![name("user"), string("secret")]);
    assert!(rule.check(&login, &cx).is_empty());
}

#[test]
fn login_calls_in_a_handler_do_not_count_as_logging() {
    let rule = UnloggedHandler { meta: UNLOGGED_HANDLER, log_matcher: log_matcher() };
    let cx = AncestorContext::empty();
    for callee in ["login_user", "logout"] {
        let body = vec![stmt(call(name(callee), vec![]))];
        let tree = try_with(vec![handler(Some(name("ValueError")), body)]);
        assert_eq!(rule.check(&tree, &cx).len(), 1, "{callee}");
    }
}
