use crate::errors::AuditResult;
use crate::matchers::LiteralMatcher;
use crate::matchers::call::{callee_name, dotted_name, str_arg};
use crate::node::{CmpOp, KindSet, Node, NodeData, NodeKind};
use crate::patterns::common::strings;
use crate::patterns::{Overrides, RuleMeta, Severity, compile};
use crate::registry::{Finding, Rule};
use crate::traverse::AncestorContext;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const UNVALIDATED_KEY: RuleMeta = RuleMeta {
    id: "unvalidated_api_key",
    description: "API key read without an enclosing equality check",
    message: "does not validate or weakly validates the {key} header",
    severity: Severity::Medium,
};

pub const UNVALIDATED_QUERY: RuleMeta = RuleMeta {
    id: "unvalidated_query_parameter",
    description: "Query parameter read without an enclosing equality check",
    message: "does not validate or weakly validates the {param} query parameter",
    severity: Severity::Medium,
};

pub const JSON_RESPONSE: RuleMeta = RuleMeta {
    id: "insecure_json_response",
    description: "JSON response built from a dict literal with no success status",
    message: "returns a JSON response from {name} without a {key}: {value} entry",
    severity: Severity::Low,
};

pub const LOGIN_REQUIRED: RuleMeta = RuleMeta {
    id: "unchecked_login_required",
    description: "View guarded by login_required that never compares the caller's identity",
    message: "relies on {name} without checking who is logged in",
    severity: Severity::Medium,
};

pub const RULES: &[RuleMeta] = &[UNVALIDATED_KEY, UNVALIDATED_QUERY, JSON_RESPONSE, LOGIN_REQUIRED];

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    pub key_pattern: String,
    /// Method that reads a header or parameter.
    pub accessor: String,
    /// Dotted receiver of query parameter reads (`request.args.get`).
    pub query_source: String,
    pub json_responders: Vec<String>,
    pub status_key: String,
    pub status_value: String,
    /// Decorators that only establish that someone is logged in.
    pub login_decorators: Vec<String>,
    /// Operand of a comparison that counts as an identity check.
    pub identity_pattern: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key_pattern: r"(?i)^(?:api|access)_?(?:key|token)$".into(),
            accessor: "get".into(),
            query_source: r"(^|\.)request\.args$".into(),
            json_responders: strings(&["jsonify", "JsonResponse"]),
            status_key: "status".into(),
            status_value: "success".into(),
            login_decorators: strings(&["login_required"]),
            identity_pattern: r"(^|\.)(current_user|username|user)$".into(),
        }
    }
}

/// `if <expr> == "literal":` (either side may be the literal).
fn is_literal_equality(test: &Node) -> bool {
    match &test.data {
        NodeData::Compare { left, ops, comparators } => {
            ops.first() == Some(&CmpOp::Eq)
                && (left.as_str().is_some() || comparators.first().is_some_and(|c| c.as_str().is_some()))
        }
        _ => false,
    }
}

/// True when an enclosing `if` compares against a literal and `node` sits in
/// its test or body. The `else` branch is not covered by the comparison.
fn is_guarded(node: &Node, cx: &AncestorContext<'_, '_>) -> bool {
    let mut child = node;
    for a in cx.iter() {
        if let NodeData::If { test, body, .. } = &a.data {
            let on_true_side = std::ptr::eq(&**test, child) || body.iter().any(|s| std::ptr::eq(s, child));
            if on_true_side && is_literal_equality(test) {
                return true;
            }
        }
        child = a;
    }
    false
}

/// Receiver of `<receiver>.<accessor>(...)`, if the call has that shape.
fn accessor_receiver<'n>(node: &'n Node, accessor: &str) -> Option<&'n Node> {
    let NodeData::Call { func, .. } = &node.data else {
        return None;
    };
    match &func.data {
        NodeData::Attribute { value, attr } if attr == accessor => Some(value),
        _ => None,
    }
}

struct UnvalidatedKey {
    meta: RuleMeta,
    keys: LiteralMatcher,
    accessor: String,
}

impl Rule for UnvalidatedKey {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::CALL
    }

    fn check(&self, node: &Node, cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        if accessor_receiver(node, &self.accessor).is_none() {
            return Vec::new();
        }
        let Some(key) = str_arg(node, 0).filter(|k| self.keys.matches(k)) else {
            return Vec::new();
        };

        if is_guarded(node, cx) {
            return Vec::new();
        }
        vec![Finding::at(node, self.meta.render(&[("key", key)]))]
    }
}

struct UnvalidatedQuery {
    meta: RuleMeta,
    accessor: String,
    source: Regex,
}

impl Rule for UnvalidatedQuery {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::CALL
    }

    fn check(&self, node: &Node, cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        let from_query = accessor_receiver(node, &self.accessor)
            .and_then(dotted_name)
            .is_some_and(|path| self.source.is_match(&path));
        if !from_query || is_guarded(node, cx) {
            return Vec::new();
        }
        let param = str_arg(node, 0).unwrap_or("?");
        vec![Finding::at(node, self.meta.render(&[("param", param)]))]
    }
}

struct JsonResponse {
    meta: RuleMeta,
    responders: Vec<String>,
    status_key: String,
    status_value: String,
}

impl JsonResponse {
    fn has_status(&self, keys: &[Option<Node>], values: &[Node]) -> bool {
        keys.iter().zip(values).any(|(k, v)| {
            k.as_ref().and_then(Node::as_str) == Some(self.status_key.as_str())
                && v.as_str() == Some(self.status_value.as_str())
        })
    }
}

impl Rule for JsonResponse {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::CALL
    }

    fn check(&self, node: &Node, _cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        let NodeData::Call { func, args, .. } = &node.data else {
            return Vec::new();
        };
        let Some(name) = callee_name(func).filter(|n| self.responders.iter().any(|r| r == n)) else {
            return Vec::new();
        };
        match args.first().map(|a| &a.data) {
            Some(NodeData::Dict { keys, values }) if !self.has_status(keys, values) => {
                let vars = [("name", name), ("key", self.status_key.as_str()), ("value", self.status_value.as_str())];
                vec![Finding::at(node, self.meta.render(&vars))]
            }
            _ => Vec::new(),
        }
    }
}

/// Only the function's own statements are searched; nested definitions are
/// checked on their own visit.
struct LoginRequired {
    meta: RuleMeta,
    decorators: Vec<String>,
    identity: Regex,
}

impl LoginRequired {
    fn decorator_name<'n>(&self, decorator: &'n Node) -> Option<&'n str> {
        let target = match &decorator.data {
            NodeData::Call { func, .. } => func,
            _ => decorator,
        };
        callee_name(target).filter(|n| self.decorators.iter().any(|d| d == n))
    }

    fn is_identity_check(&self, node: &Node) -> bool {
        let NodeData::Compare { left, comparators, .. } = &node.data else {
            return false;
        };
        std::iter::once(&**left)
            .chain(comparators)
            .filter_map(dotted_name)
            .any(|path| self.identity.is_match(&path))
    }

    fn checks_identity(&self, body: &[Node]) -> bool {
        body.iter()
            .filter(|s| s.kind() != NodeKind::FunctionDef)
            .flat_map(Node::descendants)
            .any(|n| self.is_identity_check(n))
    }
}

impl Rule for LoginRequired {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::FUNCTION_DEF
    }

    fn check(&self, node: &Node, _cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        let NodeData::FunctionDef { decorators, body, .. } = &node.data else {
            return Vec::new();
        };
        let Some(name) = decorators.iter().find_map(|d| self.decorator_name(d)) else {
            return Vec::new();
        };
        if self.checks_identity(body) {
            return Vec::new();
        }
        vec![Finding::at(node, self.meta.render(&[("name", name)]))]
    }
}

pub(crate) fn rules(cfg: &ApiConfig, ov: &Overrides<'_>) -> AuditResult<Vec<Arc<dyn Rule>>> {
    let rules: Vec<Arc<dyn Rule>> = vec![
        Arc::new(UnvalidatedKey {
            meta: ov.meta(&UNVALIDATED_KEY),
            keys: LiteralMatcher::new(compile("api.key_pattern", &cfg.key_pattern)?),
            accessor: cfg.accessor.clone(),
        }),
        Arc::new(UnvalidatedQuery {
            meta: ov.meta(&UNVALIDATED_QUERY),
            accessor: cfg.accessor.clone(),
            source: compile("api.query_source", &cfg.query_source)?,
        }),
        Arc::new(JsonResponse {
            meta: ov.meta(&JSON_RESPONSE),
            responders: cfg.json_responders.clone(),
            status_key: cfg.status_key.clone(),
            status_value: cfg.status_value.clone(),
        }),
        Arc::new(LoginRequired {
            meta: ov.meta(&LOGIN_REQUIRED),
            decorators: cfg.login_decorators.clone(),
            identity: compile("api.identity_pattern", &cfg.identity_pattern)?,
        }),
    ];
    Ok(rules)
}

#[cfg(test)]
use crate::node::build::*;

#[cfg(test)]
fn headers_get(key: &str) -> Node {
    let func = at(1, NodeData::Attribute { value: Box::new(name("headers")), attr: "get".into() });
    call(func, vec![string(key)])
}

#[cfg(test)]
fn rule() -> UnvalidatedKey {
    let cfg = ApiConfig::default();
    UnvalidatedKey {
        meta: UNVALIDATED_KEY,
        keys: LiteralMatcher::new(regex::Regex::new(&cfg.key_pattern).unwrap()),
        accessor: cfg.accessor,
    }
}

#[test]
fn bare_key_read_is_reported() {
    let c = headers_get("API_KEY");
    let found = rule().check(&c, &AncestorContext::empty());
    assert_eq!(found[0].message, "does not validate or weakly validates the API_KEY header");
    assert!(rule().check(&headers_get("user_agent"), &AncestorContext::empty()).is_empty());
}

#[cfg(test)]
fn role_check(body: Vec<Node>, orelse: Vec<Node>) -> Node {
    let test = at(
        1,
        NodeData::Compare { left: Box::new(name("role")), ops: vec![CmpOp::Eq], comparators: vec![string("ADMIN")] },
    );
    at(1, NodeData::If { test: Box::new(test), body, orelse })
}

#[cfg(test)]
fn stmt(value: Node) -> Node {
    at(2, NodeData::Expr { value: Box::new(value) })
}

#[test]
fn equality_guard_in_an_ancestor_silences_it() {
    let guard = role_check(vec![stmt(headers_get("api_key"))], vec![]);
    let NodeData::If { body, .. } = &guard.data else { unreachable!() };
    let NodeData::Expr { value } = &body[0].data else { unreachable!() };
    let chain = [&guard, &body[0]];
    assert!(rule().check(value, &AncestorContext::new(&chain)).is_empty());
}

#[test]
fn key_read_in_the_else_branch_is_not_guarded() {
    let guard = role_check(vec![], vec![stmt(headers_get("api_key"))]);
    let NodeData::If { orelse, .. } = &guard.data else { unreachable!() };
    let NodeData::Expr { value } = &orelse[0].data else { unreachable!() };
    let chain = [&guard, &orelse[0]];
    assert_eq!(rule().check(value, &AncestorContext::new(&chain)).len(), 1);
}

#[cfg(test)]
fn attr(base: Node, attr: &str) -> Node {
    at(1, NodeData::Attribute { value: Box::new(base), attr: attr.into() })
}

#[test]
fn query_parameter_read_needs_a_guard() {
    let rule = UnvalidatedQuery {
        meta: UNVALIDATED_QUERY,
        accessor: "get".into(),
        source: Regex::new(&ApiConfig::default().query_source).unwrap(),
    };
    let read = call(attr(attr(name("request"), "args"), "get"), vec![string("page")]);
    let found = rule.check(&read, &AncestorContext::empty());
    assert_eq!(found[0].message, "does not validate or weakly validates the page query parameter");

    let header = call(attr(attr(name("request"), "headers"), "get"), vec![string("page")]);
    assert!(rule.check(&header, &AncestorContext::empty()).is_empty());
}

#[test]
fn json_response_without_success_status_is_reported() {
    let rule = JsonResponse {
        meta: JSON_RESPONSE,
        responders: ApiConfig::default().json_responders,
        status_key: "status".into(),
        status_value: "success".into(),
    };
    let cx = AncestorContext::empty();
    let dict = |k: &str, v: &str| at(1, NodeData::Dict { keys: vec![Some(string(k))], values: vec![string(v)] });

    let bare = call(name("jsonify"), vec![dict("data", "x")]);
    assert_eq!(rule.check(&bare, &cx)[0].message, "returns a JSON response from jsonify without a status: success entry");

    let ok = call(attr(name("http"), "JsonResponse"), vec![dict("status", "success")]);
    assert!(rule.check(&ok, &cx).is_empty());

    let not_a_literal = call(name("jsonify"), vec![name("payload")]);
    assert!(rule.check(&not_a_literal, &cx).is_empty());
}

#[cfg(test)]
fn view(decorators: Vec<Node>, body: Vec<Node>) -> Node {
    at(1, NodeData::FunctionDef { name: "admin".into(), params: vec![], decorators, body, docstring: None })
}

#[test]
fn login_required_alone_is_reported_until_the_user_is_compared() {
    let defaults = ApiConfig::default();
    let rule = LoginRequired {
        meta: LOGIN_REQUIRED,
        decorators: defaults.login_decorators,
        identity: Regex::new(&defaults.identity_pattern).unwrap(),
    };
    let cx = AncestorContext::empty();

    let bare = view(vec![attr(name("auth"), "login_required")], vec![stmt(call(name("render"), vec![]))]);
    assert_eq!(rule.check(&bare, &cx)[0].message, "relies on login_required without checking who is logged in");

    let test = at(
        2,
        NodeData::Compare {
            left: Box::new(attr(name("current_user"), "username")),
            ops: vec![CmpOp::NotEq],
            comparators: vec![string("ADMIN")],
        },
    );
    let checked = view(
        vec![name("login_required")],
        vec![at(2, NodeData::If { test: Box::new(test), body: vec![], orelse: vec![] })],
    );
    assert!(rule.check(&checked, &cx).is_empty());

    let undecorated = view(vec![], vec![]);
    assert!(rule.check(&undecorated, &cx).is_empty());
}
