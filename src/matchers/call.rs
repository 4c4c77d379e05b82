use crate::node::{Node, NodeData};
use regex::Regex;
use std::collections::BTreeSet;

/// Effective name of a call: the trailing attribute for `a.b.c()`, the name
/// itself for `c()`. Any other callee shape yields `None`.
pub fn call_name(call: &Node) -> Option<&str> {
    match &call.data {
        NodeData::Call { func, .. } => callee_name(func),
        _ => None,
    }
}

pub fn callee_name(func: &Node) -> Option<&str> {
    match &func.data {
        NodeData::Name { id } => Some(id),
        NodeData::Attribute { attr, .. } => Some(attr),
        _ => None,
    }
}

/// `a.b.c` for a chain of plain names and attributes, `None` as soon as the
/// chain contains anything else (a call, a subscript, ...).
pub fn dotted_name(expr: &Node) -> Option<String> {
    match &expr.data {
        NodeData::Name { id } => Some(id.clone()),
        NodeData::Attribute { value, attr } => {
            dotted_name(value).map(|base| format!("{base}.{attr}"))
        }
        _ => None,
    }
}

/// Dotted path of the callee, falling back to the effective name.
pub fn call_path(call: &Node) -> Option<String> {
    match &call.data {
        NodeData::Call { func, .. } => {
            dotted_name(func).or_else(|| callee_name(func).map(str::to_owned))
        }
        _ => None,
    }
}

/// Receiver of an attribute call: `logging` for `logging.warn()`.
pub fn receiver_name(call: &Node) -> Option<&str> {
    match &call.data {
        NodeData::Call { func, .. } => match &func.data {
            NodeData::Attribute { value, .. } => value.as_name(),
            _ => None,
        },
        _ => None,
    }
}

pub fn positional(call: &Node) -> &[Node] {
    match &call.data {
        NodeData::Call { args, .. } => args,
        _ => &[],
    }
}

/// Value of keyword argument `name`, if passed.
pub fn keyword<'a>(call: &'a Node, name: &str) -> Option<&'a Node> {
    match &call.data {
        NodeData::Call { keywords, .. } => keywords
            .iter()
            .find(|k| k.name.as_deref() == Some(name))
            .map(|k| &k.value),
        _ => None,
    }
}

/// String value of the positional argument at `idx` when it is a literal.
pub fn str_arg(call: &Node, idx: usize) -> Option<&str> {
    positional(call).get(idx).and_then(Node::as_str)
}

#[derive(Debug, Clone)]
pub enum CallMatcher {
    /// Membership of the effective name.
    Names(BTreeSet<String>),
    /// Search on the dotted path (or the effective name when the callee has
    /// no dotted form).
    Pattern(Regex),
}

impl CallMatcher {
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CallMatcher::Names(names.into_iter().map(Into::into).collect())
    }

    /// The matched name, for use in messages.
    pub fn matches(&self, call: &Node) -> Option<String> {
        match self {
            CallMatcher::Names(set) => call_name(call)
                .filter(|n| set.contains(*n))
                .map(str::to_owned),
            CallMatcher::Pattern(re) => call_path(call).filter(|p| re.is_match(p)),
        }
    }
}

#[cfg(test)]
use crate::node::build::*;

#[cfg(test)]
fn attr(base: Node, attr: &str) -> Node {
    at(1, NodeData::Attribute { value: Box::new(base), attr: attr.into() })
}

#[test]
fn names_resolve_for_plain_and_attribute_callees() {
    let md5 = call(attr(name("hashlib"), "md5"), vec![]);
    assert_eq!(call_name(&md5), Some("md5"));
    assert_eq!(call_path(&md5).as_deref(), Some("hashlib.md5"));
    assert_eq!(receiver_name(&md5), Some("hashlib"));

    let bare = call(name("eval"), vec![string("1")]);
    assert_eq!(call_name(&bare), Some("eval"));
    assert_eq!(str_arg(&bare, 0), Some("1"));
}

#[test]
fn unsupported_callee_is_not_an_error() {
    // f()() : the callee is itself a call
    let odd = call(call(name("f"), vec![]), vec![]);
    assert_eq!(call_name(&odd), None);
    assert_eq!(call_path(&odd), None);
    assert_eq!(CallMatcher::names(["f"]).matches(&odd), None);
}

#[test]
fn attribute_on_a_call_keeps_the_trailing_name() {
    // get_session().get(...)
    let c = call(attr(call(name("get_session"), vec![]), "get"), vec![]);
    assert_eq!(call_path(&c).as_deref(), Some("get"));
}

#[test]
fn pattern_matches_against_the_dotted_path() {
    let m = CallMatcher::Pattern(Regex::new(r"^(hashlib\.)?(md5|sha1)$").unwrap());
    assert_eq!(m.matches(&call(attr(name("hashlib"), "sha1"), vec![])).as_deref(), Some("hashlib.sha1"));
    assert!(m.matches(&call(attr(name("hashlib"), "sha256"), vec![])).is_none());
    assert!(m.matches(&call(name("md5"), vec![])).is_some());
}
