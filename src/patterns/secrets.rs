use crate::errors::AuditResult;
use crate::lower::INTERPOLATED;
use crate::matchers::LiteralMatcher;
use crate::node::{BinOperator, KindSet, Node, NodeData};
use crate::patterns::common::strings;
use crate::patterns::{Overrides, RuleMeta, Severity, compile};
use crate::registry::{Finding, Rule};
use crate::traverse::AncestorContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const HARDCODED_SECRET: RuleMeta = RuleMeta {
    id: "hardcoded_secret",
    description: "Credential literal in a function body",
    message: "has a hardcoded {what}",
    severity: Severity::High,
};

pub const RULES: &[RuleMeta] = &[HARDCODED_SECRET];

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct SecretsConfig {
    /// Variable names that must never be bound to a literal.
    pub names: Vec<String>,
    /// Searched in bare string statements and bytes literals.
    pub pattern: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            names: strings(&["username", "password", "secret_key", "api_key"]),
            pattern: "password|secret_key|api_key".into(),
        }
    }
}

struct HardcodedSecret {
    meta: RuleMeta,
    names: Vec<String>,
    pattern: LiteralMatcher,
}

impl HardcodedSecret {
    fn secret_target<'n>(&self, targets: &'n [Node]) -> Option<&'n str> {
        targets
            .iter()
            .filter_map(Node::as_name)
            .find(|t| self.names.iter().any(|n| n.as_str() == *t))
    }

    /// What a single statement leaks, if anything.
    fn inspect(&self, stmt: &Node, docstring: bool) -> Option<String> {
        match &stmt.data {
            NodeData::Assign { targets, value } => {
                let target = self.secret_target(targets)?;
                match &value.data {
                    NodeData::Str { .. } => Some(target.to_owned()),
                    NodeData::BinOp { left, op: BinOperator::Add, right }
                        if left.as_str().is_some() && right.as_str().is_some() =>
                    {
                        Some(format!("{target} (using string concatenation)"))
                    }
                    // children[0] holds the literal text around the holes
                    NodeData::Other { label, children }
                        if label == INTERPOLATED && children.first().and_then(Node::as_str).is_some_and(|t| !t.is_empty()) =>
                    {
                        Some(format!("{target} (using an f-string)"))
                    }
                    _ => None,
                }
            }
            NodeData::AnnAssign { annotation, value: Some(value), .. }
                if annotation.as_name() == Some("bytes") =>
            {
                match &value.data {
                    NodeData::Str { value, bytes: true } if self.pattern.matches(value) => {
                        Some("secret (using bytes annotation)".to_owned())
                    }
                    _ => None,
                }
            }
            NodeData::Expr { value } if !docstring => value
                .as_str()
                .filter(|s| self.pattern.matches(s))
                .map(|_| "password or API key".to_owned()),
            _ => None,
        }
    }
}

impl Rule for HardcodedSecret {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::FUNCTION_DEF
    }

    /// Direct statements only; nested definitions are visited on their own.
    fn check(&self, node: &Node, _cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        let NodeData::FunctionDef { body, docstring, .. } = &node.data else {
            return Vec::new();
        };
        body.iter()
            .enumerate()
            .filter_map(|(i, stmt)| {
                let is_doc = i == 0 && docstring.is_some();
                self.inspect(stmt, is_doc)
                    .map(|what| Finding::at(stmt, self.meta.render(&[("what", what.as_str())])))
            })
            .collect()
    }
}

pub(crate) fn rules(cfg: &SecretsConfig, ov: &Overrides<'_>) -> AuditResult<Vec<Arc<dyn Rule>>> {
    let rule: Arc<dyn Rule> = Arc::new(HardcodedSecret {
        meta: ov.meta(&HARDCODED_SECRET),
        names: cfg.names.clone(),
        pattern: LiteralMatcher::new(compile("secrets.pattern", &cfg.pattern)?),
    });
    Ok(vec![rule])
}

#[cfg(test)]
use crate::node::build::*;

#[cfg(test)]
fn func(body: Vec<Node>, docstring: Option<&str>) -> Node {
    at(
        1,
        NodeData::FunctionDef {
            name: "login".into(),
            params: vec![],
            decorators: vec![],
            body,
            docstring: docstring.map(str::to_owned),
        },
    )
}

#[cfg(test)]
fn assign(target: &str, value: Node) -> Node {
    at(2, NodeData::Assign { targets: vec![name(target)], value: Box::new(value) })
}

#[cfg(test)]
fn rule() -> HardcodedSecret {
    let cfg = SecretsConfig::default();
    HardcodedSecret {
        meta: HARDCODED_SECRET,
        names: cfg.names,
        pattern: LiteralMatcher::new(regex::Regex::new(&cfg.pattern).unwrap()),
    }
}

#[test]
fn literal_and_concatenated_secrets() {
    let concat = at(
        2,
        NodeData::BinOp {
            left: Box::new(string("hun")),
            op: BinOperator::Add,
            right: Box::new(string("ter2")),
        },
    );
    let f = func(
        vec![assign("password", string("abc123")), assign("api_key", concat), assign("greeting", string("hi"))],
        None,
    );
    let found = rule().check(&f, &AncestorContext::empty());
    let msgs: Vec<_> = found.iter().map(|f| f.message.as_str()).collect();
    assert_eq!(
        msgs,
        vec!["has a hardcoded password", "has a hardcoded api_key (using string concatenation)"]
    );
}

#[test]
fn non_literal_values_are_fine() {
    let f = func(vec![assign("password", call(name("input"), vec![]))], None);
    assert!(rule().check(&f, &AncestorContext::empty()).is_empty());
}

#[test]
fn docstring_is_not_a_bare_string_statement() {
    let doc = at(2, NodeData::Expr { value: Box::new(string("Checks the password.")) });
    let stray = at(3, NodeData::Expr { value: Box::new(string("password=letmein")) });
    let f = func(vec![doc, stray], Some("Checks the password."));
    let found = rule().check(&f, &AncestorContext::empty());
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].loc.line, 3);
}

#[test]
fn bytes_annotation_is_checked_against_the_pattern() {
    let ann = at(
        2,
        NodeData::AnnAssign {
            target: Box::new(name("blob")),
            annotation: Box::new(name("bytes")),
            value: Some(Box::new(at(2, NodeData::Str { value: "secret_key=42".into(), bytes: true }))),
        },
    );
    let found = rule().check(&func(vec![ann], None), &AncestorContext::empty());
    assert_eq!(found[0].message, "has a hardcoded secret (using bytes annotation)");
}

#[test]
fn f_string_with_literal_text_is_a_secret() {
    let fstring = |text: &str| {
        at(2, NodeData::Other { label: INTERPOLATED.into(), children: vec![string(text), name("prefix")] })
    };
    let f = func(vec![assign("password", fstring("abc")), assign("username", fstring(""))], None);
    let found = rule().check(&f, &AncestorContext::empty());
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].message, "has a hardcoded password (using an f-string)");
}
