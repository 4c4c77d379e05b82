//! Rule trait, the kind → rules index, and the dispatch loop.

use crate::errors::{AuditError, AuditResult};
use crate::node::{KindSet, Location, Node, NodeKind};
use crate::patterns::RuleMeta;
use crate::report::{Diagnostic, Reporter};
use crate::traverse::{AncestorContext, Walker};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// What a rule reports; the registry adds id, severity and function name.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub loc: Location,
    pub message: String,
}

impl Finding {
    pub fn at(node: &Node, message: impl Into<String>) -> Self {
        Self { loc: node.loc, message: message.into() }
    }
}

pub trait Rule: Send + Sync {
    fn meta(&self) -> &RuleMeta;

    /// Node kinds this rule wants to see.
    fn kinds(&self) -> KindSet;

    /// Empty means no finding.
    fn check(&self, node: &Node, cx: &AncestorContext<'_, '_>) -> Vec<Finding>;
}

/// Immutable once built; clone it freely across scans.
#[derive(Clone)]
pub struct RuleRegistry {
    rules: Vec<Arc<dyn Rule>>,
    by_kind: HashMap<NodeKind, Vec<usize>>,
}

impl RuleRegistry {
    pub fn new(rules: Vec<Arc<dyn Rule>>) -> AuditResult<Self> {
        let mut ids = HashSet::new();
        for r in &rules {
            if !ids.insert(r.meta().id) {
                return Err(AuditError::config(format!("duplicate rule id `{}`", r.meta().id)));
            }
        }

        let mut by_kind: HashMap<NodeKind, Vec<usize>> = HashMap::new();
        for kind in NodeKind::ALL {
            let idx: Vec<usize> = rules
                .iter()
                .enumerate()
                .filter(|(_, r)| r.kinds().contains(kind.bit()))
                .map(|(i, _)| i)
                .collect();
            if !idx.is_empty() {
                by_kind.insert(kind, idx);
            }
        }

        tracing::debug!("rule registry initialised ({} rules)", rules.len());
        Ok(Self { rules, by_kind })
    }

    pub fn rules(&self) -> &[Arc<dyn Rule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules subscribed to `kind`, in registration order.
    pub fn rules_for(&self, kind: NodeKind) -> impl Iterator<Item = &dyn Rule> {
        self.by_kind
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .map(|&i| self.rules[i].as_ref())
    }

    /// Walk `root` once and collect every rule's findings in traversal order.
    pub fn scan(&self, root: &Node) -> AuditResult<Vec<Diagnostic>> {
        if root.kind() != NodeKind::Module {
            return Err(AuditError::Input(format!(
                "expected a module at the root, found {:?}",
                root.kind()
            )));
        }

        let mut reporter = Reporter::new();
        let mut walker = Walker::new(root);
        while let Some(visit) = walker.next() {
            for rule in self.rules_for(visit.node.kind()) {
                for finding in rule.check(visit.node, &visit.ancestors) {
                    let meta = rule.meta();
                    reporter.record(Diagnostic {
                        rule_id: meta.id,
                        severity: meta.severity,
                        message: finding.message,
                        loc: finding.loc,
                        function: visit
                            .ancestors
                            .function_name_for(visit.node)
                            .map(str::to_owned),
                    });
                }
            }
        }
        Ok(reporter.into_results())
    }
}

#[cfg(test)]
use crate::node::{NodeData, build::*};
#[cfg(test)]
use crate::patterns::Severity;

#[cfg(test)]
struct NameRule {
    meta: RuleMeta,
    target: &'static str,
}

#[cfg(test)]
impl Rule for NameRule {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }
    fn kinds(&self) -> KindSet {
        KindSet::NAME
    }
    fn check(&self, node: &Node, _cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        match node.as_name() {
            Some(n) if n == self.target => vec![Finding::at(node, format!("saw {n}"))],
            _ => vec![],
        }
    }
}

#[cfg(test)]
fn name_rule(id: &'static str, target: &'static str) -> Arc<dyn Rule> {
    Arc::new(NameRule {
        meta: RuleMeta { id, description: "", message: "", severity: Severity::Low },
        target,
    })
}

#[test]
fn dispatch_only_reaches_subscribed_kinds() {
    let reg = RuleRegistry::new(vec![name_rule("a", "x")]).unwrap();
    assert_eq!(reg.rules_for(NodeKind::Name).count(), 1);
    assert_eq!(reg.rules_for(NodeKind::Call).count(), 0);

    let tree = module(vec![at(1, NodeData::Expr { value: Box::new(call(name("x"), vec![name("x")])) })]);
    let diags = reg.scan(&tree).unwrap();
    assert_eq!(diags.len(), 2);
}

#[test]
fn adding_a_rule_leaves_existing_findings_alone() {
    let tree = module(vec![at(
        1,
        NodeData::Expr { value: Box::new(call(name("x"), vec![name("y")])) },
    )]);

    let alone = RuleRegistry::new(vec![name_rule("a", "x")]).unwrap().scan(&tree).unwrap();
    let both = RuleRegistry::new(vec![name_rule("a", "x"), name_rule("b", "y")])
        .unwrap()
        .scan(&tree)
        .unwrap();

    let a_only: Vec<_> = both.iter().filter(|d| d.rule_id == "a").cloned().collect();
    assert_eq!(alone, a_only);
    assert_eq!(both.len(), 2);
}

#[test]
fn duplicate_ids_are_a_config_error() {
    let err = RuleRegistry::new(vec![name_rule("a", "x"), name_rule("a", "y")]).err();
    assert!(matches!(err, Some(AuditError::Config(_))));
}

#[test]
fn non_module_root_is_rejected_before_walking() {
    let reg = RuleRegistry::new(vec![name_rule("a", "x")]).unwrap();
    assert!(matches!(reg.scan(&name("x")), Err(AuditError::Input(_))));
}
