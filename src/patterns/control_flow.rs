//! Loop ranges and branch conditions the structural validator rejects.

use crate::errors::AuditResult;
use crate::matchers::structural::{is_invalid_condition, is_valid_for_range, range_args, target_label};
use crate::node::{KindSet, Node, NodeData};
use crate::patterns::{Overrides, RuleMeta, Severity};
use crate::registry::{Finding, Rule};
use crate::traverse::AncestorContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const INVALID_RANGE: RuleMeta = RuleMeta {
    id: "invalid_range_loop",
    description: "for loop over a range() that is not a literal integer range",
    message: "'{target}' cannot be used as loop variable in range({start}, {stop}, {step})",
    severity: Severity::Low,
};

pub const INVALID_WHILE: RuleMeta = RuleMeta {
    id: "invalid_loop_condition",
    description: "while condition outside the accepted literal comparisons",
    message: "has an invalid while condition",
    severity: Severity::Low,
};

pub const INVALID_IF: RuleMeta = RuleMeta {
    id: "invalid_branch_condition",
    description: "if/elif condition outside the accepted literal comparisons",
    message: "has an invalid if condition",
    severity: Severity::Low,
};

pub const NON_RANGE: RuleMeta = RuleMeta {
    id: "non_range_iterable",
    description: "for loop over anything but range() (opt-in)",
    message: "iterates over something other than range()",
    severity: Severity::Low,
};

pub const RULES: &[RuleMeta] = &[INVALID_RANGE, INVALID_WHILE, INVALID_IF, NON_RANGE];

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ControlFlowConfig {
    /// Installs `non_range_iterable`.
    pub flag_non_range_iterables: bool,
}

struct RangeLoop {
    meta: RuleMeta,
}

impl Rule for RangeLoop {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::FOR
    }

    fn check(&self, node: &Node, _cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        let NodeData::For { target, iter, .. } = &node.data else {
            return Vec::new();
        };
        let Some(range) = range_args(iter) else {
            return Vec::new();
        };
        if is_valid_for_range(target, &range) {
            return Vec::new();
        }
        let msg = self.meta.render(&[
            ("target", target_label(target)),
            ("start", range.start.describe().as_str()),
            ("stop", range.stop.describe().as_str()),
            ("step", range.step.describe().as_str()),
        ]);
        vec![Finding::at(node, msg)]
    }
}

struct NonRange {
    meta: RuleMeta,
}

impl Rule for NonRange {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::FOR
    }

    fn check(&self, node: &Node, _cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        match &node.data {
            NodeData::For { iter, .. } if range_args(iter).is_none() => {
                vec![Finding::at(node, self.meta.render(&[]))]
            }
            _ => Vec::new(),
        }
    }
}

/// `while` and `if` share the validator; `elif` arrives as a nested `If`.
struct Condition {
    meta: RuleMeta,
    kind: KindSet,
}

impl Rule for Condition {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        self.kind
    }

    fn check(&self, node: &Node, _cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        let test = match &node.data {
            NodeData::While { test, .. } | NodeData::If { test, .. } => test,
            _ => return Vec::new(),
        };
        if is_invalid_condition(test) {
            vec![Finding::at(node, self.meta.render(&[]))]
        } else {
            Vec::new()
        }
    }
}

pub(crate) fn rules(cfg: &ControlFlowConfig, ov: &Overrides<'_>) -> AuditResult<Vec<Arc<dyn Rule>>> {
    let mut rules: Vec<Arc<dyn Rule>> = vec![
        Arc::new(RangeLoop { meta: ov.meta(&INVALID_RANGE) }),
        Arc::new(Condition { meta: ov.meta(&INVALID_WHILE), kind: KindSet::WHILE }),
        Arc::new(Condition { meta: ov.meta(&INVALID_IF), kind: KindSet::IF }),
    ];
    if cfg.flag_non_range_iterables {
        rules.push(Arc::new(NonRange { meta: ov.meta(&NON_RANGE) }));
    }
    Ok(rules)
}

#[cfg(test)]
use crate::node::build::*;

#[cfg(test)]
fn for_loop(target: Node, iter: Node) -> Node {
    at(3, NodeData::For { target: Box::new(target), iter: Box::new(iter), body: vec![], orelse: vec![] })
}

#[test]
fn range_loop_message_names_the_bounds() {
    let rule = RangeLoop { meta: INVALID_RANGE };
    let cx = AncestorContext::empty();

    let ok = for_loop(name("i"), call(name("range"), vec![int(0), int(10), int(1)]));
    assert!(rule.check(&ok, &cx).is_empty());

    let bad = for_loop(name("i"), call(name("range"), vec![name("x"), int(10)]));
    let found = rule.check(&bad, &cx);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].message, "'i' cannot be used as loop variable in range(?, 10, 1)");
    assert_eq!(found[0].loc.line, 3);
}

#[test]
fn non_range_rule_is_opt_in() {
    let cfg = ControlFlowConfig::default();
    let sev = Default::default();
    let ov = Overrides { severity: &sev };
    assert_eq!(rules(&cfg, &ov).unwrap().len(), 3);

    let cfg = ControlFlowConfig { flag_non_range_iterables: true };
    let all = rules(&cfg, &ov).unwrap();
    assert_eq!(all.len(), 4);

    let over_list = for_loop(name("x"), name("items"));
    assert_eq!(all[3].check(&over_list, &AncestorContext::empty()).len(), 1);
}
