//! Numeric and structural validation of loops and conditions.

use crate::matchers::call::{callee_name, keyword};
use crate::node::{BoolOperator, CmpOp, Node, NodeData, UnaryOperator};

/// Bounds of a `range(...)` call. Omitted bounds take their defaults
/// (start 0, step 1) as literal nodes would.
#[derive(Debug, Clone, Copy)]
pub struct RangeArgs<'a> {
    pub start: Bound<'a>,
    pub stop: Bound<'a>,
    pub step: Bound<'a>,
}

#[derive(Debug, Clone, Copy)]
pub enum Bound<'a> {
    Default(i64),
    Missing,
    Expr(&'a Node),
}

impl Bound<'_> {
    pub fn literal(&self) -> Option<i64> {
        match self {
            Bound::Default(v) => Some(*v),
            Bound::Missing => None,
            Bound::Expr(n) => n.as_int(),
        }
    }

    /// For messages: the literal value, or `?` when it is not one.
    pub fn describe(&self) -> String {
        self.literal().map_or_else(|| "?".to_owned(), |v| v.to_string())
    }
}

/// `Some` when `iter` is a call to the bare name `range`.
pub fn range_args(iter: &Node) -> Option<RangeArgs<'_>> {
    let NodeData::Call { func, args, .. } = &iter.data else {
        return None;
    };
    if func.as_name() != Some("range") {
        return None;
    }

    let kw = |name: &str, default: Bound<'static>| match keyword(iter, name) {
        Some(v) => Bound::Expr(v),
        None => default,
    };

    Some(match args.as_slice() {
        [stop] => RangeArgs { start: Bound::Default(0), stop: Bound::Expr(stop), step: Bound::Default(1) },
        [start, stop] => RangeArgs { start: Bound::Expr(start), stop: Bound::Expr(stop), step: Bound::Default(1) },
        [start, stop, step, ..] => RangeArgs {
            start: Bound::Expr(start),
            stop: Bound::Expr(stop),
            step: Bound::Expr(step),
        },
        [] => RangeArgs {
            start: kw("start", Bound::Default(0)),
            stop: kw("stop", Bound::Missing),
            step: kw("step", Bound::Default(1)),
        },
    })
}

/// A range loop is valid when its target is a simple name and every bound
/// is a literal integer.
pub fn is_valid_for_range(target: &Node, range: &RangeArgs<'_>) -> bool {
    target.as_name().is_some()
        && range.start.literal().is_some()
        && range.stop.literal().is_some()
        && range.step.literal().is_some()
}

/// A condition is valid only when it is
/// - a single `<=`/`>=` between two literal integers,
/// - an `and` whose operands are all valid, or
/// - `not` applied to a valid condition.
///
/// Everything else, including `or`, is invalid.
pub fn is_invalid_condition(cond: &Node) -> bool {
    match &cond.data {
        NodeData::Compare { left, ops, comparators } => match (ops.as_slice(), comparators.as_slice()) {
            ([CmpOp::LtE | CmpOp::GtE], [right]) => left.as_int().is_none() || right.as_int().is_none(),
            _ => true,
        },
        NodeData::BoolOp { op: BoolOperator::And, values } => values.iter().any(is_invalid_condition),
        NodeData::UnaryOp { op: UnaryOperator::Not, operand } => is_invalid_condition(operand),
        _ => true,
    }
}

/// Name of the loop target for messages (`_` when it is not a name).
pub fn target_label(target: &Node) -> &str {
    target.as_name().or_else(|| callee_name(target)).unwrap_or("_")
}

#[cfg(test)]
use crate::node::{Keyword, build::*};

#[cfg(test)]
fn cmp(left: Node, op: CmpOp, right: Node) -> Node {
    at(1, NodeData::Compare { left: Box::new(left), ops: vec![op], comparators: vec![right] })
}

#[cfg(test)]
fn and(values: Vec<Node>) -> Node {
    at(1, NodeData::BoolOp { op: BoolOperator::And, values })
}

#[test]
fn literal_range_is_valid() {
    let r = call(name("range"), vec![int(0), int(10), int(1)]);
    let args = range_args(&r).unwrap();
    assert!(is_valid_for_range(&name("i"), &args));

    let one = call(name("range"), vec![int(10)]);
    assert!(is_valid_for_range(&name("i"), &range_args(&one).unwrap()));
}

#[test]
fn non_literal_bound_is_invalid() {
    let r = call(name("range"), vec![name("x"), int(10)]);
    let args = range_args(&r).unwrap();
    assert!(!is_valid_for_range(&name("i"), &args));
    assert_eq!(args.start.describe(), "?");
}

#[test]
fn keyword_only_range_without_stop_is_invalid() {
    let r = at(
        1,
        NodeData::Call {
            func: Box::new(name("range")),
            args: vec![],
            keywords: vec![Keyword { name: Some("start".into()), value: int(2) }],
        },
    );
    let args = range_args(&r).unwrap();
    assert_eq!(args.start.literal(), Some(2));
    assert!(!is_valid_for_range(&name("i"), &args));
}

#[test]
fn non_range_iterables_are_not_ranges() {
    assert!(range_args(&call(name("enumerate"), vec![name("xs")])).is_none());
    assert!(range_args(&name("xs")).is_none());
}

#[test]
fn condition_validity_follows_boolean_structure() {
    let good = cmp(int(1), CmpOp::LtE, int(5));
    let bad = cmp(name("x"), CmpOp::Lt, int(5));

    assert!(!is_invalid_condition(&good));
    assert!(is_invalid_condition(&bad));
    assert!(is_invalid_condition(&cmp(int(1), CmpOp::Lt, int(5))));

    assert!(!is_invalid_condition(&and(vec![good.clone(), good.clone()])));
    assert!(is_invalid_condition(&and(vec![good.clone(), bad.clone()])));

    let not_good = at(1, NodeData::UnaryOp { op: UnaryOperator::Not, operand: Box::new(good) });
    assert!(!is_invalid_condition(&not_good));
    assert!(is_invalid_condition(&name("flag")));
}
