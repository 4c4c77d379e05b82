//! The tagged-variant tree every rule looks at.
//!
//! A [`Node`] is pure data: a location plus kind-specific fields. Children are
//! derived from those fields in source order by [`Node::children`], so the
//! model never stores a parent pointer.

use bitflags::bitflags;
use std::fmt;

/// 1-based source position.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub line: usize,
    pub col: usize,
}

impl Location {
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    Module,
    FunctionDef,
    Call,
    Assign,
    AnnAssign,
    For,
    While,
    If,
    Import,
    ImportFrom,
    Str,
    Num,
    Constant,
    Name,
    Attribute,
    BinOp,
    Compare,
    BoolOp,
    UnaryOp,
    Dict,
    Return,
    Try,
    ExceptHandler,
    Assert,
    Expr,
    Other,
}

bitflags! {
    /// Set of node kinds a rule subscribes to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KindSet: u32 {
        const MODULE         = 1 << 0;
        const FUNCTION_DEF   = 1 << 1;
        const CALL           = 1 << 2;
        const ASSIGN         = 1 << 3;
        const ANN_ASSIGN     = 1 << 4;
        const FOR            = 1 << 5;
        const WHILE          = 1 << 6;
        const IF             = 1 << 7;
        const IMPORT         = 1 << 8;
        const IMPORT_FROM    = 1 << 9;
        const STR            = 1 << 10;
        const NUM            = 1 << 11;
        const CONSTANT       = 1 << 12;
        const NAME           = 1 << 13;
        const ATTRIBUTE      = 1 << 14;
        const BIN_OP         = 1 << 15;
        const COMPARE        = 1 << 16;
        const BOOL_OP        = 1 << 17;
        const UNARY_OP       = 1 << 18;
        const DICT           = 1 << 19;
        const RETURN         = 1 << 20;
        const TRY            = 1 << 21;
        const EXCEPT_HANDLER = 1 << 22;
        const ASSERT         = 1 << 23;
        const EXPR           = 1 << 24;
        const OTHER          = 1 << 25;
    }
}

impl NodeKind {
    pub const ALL: [NodeKind; 26] = [
        NodeKind::Module,
        NodeKind::FunctionDef,
        NodeKind::Call,
        NodeKind::Assign,
        NodeKind::AnnAssign,
        NodeKind::For,
        NodeKind::While,
        NodeKind::If,
        NodeKind::Import,
        NodeKind::ImportFrom,
        NodeKind::Str,
        NodeKind::Num,
        NodeKind::Constant,
        NodeKind::Name,
        NodeKind::Attribute,
        NodeKind::BinOp,
        NodeKind::Compare,
        NodeKind::BoolOp,
        NodeKind::UnaryOp,
        NodeKind::Dict,
        NodeKind::Return,
        NodeKind::Try,
        NodeKind::ExceptHandler,
        NodeKind::Assert,
        NodeKind::Expr,
        NodeKind::Other,
    ];

    pub fn bit(self) -> KindSet {
        match self {
            NodeKind::Module => KindSet::MODULE,
            NodeKind::FunctionDef => KindSet::FUNCTION_DEF,
            NodeKind::Call => KindSet::CALL,
            NodeKind::Assign => KindSet::ASSIGN,
            NodeKind::AnnAssign => KindSet::ANN_ASSIGN,
            NodeKind::For => KindSet::FOR,
            NodeKind::While => KindSet::WHILE,
            NodeKind::If => KindSet::IF,
            NodeKind::Import => KindSet::IMPORT,
            NodeKind::ImportFrom => KindSet::IMPORT_FROM,
            NodeKind::Str => KindSet::STR,
            NodeKind::Num => KindSet::NUM,
            NodeKind::Constant => KindSet::CONSTANT,
            NodeKind::Name => KindSet::NAME,
            NodeKind::Attribute => KindSet::ATTRIBUTE,
            NodeKind::BinOp => KindSet::BIN_OP,
            NodeKind::Compare => KindSet::COMPARE,
            NodeKind::BoolOp => KindSet::BOOL_OP,
            NodeKind::UnaryOp => KindSet::UNARY_OP,
            NodeKind::Dict => KindSet::DICT,
            NodeKind::Return => KindSet::RETURN,
            NodeKind::Try => KindSet::TRY,
            NodeKind::ExceptHandler => KindSet::EXCEPT_HANDLER,
            NodeKind::Assert => KindSet::ASSERT,
            NodeKind::Expr => KindSet::EXPR,
            NodeKind::Other => KindSet::OTHER,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BinOperator {
    Add,
    Sub,
    Mult,
    MatMult,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BoolOperator {
    And,
    Or,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Neg,
    Pos,
    Invert,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Constant {
    Bool(bool),
    None,
}

/// `import a.b as c` → `Alias { name: "a.b", asname: Some("c") }`.
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub name: String,
    pub asname: Option<String>,
}

/// `name=value`; `name` is `None` for a `**mapping` splat.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub name: Option<String>,
    pub value: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Module {
        body: Vec<Node>,
    },
    FunctionDef {
        name: String,
        params: Vec<String>,
        decorators: Vec<Node>,
        body: Vec<Node>,
        docstring: Option<String>,
    },
    Call {
        func: Box<Node>,
        args: Vec<Node>,
        keywords: Vec<Keyword>,
    },
    Assign {
        targets: Vec<Node>,
        value: Box<Node>,
    },
    AnnAssign {
        target: Box<Node>,
        annotation: Box<Node>,
        value: Option<Box<Node>>,
    },
    For {
        target: Box<Node>,
        iter: Box<Node>,
        body: Vec<Node>,
        orelse: Vec<Node>,
    },
    While {
        test: Box<Node>,
        body: Vec<Node>,
        orelse: Vec<Node>,
    },
    If {
        test: Box<Node>,
        body: Vec<Node>,
        orelse: Vec<Node>,
    },
    Import {
        names: Vec<Alias>,
    },
    ImportFrom {
        module: Option<String>,
        names: Vec<Alias>,
    },
    Str {
        value: String,
        bytes: bool,
    },
    Num(Number),
    Constant(Constant),
    Name {
        id: String,
    },
    Attribute {
        value: Box<Node>,
        attr: String,
    },
    BinOp {
        left: Box<Node>,
        op: BinOperator,
        right: Box<Node>,
    },
    Compare {
        left: Box<Node>,
        ops: Vec<CmpOp>,
        comparators: Vec<Node>,
    },
    BoolOp {
        op: BoolOperator,
        values: Vec<Node>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Node>,
    },
    Dict {
        keys: Vec<Option<Node>>,
        values: Vec<Node>,
    },
    Return {
        value: Option<Box<Node>>,
    },
    Try {
        body: Vec<Node>,
        handlers: Vec<Node>,
        orelse: Vec<Node>,
        finalbody: Vec<Node>,
    },
    ExceptHandler {
        type_: Option<Box<Node>>,
        name: Option<String>,
        body: Vec<Node>,
    },
    Assert {
        test: Box<Node>,
        msg: Option<Box<Node>>,
    },
    Expr {
        value: Box<Node>,
    },
    /// Syntax the model has no dedicated kind for. `label` is the parser's
    /// own node name; children are kept so the walk still reaches them.
    Other {
        label: String,
        children: Vec<Node>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub loc: Location,
    pub data: NodeData,
}

impl Node {
    pub fn new(loc: Location, data: NodeData) -> Self {
        Self { loc, data }
    }

    pub fn kind(&self) -> NodeKind {
        match &self.data {
            NodeData::Module { .. } => NodeKind::Module,
            NodeData::FunctionDef { .. } => NodeKind::FunctionDef,
            NodeData::Call { .. } => NodeKind::Call,
            NodeData::Assign { .. } => NodeKind::Assign,
            NodeData::AnnAssign { .. } => NodeKind::AnnAssign,
            NodeData::For { .. } => NodeKind::For,
            NodeData::While { .. } => NodeKind::While,
            NodeData::If { .. } => NodeKind::If,
            NodeData::Import { .. } => NodeKind::Import,
            NodeData::ImportFrom { .. } => NodeKind::ImportFrom,
            NodeData::Str { .. } => NodeKind::Str,
            NodeData::Num(_) => NodeKind::Num,
            NodeData::Constant(_) => NodeKind::Constant,
            NodeData::Name { .. } => NodeKind::Name,
            NodeData::Attribute { .. } => NodeKind::Attribute,
            NodeData::BinOp { .. } => NodeKind::BinOp,
            NodeData::Compare { .. } => NodeKind::Compare,
            NodeData::BoolOp { .. } => NodeKind::BoolOp,
            NodeData::UnaryOp { .. } => NodeKind::UnaryOp,
            NodeData::Dict { .. } => NodeKind::Dict,
            NodeData::Return { .. } => NodeKind::Return,
            NodeData::Try { .. } => NodeKind::Try,
            NodeData::ExceptHandler { .. } => NodeKind::ExceptHandler,
            NodeData::Assert { .. } => NodeKind::Assert,
            NodeData::Expr { .. } => NodeKind::Expr,
            NodeData::Other { .. } => NodeKind::Other,
        }
    }

    /// Direct children in source order.
    pub fn children(&self) -> Vec<&Node> {
        let mut out: Vec<&Node> = Vec::new();
        match &self.data {
            NodeData::Module { body } => out.extend(body),
            NodeData::FunctionDef { decorators, body, .. } => {
                out.extend(decorators);
                out.extend(body);
            }
            NodeData::Call { func, args, keywords } => {
                out.push(func);
                out.extend(args);
                out.extend(keywords.iter().map(|k| &k.value));
            }
            NodeData::Assign { targets, value } => {
                out.extend(targets);
                out.push(value);
            }
            NodeData::AnnAssign { target, annotation, value } => {
                out.push(target);
                out.push(annotation);
                out.extend(value.as_deref());
            }
            NodeData::For { target, iter, body, orelse } => {
                out.push(target);
                out.push(iter);
                out.extend(body);
                out.extend(orelse);
            }
            NodeData::While { test, body, orelse } | NodeData::If { test, body, orelse } => {
                out.push(test);
                out.extend(body);
                out.extend(orelse);
            }
            NodeData::Import { .. }
            | NodeData::ImportFrom { .. }
            | NodeData::Str { .. }
            | NodeData::Num(_)
            | NodeData::Constant(_)
            | NodeData::Name { .. } => {}
            NodeData::Attribute { value, .. } => out.push(value),
            NodeData::BinOp { left, right, .. } => {
                out.push(left);
                out.push(right);
            }
            NodeData::Compare { left, comparators, .. } => {
                out.push(left);
                out.extend(comparators);
            }
            NodeData::BoolOp { values, .. } => out.extend(values),
            NodeData::UnaryOp { operand, .. } => out.push(operand),
            NodeData::Dict { keys, values } => {
                for (k, v) in keys.iter().zip(values) {
                    out.extend(k.as_ref());
                    out.push(v);
                }
            }
            NodeData::Return { value } => out.extend(value.as_deref()),
            NodeData::Try { body, handlers, orelse, finalbody } => {
                out.extend(body);
                out.extend(handlers);
                out.extend(orelse);
                out.extend(finalbody);
            }
            NodeData::ExceptHandler { type_, body, .. } => {
                out.extend(type_.as_deref());
                out.extend(body);
            }
            NodeData::Assert { test, msg } => {
                out.push(test);
                out.extend(msg.as_deref());
            }
            NodeData::Expr { value } => out.push(value),
            NodeData::Other { children, .. } => out.extend(children),
        }
        out
    }

    /// Every node in this subtree, `self` included, pre-order.
    pub fn descendants(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(n.children().into_iter().rev());
        }
        out
    }

    /// Statement body for kinds that own one.
    pub fn body(&self) -> &[Node] {
        match &self.data {
            NodeData::Module { body }
            | NodeData::FunctionDef { body, .. }
            | NodeData::For { body, .. }
            | NodeData::While { body, .. }
            | NodeData::If { body, .. }
            | NodeData::Try { body, .. }
            | NodeData::ExceptHandler { body, .. } => body,
            _ => &[],
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            NodeData::Str { value, bytes: false } => Some(value),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match &self.data {
            NodeData::Name { id } => Some(id),
            _ => None,
        }
    }

    pub fn function_name(&self) -> Option<&str> {
        match &self.data {
            NodeData::FunctionDef { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Integer value of a literal, looking through a unary sign.
    pub fn as_int(&self) -> Option<i64> {
        match &self.data {
            NodeData::Num(Number::Int(v)) => Some(*v),
            NodeData::UnaryOp { op: UnaryOperator::Neg, operand } => {
                operand.as_int().and_then(i64::checked_neg)
            }
            NodeData::UnaryOp { op: UnaryOperator::Pos, operand } => operand.as_int(),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod build {
    //! Terse constructors for hand-built trees in tests.
    use super::*;

    pub fn at(line: usize, data: NodeData) -> Node {
        Node::new(Location::new(line, 1), data)
    }

    pub fn name(id: &str) -> Node {
        at(1, NodeData::Name { id: id.into() })
    }

    pub fn int(v: i64) -> Node {
        at(1, NodeData::Num(Number::Int(v)))
    }

    pub fn string(v: &str) -> Node {
        at(1, NodeData::Str { value: v.into(), bytes: false })
    }

    pub fn call(func: Node, args: Vec<Node>) -> Node {
        at(1, NodeData::Call { func: Box::new(func), args, keywords: vec![] })
    }

    pub fn module(body: Vec<Node>) -> Node {
        at(1, NodeData::Module { body })
    }
}

#[test]
fn children_follow_source_order() {
    use build::*;
    let call = call(name("f"), vec![int(1), string("x")]);
    let kinds: Vec<_> = call.children().iter().map(|n| n.kind()).collect();
    assert_eq!(kinds, vec![NodeKind::Name, NodeKind::Num, NodeKind::Str]);
}

#[test]
fn every_kind_maps_to_a_distinct_bit() {
    let mut seen = KindSet::empty();
    for k in NodeKind::ALL {
        assert!(!seen.intersects(k.bit()), "{k:?} shares a bit");
        seen |= k.bit();
    }
    assert_eq!(seen, KindSet::all());
}

#[test]
fn as_int_sees_through_negation() {
    use build::*;
    let neg = at(1, NodeData::UnaryOp { op: UnaryOperator::Neg, operand: Box::new(int(3)) });
    assert_eq!(neg.as_int(), Some(-3));
    assert_eq!(name("x").as_int(), None);
}
