//! tree-sitter-python CST → [`Node`] model.
//!
//! The CST keeps every token; the model keeps only what rules look at.
//! Syntax without a dedicated kind becomes [`NodeData::Other`] with its
//! lowered children, so nothing below it disappears from the walk.

use crate::errors::{AuditError, AuditResult};
use crate::node::{
    Alias, BinOperator, BoolOperator, CmpOp, Constant, Keyword, Location, Node, NodeData, Number,
    UnaryOperator,
};
use tree_sitter::{Node as TsNode, Tree};

/// Label of an f-string with holes. The first child is the literal text,
/// the rest are the interpolated expressions.
pub const INTERPOLATED: &str = "interpolated_string";

/// Lower a parsed tree. A tree containing `ERROR` or `MISSING` nodes is
/// rejected with the position of the first one.
pub fn lower(tree: &Tree, src: &str) -> AuditResult<Node> {
    let root = tree.root_node();
    if root.has_error() {
        let bad = first_error(root).unwrap_or(root);
        let loc = loc(bad);
        return Err(AuditError::Parse { line: loc.line, col: loc.col });
    }
    let lw = Lowerer { src };
    Ok(Node::new(loc(root), NodeData::Module { body: lw.block(root) }))
}

fn first_error(n: TsNode<'_>) -> Option<TsNode<'_>> {
    if n.is_error() || n.is_missing() {
        return Some(n);
    }
    let mut cursor = n.walk();
    let children: Vec<_> = n.children(&mut cursor).collect();
    children.into_iter().filter(|c| c.has_error()).find_map(first_error)
}

fn loc(n: TsNode<'_>) -> Location {
    let p = n.start_position();
    Location::new(p.row + 1, p.column + 1)
}

fn named(n: TsNode<'_>) -> Vec<TsNode<'_>> {
    let mut cursor = n.walk();
    n.named_children(&mut cursor).filter(|c| c.kind() != "comment").collect()
}

fn all(n: TsNode<'_>) -> Vec<TsNode<'_>> {
    let mut cursor = n.walk();
    n.children(&mut cursor).collect()
}

fn is_statement(kind: &str) -> bool {
    kind.ends_with("_statement")
        || matches!(kind, "function_definition" | "class_definition" | "decorated_definition")
}

struct Lowerer<'s> {
    src: &'s str,
}

impl Lowerer<'_> {
    fn text(&self, n: TsNode<'_>) -> &str {
        self.src.get(n.byte_range()).unwrap_or_default()
    }

    fn field_text(&self, n: TsNode<'_>, field: &str) -> String {
        n.child_by_field_name(field)
            .map(|c| self.text(c).to_owned())
            .unwrap_or_default()
    }

    fn other(&self, n: TsNode<'_>) -> Node {
        let children = named(n).into_iter().flat_map(|c| self.any(c)).collect();
        Node::new(loc(n), NodeData::Other { label: n.kind().to_owned(), children })
    }

    /// Lower whatever `n` is; blocks flatten into their statements.
    fn any(&self, n: TsNode<'_>) -> Vec<Node> {
        match n.kind() {
            "comment" => Vec::new(),
            "block" | "module" => self.block(n),
            k if is_statement(k) => vec![self.stmt(n)],
            _ => vec![self.expr(n)],
        }
    }

    fn block(&self, n: TsNode<'_>) -> Vec<Node> {
        named(n).into_iter().flat_map(|c| self.any(c)).collect()
    }

    fn field_block(&self, n: TsNode<'_>, field: &str) -> Vec<Node> {
        n.child_by_field_name(field).map(|b| self.block(b)).unwrap_or_default()
    }

    /// Body of an `else:`/`finally:` clause.
    fn clause_body(&self, n: TsNode<'_>) -> Vec<Node> {
        match n.child_by_field_name("body") {
            Some(b) => self.block(b),
            None => named(n)
                .into_iter()
                .filter(|c| c.kind() == "block")
                .flat_map(|b| self.block(b))
                .collect(),
        }
    }

    fn boxed(&self, n: Option<TsNode<'_>>, parent: TsNode<'_>) -> Box<Node> {
        Box::new(match n {
            Some(n) => self.expr(n),
            None => Node::new(loc(parent), NodeData::Other { label: "missing".into(), children: vec![] }),
        })
    }

    // ---------------------------------------------------------------- statements

    fn stmt(&self, n: TsNode<'_>) -> Node {
        let at = loc(n);
        let data = match n.kind() {
            "function_definition" => return self.function(n, Vec::new()),
            "decorated_definition" => return self.decorated(n),
            "expression_statement" => return self.expression_statement(n),
            "return_statement" => NodeData::Return {
                value: named(n).first().map(|v| Box::new(self.expr(*v))),
            },
            "if_statement" => self.if_chain(n),
            "for_statement" => NodeData::For {
                target: self.boxed(n.child_by_field_name("left"), n),
                iter: self.boxed(n.child_by_field_name("right"), n),
                body: self.field_block(n, "body"),
                orelse: n
                    .child_by_field_name("alternative")
                    .map(|e| self.clause_body(e))
                    .unwrap_or_default(),
            },
            "while_statement" => NodeData::While {
                test: self.boxed(n.child_by_field_name("condition"), n),
                body: self.field_block(n, "body"),
                orelse: n
                    .child_by_field_name("alternative")
                    .map(|e| self.clause_body(e))
                    .unwrap_or_default(),
            },
            "try_statement" => self.try_stmt(n),
            "assert_statement" => {
                let parts = named(n);
                NodeData::Assert {
                    test: self.boxed(parts.first().copied(), n),
                    msg: parts.get(1).map(|m| Box::new(self.expr(*m))),
                }
            }
            "import_statement" => NodeData::Import { names: self.aliases(n) },
            "import_from_statement" => NodeData::ImportFrom {
                module: n.child_by_field_name("module_name").map(|m| self.text(m).to_owned()),
                names: self.aliases(n),
            },
            "future_import_statement" => NodeData::ImportFrom {
                module: Some("__future__".into()),
                names: self.aliases(n),
            },
            _ => return self.other(n),
        };
        Node::new(at, data)
    }

    fn function(&self, n: TsNode<'_>, decorators: Vec<Node>) -> Node {
        let params = n
            .child_by_field_name("parameters")
            .map(|p| named(p).into_iter().filter_map(|p| self.param_name(p)).collect())
            .unwrap_or_default();
        let body = self.field_block(n, "body");
        let docstring = body.first().and_then(|s| match &s.data {
            NodeData::Expr { value } => value.as_str().map(str::to_owned),
            _ => None,
        });
        Node::new(
            loc(n),
            NodeData::FunctionDef { name: self.field_text(n, "name"), params, decorators, body, docstring },
        )
    }

    fn param_name(&self, p: TsNode<'_>) -> Option<String> {
        match p.kind() {
            "identifier" => Some(self.text(p).to_owned()),
            "keyword_separator" | "positional_separator" => None,
            _ => p
                .child_by_field_name("name")
                .or_else(|| named(p).into_iter().find(|c| c.kind() == "identifier"))
                .map(|c| self.text(c).to_owned()),
        }
    }

    fn decorated(&self, n: TsNode<'_>) -> Node {
        let decorators: Vec<Node> = named(n)
            .into_iter()
            .filter(|c| c.kind() == "decorator")
            .filter_map(|d| named(d).first().map(|e| self.expr(*e)))
            .collect();
        match n.child_by_field_name("definition") {
            Some(def) if def.kind() == "function_definition" => self.function(def, decorators),
            Some(def) => {
                let mut children = decorators;
                children.extend(self.any(def));
                Node::new(loc(n), NodeData::Other { label: n.kind().to_owned(), children })
            }
            None => self.other(n),
        }
    }

    fn expression_statement(&self, n: TsNode<'_>) -> Node {
        let parts = named(n);
        match parts.as_slice() {
            [one] if one.kind() == "assignment" => self.assignment(*one),
            [one] => Node::new(loc(n), NodeData::Expr { value: Box::new(self.expr(*one)) }),
            _ => {
                let tuple = Node::new(
                    loc(n),
                    NodeData::Other {
                        label: "expression_list".into(),
                        children: parts.into_iter().map(|p| self.expr(p)).collect(),
                    },
                );
                Node::new(loc(n), NodeData::Expr { value: Box::new(tuple) })
            }
        }
    }

    /// `a = b = 1` keeps both targets; `x: T = v` becomes an annotated
    /// assignment.
    fn assignment(&self, n: TsNode<'_>) -> Node {
        let at = loc(n);
        let left = n.child_by_field_name("left");
        if let Some(ty) = n.child_by_field_name("type") {
            return Node::new(
                at,
                NodeData::AnnAssign {
                    target: self.boxed(left, n),
                    annotation: Box::new(self.expr(ty)),
                    value: n.child_by_field_name("right").map(|v| Box::new(self.expr(v))),
                },
            );
        }

        let mut targets = vec![*self.boxed(left, n)];
        let mut value = n.child_by_field_name("right");
        while let Some(v) = value.filter(|v| v.kind() == "assignment" && v.child_by_field_name("type").is_none()) {
            targets.push(*self.boxed(v.child_by_field_name("left"), v));
            value = v.child_by_field_name("right");
        }
        Node::new(at, NodeData::Assign { targets, value: self.boxed(value, n) })
    }

    /// `elif` arms nest as `If` nodes in the `orelse` of the previous arm.
    fn if_chain(&self, n: TsNode<'_>) -> NodeData {
        let mut cursor = n.walk();
        let alternatives: Vec<_> = n.children_by_field_name("alternative", &mut cursor).collect();

        let mut orelse = Vec::new();
        for alt in alternatives.into_iter().rev() {
            match alt.kind() {
                "else_clause" => orelse = self.clause_body(alt),
                "elif_clause" => {
                    let data = NodeData::If {
                        test: self.boxed(alt.child_by_field_name("condition"), alt),
                        body: self.field_block(alt, "consequence"),
                        orelse: std::mem::take(&mut orelse),
                    };
                    orelse = vec![Node::new(loc(alt), data)];
                }
                _ => {}
            }
        }
        NodeData::If {
            test: self.boxed(n.child_by_field_name("condition"), n),
            body: self.field_block(n, "consequence"),
            orelse,
        }
    }

    fn try_stmt(&self, n: TsNode<'_>) -> NodeData {
        let mut handlers = Vec::new();
        let mut orelse = Vec::new();
        let mut finalbody = Vec::new();
        for c in named(n) {
            match c.kind() {
                "except_clause" | "except_group_clause" => handlers.push(self.handler(c)),
                "else_clause" => orelse = self.clause_body(c),
                "finally_clause" => finalbody = self.clause_body(c),
                _ => {}
            }
        }
        NodeData::Try { body: self.field_block(n, "body"), handlers, orelse, finalbody }
    }

    fn handler(&self, n: TsNode<'_>) -> Node {
        let parts: Vec<_> = named(n).into_iter().filter(|c| c.kind() != "block").collect();
        let (type_, name) = match parts.as_slice() {
            [] => (None, None),
            [p, ..] if p.kind() == "as_pattern" => {
                let target = p
                    .child_by_field_name("alias")
                    .or_else(|| named(*p).into_iter().find(|c| c.kind() == "as_pattern_target"));
                (named(*p).first().map(|t| self.expr(*t)), target.map(|t| self.text(t).to_owned()))
            }
            [t] => (Some(self.expr(*t)), None),
            [t, alias, ..] => (Some(self.expr(*t)), Some(self.text(*alias).to_owned())),
        };
        Node::new(
            loc(n),
            NodeData::ExceptHandler { type_: type_.map(Box::new), name, body: self.clause_body(n) },
        )
    }

    fn aliases(&self, n: TsNode<'_>) -> Vec<Alias> {
        let mut cursor = n.walk();
        let names: Vec<_> = n.children_by_field_name("name", &mut cursor).collect();
        let mut out: Vec<Alias> = names
            .into_iter()
            .map(|c| match c.kind() {
                "aliased_import" => Alias {
                    name: self.field_text(c, "name"),
                    asname: c.child_by_field_name("alias").map(|a| self.text(a).to_owned()),
                },
                _ => Alias { name: self.text(c).to_owned(), asname: None },
            })
            .collect();
        if named(n).iter().any(|c| c.kind() == "wildcard_import") {
            out.push(Alias { name: "*".into(), asname: None });
        }
        out
    }

    // --------------------------------------------------------------- expressions

    fn expr(&self, n: TsNode<'_>) -> Node {
        let at = loc(n);
        let data = match n.kind() {
            "identifier" => NodeData::Name { id: self.text(n).to_owned() },
            "attribute" => NodeData::Attribute {
                value: self.boxed(n.child_by_field_name("object"), n),
                attr: self.field_text(n, "attribute"),
            },
            "call" => self.call(n),
            "string" => return self.string(n),
            "concatenated_string" => return self.concatenated(n),
            "integer" => match parse_int(self.text(n)) {
                Some(v) => NodeData::Num(Number::Int(v)),
                None => match parse_float(self.text(n)) {
                    Some(v) => NodeData::Num(Number::Float(v)),
                    None => return self.other(n),
                },
            },
            "float" => match parse_float(self.text(n)) {
                Some(v) => NodeData::Num(Number::Float(v)),
                None => return self.other(n),
            },
            "true" => NodeData::Constant(Constant::Bool(true)),
            "false" => NodeData::Constant(Constant::Bool(false)),
            "none" => NodeData::Constant(Constant::None),
            "binary_operator" => {
                let op = n.child_by_field_name("operator").and_then(|o| bin_op(o.kind()));
                match op {
                    Some(op) => NodeData::BinOp {
                        left: self.boxed(n.child_by_field_name("left"), n),
                        op,
                        right: self.boxed(n.child_by_field_name("right"), n),
                    },
                    None => return self.other(n),
                }
            }
            "comparison_operator" => self.compare(n),
            "boolean_operator" => {
                let op = match n.child_by_field_name("operator").map(|o| o.kind()) {
                    Some("and") => BoolOperator::And,
                    Some("or") => BoolOperator::Or,
                    _ => return self.other(n),
                };
                let mut values = Vec::new();
                self.flatten_bool(n, op, &mut values);
                NodeData::BoolOp { op, values }
            }
            "not_operator" => NodeData::UnaryOp {
                op: UnaryOperator::Not,
                operand: self.boxed(n.child_by_field_name("argument"), n),
            },
            "unary_operator" => {
                let op = match n.child_by_field_name("operator").map(|o| o.kind()) {
                    Some("-") => UnaryOperator::Neg,
                    Some("+") => UnaryOperator::Pos,
                    Some("~") => UnaryOperator::Invert,
                    _ => return self.other(n),
                };
                NodeData::UnaryOp { op, operand: self.boxed(n.child_by_field_name("argument"), n) }
            }
            "dictionary" => self.dict(n),
            "parenthesized_expression" | "type" => match named(n).first() {
                Some(inner) => return self.expr(*inner),
                None => return self.other(n),
            },
            _ => return self.other(n),
        };
        Node::new(at, data)
    }

    fn call(&self, n: TsNode<'_>) -> NodeData {
        let func = self.boxed(n.child_by_field_name("function"), n);
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        match n.child_by_field_name("arguments") {
            Some(list) if list.kind() == "argument_list" => {
                for a in named(list) {
                    match a.kind() {
                        "keyword_argument" => keywords.push(Keyword {
                            name: Some(self.field_text(a, "name")),
                            value: *self.boxed(a.child_by_field_name("value"), a),
                        }),
                        "dictionary_splat" => keywords.push(Keyword {
                            name: None,
                            value: *self.boxed(named(a).first().copied(), a),
                        }),
                        _ => args.push(self.expr(a)),
                    }
                }
            }
            Some(generator) => args.push(self.expr(generator)),
            None => {}
        }
        NodeData::Call { func, args, keywords }
    }

    fn compare(&self, n: TsNode<'_>) -> NodeData {
        let mut operands = Vec::new();
        let mut ops = Vec::new();
        let mut pending: Option<&str> = None;
        for c in all(n) {
            if c.is_named() {
                if c.kind() != "comment" {
                    operands.push(self.expr(c));
                }
                continue;
            }
            let tok = c.kind();
            let op = match (pending.take(), tok) {
                (Some("not"), "in") => Some(CmpOp::NotIn),
                (Some("is"), "not") => Some(CmpOp::IsNot),
                (Some("is"), _) => {
                    ops.push(CmpOp::Is);
                    cmp_op(tok)
                }
                (_, "not" | "is") => {
                    pending = Some(tok);
                    None
                }
                (_, t) => cmp_op(t),
            };
            ops.extend(op);
        }
        if pending == Some("is") {
            ops.push(CmpOp::Is);
        }

        let mut operands = operands.into_iter();
        let left = match operands.next() {
            Some(l) => Box::new(l),
            None => self.boxed(None, n),
        };
        NodeData::Compare { left, ops, comparators: operands.collect() }
    }

    fn flatten_bool(&self, n: TsNode<'_>, op: BoolOperator, out: &mut Vec<Node>) {
        for side in ["left", "right"] {
            let Some(c) = n.child_by_field_name(side) else {
                continue;
            };
            let same = c.kind() == "boolean_operator"
                && c.child_by_field_name("operator").map(|o| o.kind())
                    == Some(if op == BoolOperator::And { "and" } else { "or" });
            if same {
                self.flatten_bool(c, op, out);
            } else {
                out.push(self.expr(c));
            }
        }
    }

    fn dict(&self, n: TsNode<'_>) -> NodeData {
        let mut keys = Vec::new();
        let mut values = Vec::new();
        for c in named(n) {
            match c.kind() {
                "pair" => {
                    keys.push(Some(*self.boxed(c.child_by_field_name("key"), c)));
                    values.push(*self.boxed(c.child_by_field_name("value"), c));
                }
                "dictionary_splat" => {
                    keys.push(None);
                    values.push(*self.boxed(named(c).first().copied(), c));
                }
                _ => {}
            }
        }
        NodeData::Dict { keys, values }
    }

    // ------------------------------------------------------------------ strings

    fn string(&self, n: TsNode<'_>) -> Node {
        let mut prefix = String::new();
        let mut body = String::new();
        let mut holes = Vec::new();
        for c in all(n) {
            match c.kind() {
                "string_start" => {
                    prefix = self.text(c).trim_end_matches(['"', '\'']).to_ascii_lowercase();
                }
                "string_content" | "escape_sequence" => body.push_str(self.text(c)),
                "interpolation" => {
                    if let Some(e) = c.child_by_field_name("expression").or_else(|| named(c).first().copied()) {
                        holes.push(self.expr(e));
                    }
                }
                _ => {}
            }
        }

        let formatted = prefix.contains('f');
        let mut value = if prefix.contains('r') { body } else { unescape(&body) };
        if formatted {
            value = value.replace("{{", "{").replace("}}", "}");
        }
        let literal = Node::new(loc(n), NodeData::Str { value, bytes: prefix.contains('b') });
        if holes.is_empty() {
            return literal;
        }
        let mut children = vec![literal];
        children.extend(holes);
        Node::new(loc(n), NodeData::Other { label: INTERPOLATED.into(), children })
    }

    /// `"a" "b"` is one literal unless a part interpolates.
    fn concatenated(&self, n: TsNode<'_>) -> Node {
        let parts: Vec<Node> = named(n).into_iter().map(|p| self.string(p)).collect();
        let mut value = String::new();
        let mut bytes = false;
        for p in &parts {
            match &p.data {
                NodeData::Str { value: v, bytes: b } => {
                    value.push_str(v);
                    bytes |= *b;
                }
                _ => {
                    return Node::new(
                        loc(n),
                        NodeData::Other { label: n.kind().to_owned(), children: parts },
                    );
                }
            }
        }
        Node::new(loc(n), NodeData::Str { value, bytes })
    }
}

fn bin_op(tok: &str) -> Option<BinOperator> {
    Some(match tok {
        "+" => BinOperator::Add,
        "-" => BinOperator::Sub,
        "*" => BinOperator::Mult,
        "@" => BinOperator::MatMult,
        "/" => BinOperator::Div,
        "//" => BinOperator::FloorDiv,
        "%" => BinOperator::Mod,
        "**" => BinOperator::Pow,
        "<<" => BinOperator::LShift,
        ">>" => BinOperator::RShift,
        "|" => BinOperator::BitOr,
        "^" => BinOperator::BitXor,
        "&" => BinOperator::BitAnd,
        _ => return None,
    })
}

fn cmp_op(tok: &str) -> Option<CmpOp> {
    Some(match tok {
        "==" => CmpOp::Eq,
        "!=" | "<>" => CmpOp::NotEq,
        "<" => CmpOp::Lt,
        "<=" => CmpOp::LtE,
        ">" => CmpOp::Gt,
        ">=" => CmpOp::GtE,
        "in" => CmpOp::In,
        "not in" => CmpOp::NotIn,
        "is" => CmpOp::Is,
        "is not" => CmpOp::IsNot,
        _ => return None,
    })
}

/// Decimal, `0x`, `0o` and `0b` literals with `_` separators.
fn parse_int(text: &str) -> Option<i64> {
    let t = text.replace('_', "").to_ascii_lowercase();
    let (digits, radix) = match t.get(..2) {
        Some("0x") => (&t[2..], 16),
        Some("0o") => (&t[2..], 8),
        Some("0b") => (&t[2..], 2),
        _ => (t.as_str(), 10),
    };
    i64::from_str_radix(digits, radix).ok()
}

/// Imaginary literals (`1j`) are not floats.
fn parse_float(text: &str) -> Option<f64> {
    text.replace('_', "").parse().ok()
}

/// Python escape sequences for a non-raw literal. Unknown escapes keep the
/// backslash, as Python does.
pub(crate) fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(e) = chars.next() else {
            out.push('\\');
            break;
        };
        match e {
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\x0b'),
            'x' | 'u' | 'U' => {
                let width = match e {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let mut hex = String::new();
                while hex.len() < width {
                    match chars.peek() {
                        Some(h) if h.is_ascii_hexdigit() => {
                            hex.push(*h);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) if hex.len() == width => out.push(ch),
                    _ => {
                        out.push('\\');
                        out.push(e);
                        out.push_str(&hex);
                    }
                }
            }
            '0'..='7' => {
                let mut oct = String::from(e);
                while oct.len() < 3 {
                    match chars.peek() {
                        Some(d @ '0'..='7') => {
                            oct.push(*d);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                match u32::from_str_radix(&oct, 8).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => out.push_str(&oct),
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

#[cfg(test)]
fn parse(src: &str) -> AuditResult<Node> {
    let mut parser = tree_sitter::Parser::new();
    parser.set_language(&tree_sitter::Language::from(tree_sitter_python::LANGUAGE))?;
    let tree = parser
        .parse(src, None)
        .ok_or_else(|| AuditError::Other("tree-sitter failed".into()))?;
    lower(&tree, src)
}

#[cfg(test)]
fn first_stmt(src: &str) -> Node {
    match parse(src).unwrap().data {
        NodeData::Module { mut body } => body.remove(0),
        other => panic!("not a module: {other:?}"),
    }
}

#[test]
fn escapes_follow_python_rules() {
    assert_eq!(unescape(r"a\tb\x41\101\u00e9\q"), "a\tbAAé\\q");
    assert_eq!(unescape(r"\x4"), "\\x4");
}

#[test]
fn function_with_docstring_and_decorator() {
    let f = first_stmt("@app.route('/')\ndef login(user, *args, key=None, **kw):\n    \"\"\"TODO: hash\"\"\"\n    return 1\n");
    let NodeData::FunctionDef { name, params, decorators, body, docstring } = f.data else {
        panic!("expected a function");
    };
    assert_eq!(name, "login");
    assert_eq!(params, vec!["user", "args", "key", "kw"]);
    assert_eq!(decorators.len(), 1);
    assert_eq!(body.len(), 2);
    assert_eq!(docstring.as_deref(), Some("TODO: hash"));
    assert_eq!(f.loc, Location::new(2, 1));
}

#[test]
fn calls_keep_positional_and_keyword_arguments() {
    let s = first_stmt("key = RSA(bits=-1024, **opts)\n");
    let NodeData::Assign { targets, value } = s.data else {
        panic!("expected an assignment");
    };
    assert_eq!(targets[0].as_name(), Some("key"));
    let NodeData::Call { keywords, .. } = &value.data else {
        panic!("expected a call");
    };
    assert_eq!(keywords[0].name.as_deref(), Some("bits"));
    assert_eq!(keywords[0].value.as_int(), Some(-1024));
    assert_eq!(keywords[1].name, None);
}

#[test]
fn elif_nests_and_comparisons_keep_every_operator() {
    let s = first_stmt("if a <= 1:\n    pass\nelif b not in c:\n    pass\nelse:\n    x = 1\n");
    let NodeData::If { test, orelse, .. } = s.data else {
        panic!("expected if");
    };
    assert!(matches!(&test.data, NodeData::Compare { ops, .. } if ops == &vec![CmpOp::LtE]));
    let NodeData::If { test, orelse: inner_else, .. } = &orelse[0].data else {
        panic!("elif should be a nested if");
    };
    assert!(matches!(&test.data, NodeData::Compare { ops, .. } if ops == &vec![CmpOp::NotIn]));
    assert_eq!(inner_else.len(), 1);
}

#[test]
fn strings_decode_prefixes_and_concatenation() {
    let e = first_stmt("x = b'pass\\x00' 'word'\n");
    let NodeData::Assign { value, .. } = e.data else {
        panic!("expected an assignment");
    };
    assert_eq!(value.data, NodeData::Str { value: "pass\0word".into(), bytes: true });

    let raw = first_stmt("r'\\d+'\n");
    let NodeData::Expr { value } = raw.data else {
        panic!("expected an expression statement");
    };
    assert_eq!(value.as_str(), Some("\\d+"));
}

#[test]
fn try_handlers_and_imports() {
    let t = first_stmt("try:\n    go()\nexcept (ValueError, KeyError) as e:\n    pass\nexcept:\n    pass\nfinally:\n    done()\n");
    let NodeData::Try { handlers, finalbody, .. } = t.data else {
        panic!("expected try");
    };
    assert_eq!(handlers.len(), 2);
    assert!(matches!(&handlers[1].data, NodeData::ExceptHandler { type_: None, .. }));
    assert_eq!(finalbody.len(), 1);

    let i = first_stmt("from os import path as p, sep\n");
    assert_eq!(
        i.data,
        NodeData::ImportFrom {
            module: Some("os".into()),
            names: vec![
                Alias { name: "path".into(), asname: Some("p".into()) },
                Alias { name: "sep".into(), asname: None },
            ],
        }
    );
}

#[test]
fn syntax_errors_are_reported_with_a_position() {
    let err = parse("def f(:\n    pass\n").unwrap_err();
    assert!(matches!(err, AuditError::Parse { line: 1, .. }), "{err:?}");
}
