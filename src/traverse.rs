//! Pre-order tree walk with an explicit ancestor stack.
//!
//! The walker is a lending iterator: each [`Visit`] borrows the walker's
//! own ancestor stack, so it has to be consumed with
//! `while let Some(v) = walker.next()` (the same shape as tree-sitter's
//! `StreamingIterator`).

use crate::node::{Node, NodeKind};

/// Enclosing nodes of the node being visited, outermost first in storage.
#[derive(Debug, Clone, Copy)]
pub struct AncestorContext<'w, 'a> {
    chain: &'w [&'a Node],
}

impl<'w, 'a> AncestorContext<'w, 'a> {
    pub fn new(chain: &'w [&'a Node]) -> Self {
        Self { chain }
    }

    pub fn empty() -> Self {
        Self { chain: &[] }
    }

    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    pub fn parent(&self) -> Option<&'a Node> {
        self.chain.last().copied()
    }

    /// Innermost to outermost.
    pub fn iter(&self) -> impl Iterator<Item = &'a Node> + 'w {
        self.chain.iter().rev().copied()
    }

    pub fn innermost(&self, kind: NodeKind) -> Option<&'a Node> {
        self.iter().find(|n| n.kind() == kind)
    }

    pub fn within(&self, kind: NodeKind) -> bool {
        self.innermost(kind).is_some()
    }

    pub fn enclosing_function(&self) -> Option<&'a Node> {
        self.innermost(NodeKind::FunctionDef)
    }

    /// Name reported for a finding on `node`: the function itself when the
    /// node is a definition, the innermost enclosing one otherwise.
    pub fn function_name_for<'n>(&self, node: &'n Node) -> Option<&'n str>
    where
        'a: 'n,
    {
        node.function_name()
            .or_else(|| self.enclosing_function().and_then(Node::function_name))
    }
}

pub struct Visit<'w, 'a> {
    pub node: &'a Node,
    pub ancestors: AncestorContext<'w, 'a>,
}

pub struct Walker<'a> {
    root: &'a Node,
    pending: Vec<(&'a Node, usize)>,
    ancestors: Vec<&'a Node>,
    last: Option<(&'a Node, usize)>,
    skip: bool,
}

impl<'a> Walker<'a> {
    pub fn new(root: &'a Node) -> Self {
        Self {
            root,
            pending: vec![(root, 0)],
            ancestors: Vec::new(),
            last: None,
            skip: false,
        }
    }

    /// Rewind to the root; the next call yields it again.
    pub fn restart(&mut self) {
        *self = Walker::new(self.root);
    }

    /// Do not descend into the node most recently yielded.
    pub fn skip_children(&mut self) {
        self.skip = true;
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Visit<'_, 'a>> {
        if let Some((node, depth)) = self.last.take() {
            if !std::mem::take(&mut self.skip) {
                self.ancestors.truncate(depth);
                self.ancestors.push(node);
                for child in node.children().into_iter().rev() {
                    self.pending.push((child, depth + 1));
                }
            }
        }

        let (node, depth) = self.pending.pop()?;
        self.ancestors.truncate(depth);
        self.last = Some((node, depth));
        Some(Visit {
            node,
            ancestors: AncestorContext::new(&self.ancestors),
        })
    }
}

#[cfg(test)]
use crate::node::{NodeData, build::*};

#[cfg(test)]
fn sample_tree() -> Node {
    // def f():
    //     if x:
    //         g(1)
    //     return 2
    let inner_call = call(name("g"), vec![int(1)]);
    let iff = at(
        2,
        NodeData::If {
            test: Box::new(name("x")),
            body: vec![at(3, NodeData::Expr { value: Box::new(inner_call) })],
            orelse: vec![],
        },
    );
    let ret = at(4, NodeData::Return { value: Some(Box::new(int(2))) });
    let func = at(
        1,
        NodeData::FunctionDef {
            name: "f".into(),
            params: vec![],
            decorators: vec![],
            body: vec![iff, ret],
            docstring: None,
        },
    );
    module(vec![func])
}

#[test]
fn walk_is_preorder_and_exhaustive() {
    let tree = sample_tree();
    let mut seen = Vec::new();
    let mut w = Walker::new(&tree);
    while let Some(v) = w.next() {
        seen.push(v.node as *const Node);
    }

    let expected: Vec<_> = tree.descendants().into_iter().map(|n| n as *const Node).collect();
    assert_eq!(seen, expected);

    let mut dedup = seen.clone();
    dedup.sort();
    dedup.dedup();
    assert_eq!(dedup.len(), seen.len(), "each node exactly once");
}

#[test]
fn ancestors_track_the_enclosing_chain() {
    let tree = sample_tree();
    let mut w = Walker::new(&tree);
    let mut checked = false;
    while let Some(v) = w.next() {
        if v.node.kind() == NodeKind::Call {
            let kinds: Vec<_> = v.ancestors.iter().map(Node::kind).collect();
            assert_eq!(
                kinds,
                vec![NodeKind::Expr, NodeKind::If, NodeKind::FunctionDef, NodeKind::Module]
            );
            assert_eq!(v.ancestors.function_name_for(v.node), Some("f"));
            checked = true;
        }
        if v.node.kind() == NodeKind::Return {
            assert_eq!(v.ancestors.parent().map(Node::kind), Some(NodeKind::FunctionDef));
            assert!(!v.ancestors.within(NodeKind::If));
        }
    }
    assert!(checked);
}

#[test]
fn skip_children_prunes_one_subtree() {
    let tree = sample_tree();
    let mut w = Walker::new(&tree);
    let mut kinds = Vec::new();
    while let Some(v) = w.next() {
        let k = v.node.kind();
        kinds.push(k);
        if k == NodeKind::If {
            w.skip_children();
        }
    }
    assert!(!kinds.contains(&NodeKind::Call));
    assert!(kinds.contains(&NodeKind::Return));
}

#[test]
fn restart_replays_the_same_sequence() {
    let tree = sample_tree();
    let mut w = Walker::new(&tree);
    let mut first = Vec::new();
    while let Some(v) = w.next() {
        first.push(v.node.kind());
    }
    w.restart();
    let mut second = Vec::new();
    while let Some(v) = w.next() {
        second.push(v.node.kind());
    }
    assert_eq!(first, second);
}
