use crate::matchers::CallMatcher;
use crate::node::{KindSet, Node};
use crate::patterns::RuleMeta;
use crate::registry::{Finding, Rule};
use crate::traverse::AncestorContext;

/// Extra condition a call must satisfy after its name matched.
pub(crate) type Guard = fn(&Node, &AncestorContext<'_, '_>) -> bool;

/// A call whose name matches `matcher`; `{name}` in the message is the
/// matched name.
pub(crate) struct CallRule {
    meta: RuleMeta,
    matcher: CallMatcher,
    guard: Option<Guard>,
}

impl CallRule {
    pub(crate) fn new(meta: RuleMeta, matcher: CallMatcher) -> Self {
        Self { meta, matcher, guard: None }
    }

    pub(crate) fn with_guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }
}

impl Rule for CallRule {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::CALL
    }

    fn check(&self, node: &Node, cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        let Some(name) = self.matcher.matches(node) else {
            return Vec::new();
        };
        if self.guard.is_some_and(|g| !g(node, cx)) {
            return Vec::new();
        }
        vec![Finding::at(node, self.meta.render(&[("name", name.as_str())]))]
    }
}

pub(crate) fn strings(xs: &[&str]) -> Vec<String> {
    xs.iter().map(|s| (*s).to_owned()).collect()
}
