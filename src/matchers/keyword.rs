//! Set arithmetic over argument names and dictionary keys.

use crate::matchers::call::keyword;
use crate::node::{Constant, Node, NodeData};
use std::collections::{BTreeMap, BTreeSet};

/// String-literal positional values plus keyword names.
pub fn observed_arg_names(call: &Node) -> BTreeSet<String> {
    let NodeData::Call { args, keywords, .. } = &call.data else {
        return BTreeSet::new();
    };
    args.iter()
        .filter_map(Node::as_str)
        .map(str::to_owned)
        .chain(keywords.iter().filter_map(|k| k.name.clone()))
        .collect()
}

/// `required - observed`, sorted.
pub fn missing(required: &BTreeSet<String>, observed: &BTreeSet<String>) -> Vec<String> {
    required.difference(observed).cloned().collect()
}

pub fn keyword_int(call: &Node, name: &str) -> Option<i64> {
    keyword(call, name).and_then(Node::as_int)
}

fn key_mentions(key: &str, words: &[String]) -> bool {
    let key = key.to_lowercase();
    words.iter().any(|w| key.contains(&w.to_lowercase()))
}

/// String keys of a dict literal that mention none of `policy_words`.
/// Non-literal keys are out of scope and never reported.
pub fn unpoliced_keys(dict: &Node, policy_words: &[String]) -> Vec<String> {
    let NodeData::Dict { keys, .. } = &dict.data else {
        return Vec::new();
    };
    keys.iter()
        .flatten()
        .filter_map(Node::as_str)
        .filter(|k| !key_mentions(k, policy_words))
        .map(str::to_owned)
        .collect()
}

/// Which policy words are set to a literal `True` somewhere in the dict.
pub fn granted_policies(dict: &Node, policy_words: &[String]) -> BTreeSet<String> {
    let NodeData::Dict { keys, values } = &dict.data else {
        return BTreeSet::new();
    };
    let mut out = BTreeSet::new();
    for (key, value) in keys.iter().zip(values) {
        let Some(key) = key.as_ref().and_then(|k| k.as_str()) else {
            continue;
        };
        if value.data != NodeData::Constant(Constant::Bool(true)) {
            continue;
        }
        let key = key.to_lowercase();
        for w in policy_words {
            if key.contains(&w.to_lowercase()) {
                out.insert(w.clone());
            }
        }
    }
    out
}

/// Per-primitive key size floor and required operation set.
#[derive(Debug, Clone, Default)]
pub struct PrimitiveTable {
    pub min_bits: BTreeMap<String, i64>,
    pub required_ops: BTreeMap<String, BTreeSet<String>>,
}

impl PrimitiveTable {
    pub fn knows(&self, primitive: &str) -> bool {
        self.min_bits.contains_key(primitive) || self.required_ops.contains_key(primitive)
    }

    /// `Some((bits, minimum))` when an explicit `bits_keyword` is below the
    /// floor for `primitive`.
    pub fn weak_key(&self, primitive: &str, call: &Node, bits_keyword: &str) -> Option<(i64, i64)> {
        let min = *self.min_bits.get(primitive)?;
        let bits = keyword_int(call, bits_keyword)?;
        (bits < min).then_some((bits, min))
    }

    /// Required operations the constructor call does not name.
    pub fn missing_ops(&self, primitive: &str, call: &Node) -> Vec<String> {
        match self.required_ops.get(primitive) {
            Some(required) => missing(required, &observed_arg_names(call)),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
use crate::node::{Keyword, build::*};

#[cfg(test)]
fn rsa(args: Vec<Node>, kws: Vec<(&str, Node)>) -> Node {
    at(
        1,
        NodeData::Call {
            func: Box::new(name("RSA")),
            args,
            keywords: kws
                .into_iter()
                .map(|(k, v)| Keyword { name: Some(k.into()), value: v })
                .collect(),
        },
    )
}

#[cfg(test)]
fn table() -> PrimitiveTable {
    let mut t = PrimitiveTable::default();
    t.min_bits.insert("RSA".into(), 2048);
    t.required_ops.insert(
        "RSA".into(),
        ["encrypt", "decrypt", "sign", "verify"].into_iter().map(String::from).collect(),
    );
    t
}

#[test]
fn weak_key_only_when_explicitly_below_minimum() {
    let t = table();
    assert_eq!(t.weak_key("RSA", &rsa(vec![], vec![("bits", int(1024))]), "bits"), Some((1024, 2048)));
    assert_eq!(t.weak_key("RSA", &rsa(vec![], vec![("bits", int(2048))]), "bits"), None);
    assert_eq!(t.weak_key("RSA", &rsa(vec![], vec![]), "bits"), None);
    assert_eq!(t.weak_key("AES", &rsa(vec![], vec![("bits", int(8))]), "bits"), None);
}

#[test]
fn missing_ops_combines_positional_strings_and_keywords() {
    let t = table();
    let c = rsa(vec![string("encrypt"), string("decrypt")], vec![("sign", name("k"))]);
    assert_eq!(t.missing_ops("RSA", &c), vec!["verify".to_string()]);
}

#[test]
fn policy_keys_are_matched_case_insensitively() {
    let words = vec!["allow".to_string(), "deny".to_string()];
    let dict = at(
        1,
        NodeData::Dict {
            keys: vec![Some(string("ALLOW_read")), Some(string("admin")), None],
            values: vec![
                at(1, NodeData::Constant(Constant::Bool(true))),
                at(1, NodeData::Constant(Constant::Bool(true))),
                name("extra"),
            ],
        },
    );
    assert_eq!(unpoliced_keys(&dict, &words), vec!["admin".to_string()]);
    assert_eq!(granted_policies(&dict, &words).into_iter().collect::<Vec<_>>(), vec!["allow"]);
}
