//! Weak hashes, MACs and RNGs; key sizes and operation coverage of
//! primitive constructors.

use crate::errors::{AuditError, AuditResult};
use crate::matchers::{CallMatcher, PrimitiveTable};
use crate::node::{KindSet, Node, NodeData};
use crate::patterns::common::CallRule;
use crate::patterns::{Overrides, RuleMeta, Severity, compile};
use crate::registry::{Finding, Rule};
use crate::traverse::AncestorContext;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub const INSECURE_HASH: RuleMeta = RuleMeta {
    id: "insecure_hash",
    description: "MD5/SHA-1 used for hashing",
    message: "uses an insecure hash function ({name})",
    severity: Severity::High,
};

pub const INSECURE_MAC: RuleMeta = RuleMeta {
    id: "insecure_mac",
    description: "Weak message authentication code construction",
    message: "uses an insecure message authentication code (MAC) function ({name})",
    severity: Severity::Medium,
};

pub const INSECURE_RANDOM: RuleMeta = RuleMeta {
    id: "insecure_random",
    description: "`random` module used where a CSPRNG is expected",
    message: "uses the insecure random number generator {name} (consider using secrets module)",
    severity: Severity::Medium,
};

pub const WEAK_KEY_SIZE: RuleMeta = RuleMeta {
    id: "weak_key_size",
    description: "Primitive constructed with a key below the minimum size",
    message: "uses a weak key size for {primitive} ({bits} bits, minimum {min})",
    severity: Severity::High,
};

pub const MISSING_OPERATIONS: RuleMeta = RuleMeta {
    id: "missing_crypto_operations",
    description: "Primitive constructed without its full operation set",
    message: "does not use all required cryptographic operations for {primitive} ({missing})",
    severity: Severity::Low,
};

pub const RULES: &[RuleMeta] = &[
    INSECURE_HASH,
    INSECURE_MAC,
    INSECURE_RANDOM,
    WEAK_KEY_SIZE,
    MISSING_OPERATIONS,
];

/// Operations a primitive may be required to support.
pub const OPERATIONS: &[&str] = &["encrypt", "decrypt", "sign", "verify"];

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct CryptoConfig {
    /// Searched against the dotted callee path.
    pub insecure_hash: String,
    pub insecure_mac: String,
    pub insecure_random: String,
    /// Keyword carrying the key size.
    pub bits_keyword: String,
    pub key_sizes: BTreeMap<String, i64>,
    pub required_ops: BTreeMap<String, Vec<String>>,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        let key_sizes = [
            ("RSA", 2048_i64),
            ("DSA", 2048),
            ("ECDSA", 256),
            ("Ed25519", 256),
            ("AES", 256),
            ("ChaCha20", 256),
        ];
        let sign = &["sign", "verify"][..];
        let cipher = &["encrypt", "decrypt"][..];
        let required_ops = [
            ("RSA", &["encrypt", "decrypt", "sign", "verify"][..]),
            ("DSA", sign),
            ("ECDSA", sign),
            ("Ed25519", sign),
            ("AES", cipher),
            ("ChaCha20", cipher),
        ];
        Self {
            insecure_hash: r"^(hashlib\.)?(md5|sha1)$".into(),
            insecure_mac: r"^(hmac\.new|hashlib\.pbkdf2_hmac)$".into(),
            insecure_random: r"^random\.\w+$".into(),
            bits_keyword: "bits".into(),
            key_sizes: key_sizes.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect(),
            required_ops: required_ops
                .iter()
                .map(|(k, ops)| ((*k).to_owned(), ops.iter().map(|s| (*s).to_owned()).collect()))
                .collect(),
        }
    }
}

impl CryptoConfig {
    fn table(&self) -> AuditResult<PrimitiveTable> {
        for (name, bits) in &self.key_sizes {
            if *bits <= 0 {
                return Err(AuditError::config(format!(
                    "`crypto.key_sizes.{name}` must be positive, got {bits}"
                )));
            }
        }
        let mut required_ops = BTreeMap::new();
        for (name, ops) in &self.required_ops {
            if let Some(bad) = ops.iter().find(|op| !OPERATIONS.contains(&op.as_str())) {
                return Err(AuditError::config(format!(
                    "`crypto.required_ops.{name}`: unknown operation `{bad}`"
                )));
            }
            required_ops.insert(name.clone(), ops.iter().cloned().collect::<BTreeSet<_>>());
        }
        Ok(PrimitiveTable { min_bits: self.key_sizes.clone(), required_ops })
    }
}

#[derive(Debug, Clone, Copy)]
enum Check {
    KeySize,
    Operations,
}

/// Constructor calls of known primitives, by bare name.
struct PrimitiveRule {
    meta: RuleMeta,
    table: Arc<PrimitiveTable>,
    bits_keyword: String,
    check: Check,
}

impl Rule for PrimitiveRule {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::CALL
    }

    fn check(&self, node: &Node, _cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        let Some(primitive) = primitive_name(node) else {
            return Vec::new();
        };
        if !self.table.knows(primitive) {
            return Vec::new();
        }

        match self.check {
            Check::Operations => {
                let missing = self.table.missing_ops(primitive, node);
                if missing.is_empty() {
                    return Vec::new();
                }
                let missing = missing.join(", ");
                vec![Finding::at(
                    node,
                    self.meta.render(&[("primitive", primitive), ("missing", missing.as_str())]),
                )]
            }
            Check::KeySize => match self.table.weak_key(primitive, node, &self.bits_keyword) {
                Some((bits, min)) => vec![Finding::at(
                    node,
                    self.meta.render(&[
                        ("primitive", primitive),
                        ("bits", bits.to_string().as_str()),
                        ("min", min.to_string().as_str()),
                    ]),
                )],
                None => Vec::new(),
            },
        }
    }
}

/// `RSA(...)`, but not `mod.RSA(...)`: constructors are matched by bare
/// name only.
fn primitive_name(node: &Node) -> Option<&str> {
    match &node.data {
        NodeData::Call { func, .. } => func.as_name(),
        _ => None,
    }
}

pub(crate) fn rules(cfg: &CryptoConfig, ov: &Overrides<'_>) -> AuditResult<Vec<Arc<dyn Rule>>> {
    let table = Arc::new(cfg.table()?);
    let rules: Vec<Arc<dyn Rule>> = vec![
        Arc::new(CallRule::new(
            ov.meta(&INSECURE_HASH),
            CallMatcher::Pattern(compile("crypto.insecure_hash", &cfg.insecure_hash)?),
        )),
        Arc::new(CallRule::new(
            ov.meta(&INSECURE_MAC),
            CallMatcher::Pattern(compile("crypto.insecure_mac", &cfg.insecure_mac)?),
        )),
        Arc::new(CallRule::new(
            ov.meta(&INSECURE_RANDOM),
            CallMatcher::Pattern(compile("crypto.insecure_random", &cfg.insecure_random)?),
        )),
        Arc::new(PrimitiveRule {
            meta: ov.meta(&WEAK_KEY_SIZE),
            table: table.clone(),
            bits_keyword: cfg.bits_keyword.clone(),
            check: Check::KeySize,
        }),
        Arc::new(PrimitiveRule {
            meta: ov.meta(&MISSING_OPERATIONS),
            table,
            bits_keyword: cfg.bits_keyword.clone(),
            check: Check::Operations,
        }),
    ];
    Ok(rules)
}

#[test]
fn unknown_operation_is_rejected() {
    let mut cfg = CryptoConfig::default();
    cfg.required_ops.insert("RSA".into(), vec!["encrypt".into(), "teleport".into()]);
    assert!(matches!(cfg.table(), Err(AuditError::Config(_))));
}

#[test]
fn non_positive_key_size_is_rejected() {
    let mut cfg = CryptoConfig::default();
    cfg.key_sizes.insert("AES".into(), 0);
    assert!(matches!(cfg.table(), Err(AuditError::Config(_))));
}

#[test]
fn default_table_matches_the_documented_floors() {
    let t = CryptoConfig::default().table().unwrap();
    assert_eq!(t.min_bits["RSA"], 2048);
    assert_eq!(t.min_bits["ECDSA"], 256);
    assert_eq!(t.required_ops["DSA"].len(), 2);
}

#[test]
fn each_primitive_check_reports_only_its_own_problem() {
    use crate::node::Keyword;
    use crate::node::build::*;

    let table = Arc::new(CryptoConfig::default().table().unwrap());
    let rule = |meta, check| PrimitiveRule { meta, table: table.clone(), bits_keyword: "bits".into(), check };
    let weak = at(
        1,
        NodeData::Call {
            func: Box::new(name("RSA")),
            args: vec![],
            keywords: vec![Keyword { name: Some("bits".into()), value: int(1024) }],
        },
    );
    let cx = AncestorContext::empty();

    let sizes = rule(WEAK_KEY_SIZE, Check::KeySize).check(&weak, &cx);
    assert_eq!(sizes.len(), 1);
    assert!(sizes[0].message.contains("1024"), "{}", sizes[0].message);

    let ops = rule(MISSING_OPERATIONS, Check::Operations).check(&weak, &cx);
    assert_eq!(ops.len(), 1);
    assert!(!ops[0].message.contains("1024"), "{}", ops[0].message);
}
