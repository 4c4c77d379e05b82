//! Authentication and authorization entry points.

use crate::errors::AuditResult;
use crate::matchers::call::{call_name, positional, str_arg};
use crate::matchers::keyword::{granted_policies, unpoliced_keys};
use crate::node::{KindSet, Node, NodeKind};
use crate::patterns::common::strings;
use crate::patterns::{Overrides, RuleMeta, Severity};
use crate::registry::{Finding, Rule};
use crate::traverse::AncestorContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const UNSALTED_HASH: RuleMeta = RuleMeta {
    id: "unsalted_password_hash",
    description: "authenticate() with a scheme that is not a salted KDF",
    message: "uses unsalted password hashing",
    severity: Severity::High,
};

pub const INSECURE_SESSION: RuleMeta = RuleMeta {
    id: "insecure_session",
    description: "authorize() with a session scheme not marked secure",
    message: "uses insecure session management",
    severity: Severity::Medium,
};

pub const INCOMPLETE_AUTHZ: RuleMeta = RuleMeta {
    id: "incomplete_authorization",
    description: "Authorization dict keys without an explicit allow/deny policy",
    message: "performs incomplete authorization checks for keys: {keys}",
    severity: Severity::Medium,
};

pub const PERMISSIVE_AUTHZ: RuleMeta = RuleMeta {
    id: "permissive_authorization",
    description: "Authorization dict grants one policy without its counterpart",
    message: "includes overly permissive '{policy}' rules in its authorization checks",
    severity: Severity::Medium,
};

pub const RULES: &[RuleMeta] = &[UNSALTED_HASH, INSECURE_SESSION, INCOMPLETE_AUTHZ, PERMISSIVE_AUTHZ];

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub authenticate: Vec<String>,
    pub authorize: Vec<String>,
    /// Schemes accepted as salted password hashing.
    pub strong_hashes: Vec<String>,
    /// Word a session scheme must contain.
    pub secure_marker: String,
    /// Words every authorization key must name (first is the allow word,
    /// second the deny word).
    pub policy_words: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            authenticate: strings(&["authenticate"]),
            authorize: strings(&["authorize"]),
            strong_hashes: strings(&["bcrypt", "scrypt", "argon2"]),
            secure_marker: "secure".into(),
            policy_words: strings(&["allow", "deny"]),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Check {
    UnsaltedHash,
    InsecureSession,
    Incomplete,
    Permissive,
}

struct AuthRule {
    meta: RuleMeta,
    cfg: Arc<AuthConfig>,
    check: Check,
}

impl AuthRule {
    fn is_entry(names: &[String], call: &Node) -> bool {
        call_name(call).is_some_and(|n| names.iter().any(|e| e == n))
    }

    /// Second positional argument when it is a dict literal.
    fn policy_dict(call: &Node) -> Option<&Node> {
        positional(call).get(1).filter(|n| n.kind() == NodeKind::Dict)
    }
}

impl Rule for AuthRule {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::CALL
    }

    fn check(&self, node: &Node, _cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        let cfg = &self.cfg;
        let hit = |msg: String| vec![Finding::at(node, msg)];

        match self.check {
            Check::UnsaltedHash => {
                if !Self::is_entry(&cfg.authenticate, node) {
                    return Vec::new();
                }
                match str_arg(node, 0) {
                    Some(scheme) if !cfg.strong_hashes.iter().any(|h| scheme.contains(h.as_str())) => {
                        hit(self.meta.render(&[]))
                    }
                    _ => Vec::new(),
                }
            }
            Check::InsecureSession => {
                if !Self::is_entry(&cfg.authorize, node) {
                    return Vec::new();
                }
                match str_arg(node, 0) {
                    Some(s) if !s.to_lowercase().contains(&cfg.secure_marker.to_lowercase()) => {
                        hit(self.meta.render(&[]))
                    }
                    _ => Vec::new(),
                }
            }
            Check::Incomplete => {
                if !Self::is_entry(&cfg.authorize, node) {
                    return Vec::new();
                }
                let Some(dict) = Self::policy_dict(node) else {
                    return Vec::new();
                };
                let keys = unpoliced_keys(dict, &cfg.policy_words);
                if keys.is_empty() {
                    return Vec::new();
                }
                let keys = format!("{keys:?}");
                hit(self.meta.render(&[("keys", keys.as_str())]))
            }
            Check::Permissive => {
                if !Self::is_entry(&cfg.authorize, node) {
                    return Vec::new();
                }
                let (Some(dict), [allow, deny, ..]) = (Self::policy_dict(node), cfg.policy_words.as_slice())
                else {
                    return Vec::new();
                };
                let granted = granted_policies(dict, &cfg.policy_words);
                match (granted.contains(allow), granted.contains(deny)) {
                    (true, false) => hit(self.meta.render(&[("policy", allow.as_str())])),
                    (false, true) => hit(self.meta.render(&[("policy", deny.as_str())])),
                    _ => Vec::new(),
                }
            }
        }
    }
}

pub(crate) fn rules(cfg: &AuthConfig, ov: &Overrides<'_>) -> AuditResult<Vec<Arc<dyn Rule>>> {
    let cfg = Arc::new(cfg.clone());
    let checks = [
        (&UNSALTED_HASH, Check::UnsaltedHash),
        (&INSECURE_SESSION, Check::InsecureSession),
        (&INCOMPLETE_AUTHZ, Check::Incomplete),
        (&PERMISSIVE_AUTHZ, Check::Permissive),
    ];
    Ok(checks
        .into_iter()
        .map(|(meta, check)| {
            Arc::new(AuthRule { meta: ov.meta(meta), cfg: cfg.clone(), check }) as Arc<dyn Rule>
        })
        .collect())
}

#[cfg(test)]
use crate::node::{Constant, NodeData, build::*};

#[cfg(test)]
fn check_with(check: Check, call: &Node) -> Vec<Finding> {
    let meta = match check {
        Check::UnsaltedHash => UNSALTED_HASH,
        Check::InsecureSession => INSECURE_SESSION,
        Check::Incomplete => INCOMPLETE_AUTHZ,
        Check::Permissive => PERMISSIVE_AUTHZ,
    };
    let rule = AuthRule { meta, cfg: Arc::new(AuthConfig::default()), check };
    rule.check(call, &AncestorContext::empty())
}

#[cfg(test)]
fn truth() -> Node {
    at(1, NodeData::Constant(Constant::Bool(true)))
}

#[test]
fn salted_schemes_are_accepted() {
    let weak = call(name("authenticate"), vec![string("sha256")]);
    let strong = call(name("authenticate"), vec![string("bcrypt_sha256")]);
    assert_eq!(check_with(Check::UnsaltedHash, &weak).len(), 1);
    assert!(check_with(Check::UnsaltedHash, &strong).is_empty());
    // non-literal scheme is out of reach
    assert!(check_with(Check::UnsaltedHash, &call(name("authenticate"), vec![name("s")])).is_empty());
}

#[test]
fn session_scheme_must_say_secure() {
    assert_eq!(check_with(Check::InsecureSession, &call(name("authorize"), vec![string("cookie")])).len(), 1);
    assert!(check_with(Check::InsecureSession, &call(name("authorize"), vec![string("Secure-Cookie")])).is_empty());
}

#[test]
fn authorization_dict_is_checked_for_policies() {
    let dict = at(
        1,
        NodeData::Dict {
            keys: vec![Some(string("allow_read")), Some(string("admin"))],
            values: vec![truth(), truth()],
        },
    );
    let c = call(name("authorize"), vec![string("secure"), dict]);

    let incomplete = check_with(Check::Incomplete, &c);
    assert_eq!(incomplete.len(), 1);
    assert!(incomplete[0].message.contains("admin"));

    let permissive = check_with(Check::Permissive, &c);
    assert_eq!(permissive.len(), 1);
    assert!(permissive[0].message.contains("'allow'"));
}
