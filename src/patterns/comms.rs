//! Plain-text protocols and TLS tuning on network calls.

use crate::errors::AuditResult;
use crate::matchers::LiteralMatcher;
use crate::matchers::call::{call_path, keyword, str_arg};
use crate::node::{Constant, KindSet, Node, NodeData};
use crate::patterns::{Overrides, RuleMeta, Severity, compile};
use crate::registry::{Finding, Rule};
use crate::traverse::AncestorContext;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const INSECURE_PROTOCOL: RuleMeta = RuleMeta {
    id: "insecure_protocol",
    description: "Network call to a plain-text URL scheme",
    message: "uses insecure communication protocol ({scheme})",
    severity: Severity::High,
};

pub const VERIFY_DISABLED: RuleMeta = RuleMeta {
    id: "tls_verification_disabled",
    description: "Network call with certificate verification turned off",
    message: "does not verify server certificates",
    severity: Severity::High,
};

pub const TLS_KEYWORDS: RuleMeta = RuleMeta {
    id: "tls_keyword_arguments",
    description: "Network call overriding TLS settings",
    message: "uses insecure communication keyword arguments: {keywords}",
    severity: Severity::Low,
};

pub const RULES: &[RuleMeta] = &[INSECURE_PROTOCOL, VERIFY_DISABLED, TLS_KEYWORDS];

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct CommsConfig {
    /// Searched against the dotted callee path.
    pub functions: String,
    pub protocols: String,
    pub tls_keywords: String,
    pub verify_keyword: String,
}

impl Default for CommsConfig {
    fn default() -> Self {
        Self {
            functions: "socket|httplib|urllib|requests".into(),
            protocols: "http://|ftp://|telnet://".into(),
            tls_keywords: "(cafile|capath|certfile|keyfile|cert_reqs|ssl_version|context|verify)".into(),
            verify_keyword: "verify".into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Check {
    Protocol,
    VerifyOff,
    TlsKeywords,
}

struct CommsRule {
    meta: RuleMeta,
    check: Check,
    functions: Regex,
    protocols: LiteralMatcher,
    tls_keywords: Regex,
    verify_keyword: String,
}

impl CommsRule {
    fn is_network_call(&self, call: &Node) -> bool {
        call_path(call).is_some_and(|p| self.functions.is_match(&p))
    }
}

impl Rule for CommsRule {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn kinds(&self) -> KindSet {
        KindSet::CALL
    }

    fn check(&self, node: &Node, _cx: &AncestorContext<'_, '_>) -> Vec<Finding> {
        if !self.is_network_call(node) {
            return Vec::new();
        }
        let message = match self.check {
            Check::Protocol => str_arg(node, 0)
                .and_then(|url| self.protocols.find(url))
                .map(|scheme| self.meta.render(&[("scheme", scheme)])),
            Check::VerifyOff => keyword(node, &self.verify_keyword)
                .filter(|v| v.data == NodeData::Constant(Constant::Bool(false)))
                .map(|_| self.meta.render(&[])),
            Check::TlsKeywords => {
                let NodeData::Call { keywords, .. } = &node.data else {
                    return Vec::new();
                };
                let hits: Vec<&str> = keywords
                    .iter()
                    .filter_map(|k| k.name.as_deref())
                    .filter(|k| self.tls_keywords.is_match(k))
                    .collect();
                (!hits.is_empty()).then(|| self.meta.render(&[("keywords", hits.join(", ").as_str())]))
            }
        };
        message.map(|m| vec![Finding::at(node, m)]).unwrap_or_default()
    }
}

pub(crate) fn rules(cfg: &CommsConfig, ov: &Overrides<'_>) -> AuditResult<Vec<Arc<dyn Rule>>> {
    let functions = compile("comms.functions", &cfg.functions)?;
    let protocols = compile("comms.protocols", &cfg.protocols)?;
    let tls_keywords = compile("comms.tls_keywords", &cfg.tls_keywords)?;

    let checks = [
        (&INSECURE_PROTOCOL, Check::Protocol),
        (&VERIFY_DISABLED, Check::VerifyOff),
        (&TLS_KEYWORDS, Check::TlsKeywords),
    ];
    Ok(checks
        .into_iter()
        .map(|(meta, check)| {
            Arc::new(CommsRule {
                meta: ov.meta(meta),
                check,
                functions: functions.clone(),
                protocols: LiteralMatcher::new(protocols.clone()),
                tls_keywords: tls_keywords.clone(),
                verify_keyword: cfg.verify_keyword.clone(),
            }) as Arc<dyn Rule>
        })
        .collect())
}

#[cfg(test)]
use crate::node::{Keyword, build::*};

#[cfg(test)]
fn requests_get(url: &str, kws: Vec<(&str, Node)>) -> Node {
    let func = at(1, NodeData::Attribute { value: Box::new(name("requests")), attr: "get".into() });
    at(
        1,
        NodeData::Call {
            func: Box::new(func),
            args: vec![string(url)],
            keywords: kws.into_iter().map(|(k, v)| Keyword { name: Some(k.into()), value: v }).collect(),
        },
    )
}

#[cfg(test)]
fn scan_one(c: &Node) -> Vec<(&'static str, String)> {
    let cfg = super::RuleSetConfig::default();
    let ov = Overrides { severity: &cfg.severity };
    rules(&cfg.comms, &ov)
        .unwrap()
        .iter()
        .flat_map(|r| {
            let id = r.meta().id;
            r.check(c, &AncestorContext::empty()).into_iter().map(move |f| (id, f.message))
        })
        .collect()
}

#[test]
fn plain_http_is_reported_and_https_is_not() {
    let found = scan_one(&requests_get("http://example.com", vec![]));
    assert_eq!(found, vec![("insecure_protocol", "uses insecure communication protocol (http://)".to_owned())]);
    assert!(scan_one(&requests_get("https://example.com", vec![])).is_empty());
}

#[test]
fn verify_false_trips_both_tls_rules() {
    let off = at(1, NodeData::Constant(Constant::Bool(false)));
    let ids: Vec<_> = scan_one(&requests_get("https://x", vec![("verify", off)]))
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(ids, vec!["tls_verification_disabled", "tls_keyword_arguments"]);
}

#[test]
fn non_network_calls_are_ignored() {
    let c = call(name("fetch"), vec![string("http://example.com")]);
    assert!(scan_one(&c).is_empty());
}
