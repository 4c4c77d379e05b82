//! End-to-end: source text → parser → registry → diagnostics.

use astguard::ast::{parse_python, scan_source};
use astguard::node::Node;
use astguard::patterns::{self, CATALOG, RuleSetConfig};
use astguard::registry::RuleRegistry;
use astguard::report::Diagnostic;
use astguard::traverse::Walker;

fn registry() -> RuleRegistry {
    patterns::build(&RuleSetConfig::default()).unwrap()
}

fn scan(src: &str) -> Vec<Diagnostic> {
    scan_source(src.as_bytes(), &registry()).unwrap()
}

fn ids(diags: &[Diagnostic]) -> Vec<&'static str> {
    diags.iter().map(|d| d.rule_id).collect()
}

fn only(rule: &str) -> RuleRegistry {
    let cfg = RuleSetConfig {
        disabled: CATALOG
            .iter()
            .map(|m| m.id.to_owned())
            .filter(|id| id != rule)
            .collect(),
        ..Default::default()
    };
    patterns::build(&cfg).unwrap()
}

#[test]
fn weak_rsa_key_is_reported_and_strong_one_is_not() {
    let weak = scan("key = RSA(bits=1024)\n");
    let hit = weak.iter().find(|d| d.rule_id == "weak_key_size").expect("1024-bit RSA");
    assert_eq!(hit.message, "uses a weak key size for RSA (1024 bits, minimum 2048)");
    assert_eq!((hit.loc.line, hit.loc.col), (1, 7));

    let strong = scan("key = RSA(bits=2048)\n");
    assert!(!ids(&strong).contains(&"weak_key_size"));
}

#[test]
fn literal_range_passes_and_symbolic_start_fails() {
    let ok = scan("for i in range(0, 10, 1):\n    pass\n");
    assert!(!ids(&ok).contains(&"invalid_range_loop"));

    let bad = scan("for i in range(x, 10):\n    pass\n");
    let hit = bad.iter().find(|d| d.rule_id == "invalid_range_loop").expect("symbolic start");
    assert_eq!(hit.message, "'i' cannot be used as loop variable in range(?, 10, 1)");
    assert_eq!(hit.loc.line, 1);
}

#[test]
fn literal_password_is_a_secret_and_prompted_one_is_not() {
    let lit = scan("def login():\n    password = \"abc123\"\n");
    let hit = lit.iter().find(|d| d.rule_id == "hardcoded_secret").expect("literal password");
    assert_eq!(hit.function.as_deref(), Some("login"));
    assert_eq!(hit.loc.line, 2);
    assert_eq!(hit.to_string(), "HIGH: login has a hardcoded password (2:5)");

    let prompted = scan("def login():\n    password = input()\n");
    assert!(!ids(&prompted).contains(&"hardcoded_secret"));
}

#[test]
fn base64_hiding_a_nul_byte_is_obfuscated() {
    let hidden = scan("blob = \"YWIAY2Q=\"\n");
    let hit = hidden.iter().find(|d| d.rule_id == "obfuscated_string").expect("NUL inside base64");
    assert!(hit.message.contains("base64"), "{}", hit.message);

    let clean = scan("blob = \"VGhlIHF1aWNrIGJyb3duIGZveA==\"\n");
    assert!(!ids(&clean).contains(&"obfuscated_string"));
}

#[test]
fn plain_http_is_insecure_and_https_is_not() {
    let plain = scan("import requests\nrequests.get(\"http://example.com/login\")\n");
    let hit = plain.iter().find(|d| d.rule_id == "insecure_protocol").expect("http://");
    assert_eq!(hit.loc.line, 2);

    let tls = scan("import requests\nrequests.get(\"https://example.com/login\")\n");
    assert!(!ids(&tls).contains(&"insecure_protocol"));
}

const MIXED: &str = r#"
import hashlib
import subprocess

def handler(request):
    """TODO: add auditing"""
    token = request.headers.get("api_key")
    try:
        digest = hashlib.md5(token)
    except:
        print("failed")
    subprocess.call("scp dump.sql backup:")
    while x < 3:
        assert digest
    return eval("digest")
"#;

#[test]
fn scanning_twice_gives_identical_results() {
    let reg = registry();
    let root = parse_python(MIXED.as_bytes()).unwrap();
    let first = reg.scan(&root).unwrap();
    let second = reg.scan(&root).unwrap();
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn each_rule_reports_the_same_alone_as_in_the_full_set() {
    let root = parse_python(MIXED.as_bytes()).unwrap();
    let full = registry().scan(&root).unwrap();

    for meta in CATALOG.iter().filter(|m| m.id != "non_range_iterable") {
        let alone = only(meta.id).scan(&root).unwrap();
        let from_full: Vec<_> = full.iter().filter(|d| d.rule_id == meta.id).cloned().collect();
        assert_eq!(alone, from_full, "rule {}", meta.id);
    }
}

#[test]
fn walker_visits_every_parsed_node_exactly_once() {
    let root = parse_python(MIXED.as_bytes()).unwrap();
    let mut seen: Vec<*const Node> = Vec::new();
    let mut walker = Walker::new(&root);
    while let Some(v) = walker.next() {
        seen.push(v.node);
    }

    let expected: Vec<*const Node> = root.descendants().into_iter().map(|n| n as *const Node).collect();
    assert_eq!(seen, expected);

    let mut unique = seen.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), seen.len());
}

#[test]
fn diagnostics_come_out_in_traversal_order() {
    let diags = scan(MIXED);
    let lines: Vec<_> = diags.iter().map(|d| d.loc.line).collect();
    let mut sorted = lines.clone();
    sorted.sort();
    assert_eq!(lines, sorted);
    for id in ["unvalidated_api_key", "insecure_hash", "broad_exception_handler", "insecure_shell_command", "dangerous_builtin"] {
        assert!(ids(&diags).contains(&id), "missing {id}");
    }
}

#[test]
fn login_helpers_are_not_logging_calls() {
    let login = scan("def f(user):\n    login(user, \"secret\")\n");
    assert!(!ids(&login).contains(&"logging_without_level"));

    let handler = scan("try:\n    work()\nexcept ValueError:\n    login_user()\n    logout()\n");
    assert!(ids(&handler).contains(&"unlogged_exception_handler"));

    let logged = scan("try:\n    work()\nexcept ValueError:\n    logging.error(\"boom\")\n");
    assert!(!ids(&logged).contains(&"unlogged_exception_handler"));
}

#[test]
fn api_key_read_in_an_else_branch_is_unvalidated() {
    let guarded = scan("if role == \"admin\":\n    k = request.headers.get(\"api_key\")\n");
    assert!(!ids(&guarded).contains(&"unvalidated_api_key"));

    let otherwise = scan("if role == \"admin\":\n    pass\nelse:\n    k = request.headers.get(\"api_key\")\n");
    let hit = otherwise.iter().find(|d| d.rule_id == "unvalidated_api_key").expect("else branch");
    assert_eq!(hit.loc.line, 4);
}

const FLASK_VIEW: &str = r#"
from flask import jsonify, request
from flask_login import login_required

@login_required
def dashboard():
    page = request.args.get("page")
    return jsonify({"data": page})

@login_required
def admin():
    if current_user.username != "ADMIN":
        abort(403)
    return jsonify({"status": "success"})
"#;

#[test]
fn flask_view_checks() {
    let diags = scan(FLASK_VIEW);
    let in_fn = |id: &str, func: &str| diags.iter().any(|d| d.rule_id == id && d.function.as_deref() == Some(func));

    assert!(in_fn("unchecked_login_required", "dashboard"));
    assert!(in_fn("unvalidated_query_parameter", "dashboard"));
    assert!(in_fn("insecure_json_response", "dashboard"));

    assert!(!in_fn("unchecked_login_required", "admin"));
    assert!(!in_fn("insecure_json_response", "admin"));
}

#[test]
fn f_string_password_is_a_secret() {
    let diags = scan("def connect(prefix):\n    password = f\"{prefix}abc\"\n");
    let hit = diags.iter().find(|d| d.rule_id == "hardcoded_secret").expect("f-string password");
    assert_eq!(hit.message, "has a hardcoded password (using an f-string)");
}
