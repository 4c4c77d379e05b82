use crate::errors::{AuditError, AuditResult};
use crate::lower::lower;
use crate::node::Node;
use crate::registry::RuleRegistry;
use crate::report::Diagnostic;
use crate::utils::ext::lowercase_ext;
use std::cell::RefCell;
use std::path::Path;
use tree_sitter::Language;

thread_local! {
    static PARSER: RefCell<tree_sitter::Parser> = RefCell::new(tree_sitter::Parser::new());
}

/// Parse Python source into the node model. The code is never imported or
/// executed.
pub fn parse_python(bytes: &[u8]) -> AuditResult<Node> {
    let src = std::str::from_utf8(bytes)
        .map_err(|e| AuditError::Input(format!("source is not UTF-8: {e}")))?;

    let tree = PARSER.with(|cell| {
        let mut parser = cell.borrow_mut();
        parser.set_language(&Language::from(tree_sitter_python::LANGUAGE))?;
        parser
            .parse(src, None)
            .ok_or_else(|| AuditError::Other("tree-sitter failed".into()))
    })?;
    lower(&tree, src)
}

/// Parse and scan one in-memory source.
pub fn scan_source(bytes: &[u8], registry: &RuleRegistry) -> AuditResult<Vec<Diagnostic>> {
    let root = parse_python(bytes)?;
    registry.scan(&root)
}

/// Diagnostics for one file, in traversal order. Files that are not Python
/// or look binary yield nothing.
pub fn run_rules_on_file(path: &Path, registry: &RuleRegistry) -> AuditResult<Vec<Diagnostic>> {
    if lowercase_ext(path).is_none() {
        return Ok(vec![]);
    }

    tracing::debug!("Running rules on: {}", path.display());
    let bytes = std::fs::read(path)?;

    // Fast binary-file guard (skip if >1% NULs)
    if bytes.iter().filter(|b| **b == 0).count() * 100 / bytes.len().max(1) > 1 {
        tracing::debug!("skipping binary file {}", path.display());
        return Ok(vec![]);
    }

    scan_source(&bytes, registry)
}

#[cfg(test)]
fn registry() -> RuleRegistry {
    crate::patterns::build(&crate::patterns::RuleSetConfig::default()).unwrap()
}

#[test]
fn unknown_extension_returns_empty() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("notes.txt");
    std::fs::write(&file, "import hashlib\nhashlib.md5(b'x')\n").unwrap();

    assert!(run_rules_on_file(&file, &registry()).unwrap().is_empty());
}

#[test]
fn binary_file_guard_triggers() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("blob.py");
    let mut bytes = b"eval('x')\n".to_vec();
    bytes.extend(std::iter::repeat_n(0u8, 64));
    std::fs::write(&file, bytes).unwrap();

    assert!(run_rules_on_file(&file, &registry()).unwrap().is_empty());
}

#[test]
fn python_file_is_parsed_and_scanned() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("app.py");
    std::fs::write(&file, "import hashlib\n\ndef digest(data):\n    return hashlib.md5(data)\n").unwrap();

    let diags = run_rules_on_file(&file, &registry()).unwrap();
    let hash = diags.iter().find(|d| d.rule_id == "insecure_hash").expect("md5 is reported");
    assert_eq!(hash.loc.line, 4);
    assert_eq!(hash.function.as_deref(), Some("digest"));
}

#[test]
fn syntax_errors_surface_as_parse_errors() {
    let err = scan_source(b"def broken(:\n", &registry()).unwrap_err();
    assert!(matches!(err, AuditError::Parse { .. }));

    let err = parse_python(&[0xff, 0xfe]).unwrap_err();
    assert!(matches!(err, AuditError::Input(_)));
}
