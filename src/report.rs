use crate::node::Location;
use crate::patterns::Severity;
use std::fmt;

/// One finding. Never mutated after it is recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub rule_id: &'static str,
    pub severity: Severity,
    pub message: String,
    pub loc: Location,
    /// Enclosing function, if the finding sits inside one.
    pub function: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.severity.label())?;
        if let Some(func) = &self.function {
            write!(f, "{func} ")?;
        }
        write!(f, "{} ({})", self.message, self.loc)
    }
}

/// Append-only sink for one scan.
#[derive(Debug, Default)]
pub struct Reporter {
    diags: Vec<Diagnostic>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, diag: Diagnostic) {
        self.diags.push(diag);
    }

    pub fn results(&self) -> &[Diagnostic] {
        &self.diags
    }

    pub fn into_results(self) -> Vec<Diagnostic> {
        self.diags
    }
}

#[cfg(test)]
fn diag(id: &'static str, line: usize) -> Diagnostic {
    Diagnostic {
        rule_id: id,
        severity: Severity::Medium,
        message: "uses an insecure hash function".into(),
        loc: Location::new(line, 5),
        function: Some("login".into()),
    }
}

#[test]
fn reporter_keeps_insertion_order_and_duplicates() {
    let mut r = Reporter::new();
    r.record(diag("b", 2));
    r.record(diag("a", 1));
    r.record(diag("a", 1));

    let ids: Vec<_> = r.results().iter().map(|d| d.rule_id).collect();
    assert_eq!(ids, vec!["b", "a", "a"]);
    assert_eq!(r.into_results().len(), 3);
}

#[test]
fn display_uses_the_plain_rendering() {
    assert_eq!(
        diag("insecure_hash", 7).to_string(),
        "MEDIUM: login uses an insecure hash function (7:5)"
    );

    let mut top_level = diag("insecure_hash", 1);
    top_level.function = None;
    assert_eq!(top_level.to_string(), "MEDIUM: uses an insecure hash function (1:5)");
}
