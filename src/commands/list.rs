use astguard::errors::AuditResult;
use astguard::patterns::{CATALOG, RuleMeta};
use astguard::registry::RuleRegistry;
use console::style;

/// Catalog entry as installed: the registry carries severity overrides.
fn installed<'r>(registry: &'r RuleRegistry, meta: &RuleMeta) -> Option<&'r RuleMeta> {
    registry
        .rules()
        .iter()
        .map(|r| r.meta())
        .find(|m| m.id == meta.id)
}

pub fn handle(verbose: bool, registry: &RuleRegistry) -> AuditResult<()> {
    println!("{}", style("Rules").blue().bold().underlined());

    for meta in CATALOG.iter() {
        match installed(registry, meta) {
            Some(active) => println!("  {:32} {}", style(active.id).white().bold(), active.severity),
            None => println!("  {:32} {}", style(meta.id).dim(), style("disabled").dim()),
        }

        if verbose {
            println!("    {:10} {}", style("About"), meta.description);
            println!("    {:10} {}", style("Message"), style(meta.message).italic());
        }
    }

    println!(
        "\n{} of {} rules installed",
        style(registry.len()).bold(),
        CATALOG.len()
    );
    Ok(())
}

#[test]
fn disabled_rules_are_not_installed() {
    let mut cfg = astguard::patterns::RuleSetConfig::default();
    cfg.disabled.push("assert_used".into());
    let registry = astguard::patterns::build(&cfg).unwrap();

    let assert_used = CATALOG.iter().find(|m| m.id == "assert_used").unwrap();
    let hash = CATALOG.iter().find(|m| m.id == "insecure_hash").unwrap();
    assert!(installed(&registry, assert_used).is_none());
    assert!(installed(&registry, hash).is_some());
    assert!(handle(true, &registry).is_ok());
}
