use std::path::Path;

use anyhow::{Context, Result};
use tether_lang::{HeaderRewriteRule, RuleSet};
use tracing::{Level, instrument};

use crate::policy::{PolicyManager, load_file};

/// Merge `rules` over the compiled file and return the active rules.
pub fn active_rules(
    file: &Path,
    rules: &[String],
    runtime_only: bool,
) -> Result<(RuleSet, Vec<HeaderRewriteRule>)> {
    let config = load_file(file)?;
    let manager = PolicyManager::new(
        |_: &RuleSet| -> anyhow::Result<()> { Ok(()) },
        |_: &RuleSet, _: &[HeaderRewriteRule]| {},
    );

    let (file_rules, http) = config.into_parts();
    manager.update_file_layer(file_rules, http)?;
    for rule in rules {
        manager
            .add_runtime_rule(rule)
            .with_context(|| format!("invalid --rule {rule:?}"))?;
    }
    manager.set_runtime_only(runtime_only)?;
    Ok(manager.get_active_rules())
}

#[instrument(level = Level::TRACE)]
pub fn run(file: &Path, rules: &[String], runtime_only: bool) -> Result<()> {
    let (active, http) = active_rules(file, rules, runtime_only)?;
    super::print_lines(&active, &http);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_lang::policy_lines;

    #[test]
    fn runtime_rules_merge_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.cedar");
        std::fs::write(
            &path,
            r#"permit (principal, action == Action::"NetworkConnect", resource == Host::"github.com");"#,
        )
        .unwrap();

        let rules = vec!["deny net.send *".to_string()];
        let (active, http) = active_rules(&path, &rules, false).unwrap();
        assert_eq!(active.connect[0].to_string(), "deny net.send *");
        assert_eq!(
            policy_lines(&active, &http),
            ["allow net.send github.com", "deny net.send *"]
        );

        let (active, _) = active_rules(&path, &rules, true).unwrap();
        assert_eq!(active.connect.len(), 1);
        assert_eq!(active.connect[0].to_string(), "deny net.send *");
    }

    #[test]
    fn bad_runtime_rule_names_the_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.cedar");
        std::fs::write(&path, "").unwrap();
        let err = active_rules(&path, &["nonsense".to_string()], false).unwrap_err();
        assert!(err.to_string().contains("--rule"));
    }
}
