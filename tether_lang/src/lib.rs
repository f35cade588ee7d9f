//! Policy language front-end and compiled rule model for tether.
//!
//! Policies are written in a Cedar-style allow/deny language:
//!
//! ```text
//! @id("tools")
//! permit (principal, action in [Action::"FileOpenReadOnly", Action::"ProcessExec"], resource)
//! when { resource in [ Dir::"/usr/bin/", File::"/etc/hosts" ] };
//!
//! forbid (principal, action == Action::"NetworkConnect", resource == Host::"*");
//! ```
//!
//! [`transpile`] turns source text into a [`RuleSet`] plus header-rewrite
//! rules. Errors carry an `at <file>:<line>:<column>` locator in their text.

pub mod ast;
pub mod error;
pub mod lexer;
pub mod lint;
pub mod parse;
pub mod rules;
mod transpile;

use tracing::warn;

pub use error::{RuleParseError, TranspileError};
pub use lint::{LintFinding, Severity};
pub use rules::{
    AccessRule, Effect, HeaderRewriteRule, Operation, RuleSet, RuntimeRule, Target, ToolRule,
    policy_lines,
};

fn display_name(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        "<input>".into()
    } else {
        name.to_string()
    }
}

fn parse_source(name: &str, source: &str) -> Result<Vec<ast::Policy>, TranspileError> {
    parse::parse(source).map_err(|e| {
        let (line, column) = lexer::line_col(source, e.offset);
        TranspileError::Parse {
            message: e.message,
            file: display_name(name),
            line,
            column,
        }
    })
}

/// Parse and lint `source`, returning every finding (errors and warnings).
pub fn lint(name: &str, source: &str) -> Result<Vec<LintFinding>, TranspileError> {
    let policies = parse_source(name, source)?;
    Ok(policies
        .iter()
        .flat_map(|p| lint::lint_policy(source, p))
        .collect())
}

/// Compile policy source into enforceable rules.
///
/// `name` is used only for error locations (usually the file path). The first
/// lint error fails the whole compile; lint warnings are logged.
pub fn transpile(
    name: &str,
    source: &str,
) -> Result<(RuleSet, Vec<HeaderRewriteRule>), TranspileError> {
    let policies = parse_source(name, source)?;
    let file = display_name(name);

    let mut rules = RuleSet::default();
    let mut http = Vec::new();
    for policy in &policies {
        for finding in lint::lint_policy(source, policy) {
            match finding.severity {
                Severity::Error => {
                    return Err(TranspileError::Lint {
                        code: finding.code,
                        message: finding.message,
                        suggestion: finding.suggestion,
                        file,
                        line: finding.line,
                        column: finding.column,
                    });
                }
                Severity::Warning => warn!(
                    file = %file,
                    policy = %finding.policy_id,
                    code = finding.code,
                    "{} ({}:{})",
                    finding.message,
                    finding.line,
                    finding.column
                ),
            }
        }

        transpile::lower_policy(policy, &mut rules, &mut http).map_err(|e| {
            let (line, column) = lexer::line_col(source, e.span.start);
            TranspileError::Lint {
                code: "invalid_target",
                message: e.error.to_string(),
                suggestion: e.error.help(),
                file: file.clone(),
                line,
                column,
            }
        })?;
    }

    transpile::apply_connect_defaults(&mut rules);
    Ok((rules, http))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transpile_full_policy() {
        let src = r#"
// Tools the agent may run.
permit (principal, action == Action::"ProcessExec", resource)
when { resource in [ File::"/usr/bin/git", Dir::"/usr/local/bin/" ] };

forbid (principal, action == Action::"NetworkConnect", resource in [Host::"*"]);
permit (principal, action == Action::"NetworkConnect", resource in [Host::"github.com:443"]);
"#;
        let (rules, http) = transpile("policy.cedar", src).unwrap();
        assert!(http.is_empty());
        assert_eq!(rules.exec.len(), 2);
        assert_eq!(rules.connect.len(), 2);
        assert!(rules.connect_default_explicit);
        assert!(!rules.connect_default_allow);
    }

    #[test]
    fn transpile_is_deterministic() {
        let src = r#"permit (principal, action in [Action::"FileOpen", Action::"FileOpenReadOnly"], resource in [File::"/a", File::"/b"]);"#;
        assert_eq!(transpile("p", src).unwrap(), transpile("p", src).unwrap());
    }

    #[test]
    fn parse_error_carries_locator() {
        let src = "permit (principal, action == Action::\"NetworkConnect\", resource)\nwhen { resource in [ Host::\"x\" ] }";
        let err = transpile("policy.cedar", src).unwrap_err();
        assert_eq!(err.location(), (2, 35));
        assert_eq!(
            err.to_string(),
            "ParseError: expected ';', found end of input at policy.cedar:2:35"
        );
    }

    #[test]
    fn lint_error_fails_compile() {
        let src = "permit (principal, action == Action::\"FileOpen\", resource == Host::\"x.com\");";
        let err = transpile("", src).unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("LintError: Host cannot be used"), "{text}");
        assert!(text.ends_with("at <input>:1:62"), "{text}");
    }

    #[test]
    fn lint_warnings_do_not_fail_compile() {
        let src = r#"permit (principal, action == Action::"FileOpen", resource == Dir::"/tmp");"#;
        let (rules, _) = transpile("p", src).unwrap();
        assert_eq!(rules.open[0].to_string(), "allow file.open /tmp/");
        let findings = lint("p", src).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warning);
    }

    #[test]
    fn invalid_target_surfaces_as_lint_error() {
        let long = "a".repeat(300);
        let src = format!(
            r#"permit (principal, action == Action::"FileOpen", resource == File::"/{long}");"#
        );
        let err = transpile("p", &src).unwrap_err();
        assert!(matches!(err, TranspileError::Lint { code: "path_too_long", .. }));
    }
}
