use std::path::Path;

use anyhow::Result;
use serde_json::json;
use tether_lang::policy_lines;
use tracing::{Level, instrument};

use crate::policy::load_file;
use crate::style;

/// Compile a policy file. On failure the diagnostic becomes the error, so
/// the caller renders it and exits non-zero.
#[instrument(level = Level::TRACE)]
pub fn run(file: &Path, json: bool) -> Result<()> {
    let config = match load_file(file) {
        Ok(config) => config,
        Err(diagnostic) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&diagnostic)?);
            }
            return Err(diagnostic.into());
        }
    };

    if json {
        let out = json!({
            "file": file.display().to_string(),
            "rules": config.rules(),
            "httpRules": config.http_rules(),
            "lines": policy_lines(config.rules(), config.http_rules()),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{}", style::header(&file.display().to_string()));
    super::print_lines(config.rules(), config.http_rules());
    println!(
        "\n{} {} rules, {} header rewrites",
        style::green("ok"),
        config.rules().len(),
        config.http_rules().len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Diagnostic, DiagnosticCode};

    #[test]
    fn check_reports_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.cedar");
        std::fs::write(&path, "permit (principal, action resource);").unwrap();

        let err = run(&path, false).unwrap_err();
        let d = err.downcast_ref::<Diagnostic>().unwrap();
        assert_eq!(d.code, DiagnosticCode::Parse);
        assert_eq!(d.line, 1);
    }

    #[test]
    fn check_accepts_valid_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.cedar");
        std::fs::write(
            &path,
            r#"forbid (principal, action == Action::"NetworkConnect", resource == Host::"*");"#,
        )
        .unwrap();
        assert!(run(&path, true).is_ok());
    }
}
