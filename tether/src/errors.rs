//! User-facing error display.
//!
//! Formats anyhow errors with causal chains, colored output, and actionable
//! help hints extracted from domain-specific error types.

use std::io::Write;

use tether_lang::{RuleParseError, TranspileError};

use crate::policy::{Diagnostic, ManagerError};
use crate::settings::SettingsError;
use crate::style;

/// Find a help hint in the first domain error of the chain.
pub fn hint_for(err: &anyhow::Error) -> Option<String> {
    err.chain().find_map(|cause| {
        if let Some(d) = cause.downcast_ref::<Diagnostic>() {
            return Some(d.suggestion.clone()).filter(|s| !s.is_empty());
        }
        if let Some(e) = cause.downcast_ref::<RuleParseError>() {
            return e.help();
        }
        if let Some(e) = cause.downcast_ref::<ManagerError>() {
            return e.help();
        }
        if let Some(e) = cause.downcast_ref::<SettingsError>() {
            return e.help();
        }
        if let Some(TranspileError::Lint { suggestion, .. }) = cause.downcast_ref::<TranspileError>() {
            return suggestion.clone();
        }
        None
    })
}

/// Display a user-facing error to stderr with optional verbose output.
///
/// A compile [`Diagnostic`] at the top of the chain is printed in its
/// source-excerpt form. Anything else prints as:
///
/// ```text
/// error: top-level message
///   caused by: chain item 1
///
///   hint: actionable suggestion (if available)
/// ```
pub fn display_error(err: &anyhow::Error, verbose: bool) {
    let mut stderr = std::io::stderr().lock();

    if let Some(diagnostic) = err.downcast_ref::<Diagnostic>() {
        let _ = writeln!(stderr, "{}", diagnostic.render_cli());
        if verbose {
            let _ = writeln!(stderr, "\nFull error chain:\n{:?}", err);
        }
        return;
    }

    let _ = writeln!(stderr, "{}: {}", style::err_red_bold("error"), err);

    let chain: Vec<_> = err.chain().skip(1).collect();
    if chain.len() == 1 {
        let _ = writeln!(
            stderr,
            "  {}",
            style::err_dim(&format!("caused by: {}", chain[0]))
        );
    } else {
        for (i, cause) in chain.iter().enumerate() {
            let _ = writeln!(
                stderr,
                "  {}",
                style::err_dim(&format!("{}: {}", i + 1, cause))
            );
        }
    }

    if let Some(hint) = hint_for(err) {
        let _ = writeln!(stderr, "\n  {}: {}", style::err_cyan_bold("hint"), hint);
    }

    if verbose {
        let _ = writeln!(stderr, "\nFull error chain:\n{:?}", err);
    } else if !chain.is_empty() {
        let _ = writeln!(
            stderr,
            "\n  {}",
            style::err_dim("run with --verbose for full details")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn hint_from_rule_parse_error_in_chain() {
        let err = "permit net.send a.com"
            .parse::<tether_lang::RuntimeRule>()
            .context("adding runtime rule")
            .unwrap_err();
        assert_eq!(hint_for(&err).as_deref(), Some("valid effects are: allow, deny"));
    }

    #[test]
    fn hint_from_diagnostic() {
        let d = Diagnostic::config("missing policy file path", "no policy file path provided", "Provide it.");
        let err = anyhow::Error::new(d).context("loading policy");
        assert_eq!(hint_for(&err).as_deref(), Some("Provide it."));
    }

    #[test]
    fn no_hint_for_plain_errors() {
        assert!(hint_for(&anyhow::anyhow!("plain")).is_none());
    }
}
