//! Location-aware compile errors.
//!
//! A [`Diagnostic`] is what operators see when a policy fails to compile: the
//! offending line, a caret under the column, and a remediation hint. It is
//! built from whatever error the front-end returned, relying only on an
//! optional `at <file>:<line>:<column>` locator in the error text.

use std::error::Error;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::Serialize;

/// Classification of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticCode {
    /// An enforceability check rejected the policy.
    Lint,
    /// Syntax or semantic error in the policy language.
    Parse,
    /// The policy file could not be read or stat'ed.
    Io,
    /// Required configuration is missing.
    Config,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::Lint => "lint",
            DiagnosticCode::Parse => "parse",
            DiagnosticCode::Io => "io",
            DiagnosticCode::Config => "config",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured compile error.
///
/// Serializes to the management API's error body: `message` (the summary),
/// `file`, `line`, `column`, `snippet`, `caretStart`, `caretEnd`, `code`,
/// `suggestion`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    #[serde(rename = "message")]
    pub summary: String,
    /// Root error text without its location suffix.
    #[serde(skip)]
    pub message: String,
    pub file: String,
    /// 1-based; 0 when unknown.
    pub line: usize,
    /// 1-based; 0 when unknown.
    pub column: usize,
    /// The full text of `line`, or empty.
    pub snippet: String,
    pub caret_start: usize,
    pub caret_end: usize,
    pub code: DiagnosticCode,
    pub suggestion: String,
    #[serde(skip)]
    pub cause: Option<Arc<dyn Error + Send + Sync>>,
}

fn location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bat\s+(.+?):(\d+):(\d+)").expect("location pattern is valid"))
}

impl Diagnostic {
    /// Reduce a front-end error to a diagnostic against `source`.
    ///
    /// `name` is the compile name (usually the file path); it stands in for
    /// the file when the error names none or names `<input>`.
    pub fn from_frontend(err: Box<dyn Error + Send + Sync>, name: &str, source: &str) -> Self {
        let full = err.to_string();
        let mut root: &(dyn Error + 'static) = err.as_ref();
        while let Some(next) = root.source() {
            root = next;
        }
        let root_text = root.to_string();
        let raw = if root_text.trim().is_empty() {
            full.trim()
        } else {
            root_text.trim()
        };

        let name = name.trim();
        let mut file = name.to_string();
        let (mut line, mut column) = (0, 0);
        if let Some(caps) = location_re().captures(&full) {
            let found = caps[1].trim();
            if !found.is_empty() {
                file = found.to_string();
            }
            line = caps[2].parse().unwrap_or(0);
            column = caps[3].parse().unwrap_or(0);
        }
        if file.is_empty() || file == "<input>" {
            file = name.to_string();
        }
        if file.is_empty() {
            file = "<input>".into();
        }

        let message = strip_location(raw);
        let snippet = extract_line(source, line);
        let (caret_start, caret_end) = caret_range(&snippet, column);

        Diagnostic {
            summary: build_summary(&message),
            suggestion: suggest_fix(&message).to_string(),
            code: classify(&message),
            message,
            file,
            line,
            column,
            snippet,
            caret_start,
            caret_end,
            cause: Some(Arc::from(err)),
        }
    }

    /// The policy file could not be read or stat'ed.
    pub fn io(path: &Path, summary: &str, err: std::io::Error) -> Self {
        Diagnostic {
            summary: summary.to_string(),
            message: format!("{summary} {}: {err}", path.display()),
            file: path.display().to_string(),
            line: 0,
            column: 0,
            snippet: String::new(),
            caret_start: 1,
            caret_end: 1,
            code: DiagnosticCode::Io,
            suggestion: "Ensure the policy file exists and is readable by the tether process.".into(),
            cause: Some(Arc::new(err)),
        }
    }

    /// Required configuration is missing.
    pub fn config(summary: &str, message: &str, suggestion: &str) -> Self {
        Diagnostic {
            summary: summary.to_string(),
            message: message.to_string(),
            file: String::new(),
            line: 0,
            column: 0,
            snippet: String::new(),
            caret_start: 1,
            caret_end: 1,
            code: DiagnosticCode::Config,
            suggestion: suggestion.to_string(),
            cause: None,
        }
    }

    /// Render for a terminal or log:
    ///
    /// ```text
    /// error: invalid policy
    /// file: policy.cedar:2:35
    /// 2 | when { resource in [ Host::"x" ] }
    ///   |                                   ^ ParseError: expected ';', found end of input
    /// hint: Review the policy syntax near the highlighted column and correct the statement.
    /// ```
    pub fn render_cli(&self) -> String {
        let mut out = String::from("error: invalid policy\n");
        if !self.file.is_empty() {
            let line = self.line.max(1);
            let col = [self.column, self.caret_start, 1]
                .into_iter()
                .find(|c| *c > 0)
                .unwrap_or(1);
            out.push_str(&format!("file: {}:{line}:{col}\n", self.file));
        }
        if !self.snippet.is_empty() && self.line > 0 {
            out.push_str(&format!("{} | {}\n", self.line, self.snippet));
            let caret = [self.caret_start, self.column, 1]
                .into_iter()
                .find(|c| *c > 0)
                .unwrap_or(1);
            out.push_str(&format!("   | {}^", " ".repeat(caret - 1)));
            let msg = self.message.trim();
            if !msg.is_empty() {
                out.push(' ');
                out.push_str(msg);
            }
            out.push('\n');
        }
        let hint = self.suggestion.trim();
        if !hint.is_empty() {
            out.push_str(&format!("hint: {hint}\n"));
        }
        out.trim().to_string()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(&self.summary)
        } else {
            f.write_str(&self.message)
        }
    }
}

impl Error for Diagnostic {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

/// Remove the first `at <file>:<line>:<col>` locator from an error message.
fn strip_location(message: &str) -> String {
    match location_re().find(message) {
        Some(m) => {
            let mut out = message[..m.start()].trim_end().to_string();
            out.push_str(&message[m.end()..]);
            out.trim().to_string()
        }
        None => message.trim().to_string(),
    }
}

/// Text of 1-based `line` without its terminator, or empty when out of range.
fn extract_line(source: &str, line: usize) -> String {
    if line == 0 {
        return String::new();
    }
    source
        .split('\n')
        .nth(line - 1)
        .map(|l| l.trim_end_matches(['\r', '\n']).to_string())
        .unwrap_or_default()
}

/// Caret position for a 1-based character column, clamped to one past the
/// end of the snippet.
fn caret_range(snippet: &str, column: usize) -> (usize, usize) {
    if column == 0 {
        return (1, 1);
    }
    let chars = snippet.chars().count();
    if column <= chars {
        (column, column)
    } else {
        (chars + 1, chars + 1)
    }
}

const SUMMARY_MAX: usize = 160;

fn build_summary(message: &str) -> String {
    let msg = message.trim();
    if msg.is_empty() {
        return "invalid policy".into();
    }
    if let Some((prefix, detail)) = msg.split_once(':') {
        let (prefix, detail) = (prefix.trim(), detail.trim());
        if !prefix.is_empty() && !detail.is_empty() && prefix.to_lowercase().ends_with("error") {
            return format!("{prefix}: {detail}");
        }
    }
    msg.chars().take(SUMMARY_MAX).collect()
}

fn suggest_fix(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    if lower.contains("want ,") || lower.contains("expected ','") {
        "Add a comma between parameters or statements at the highlighted position."
    } else if lower.contains("expected ';'") {
        "Terminate each policy statement with ';'."
    } else if lower.contains("unexpected token") && lower.contains("permit") {
        "Review the permit statement syntax and ensure parentheses and commas are balanced."
    } else if lower.contains("unknown entity type") {
        "Verify the entity type name is correct (e.g. Dir::\"/path/\" or Host::\"example.com\")."
    } else if lower.contains("unknown action") {
        "Confirm the action name uses the Action entity with PascalCase (e.g. Action::\"ProcessExec\")."
    } else if lower.contains("undeclared identifier") {
        "Declare the identifier before using it or correct the spelling."
    } else {
        "Review the policy syntax near the highlighted column and correct the statement."
    }
}

fn classify(message: &str) -> DiagnosticCode {
    if message.to_lowercase().contains("lint") {
        DiagnosticCode::Lint
    } else {
        DiagnosticCode::Parse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diag(err: &str, name: &str, source: &str) -> Diagnostic {
        Diagnostic::from_frontend(err.into(), name, source)
    }

    #[test]
    fn extracts_location_and_snippet() {
        let src = "permit (principal, action, resource)\nwhen { true }";
        let d = diag(
            "ParseError: expected ';', found end of input at policy.cedar:2:14",
            "policy.cedar",
            src,
        );
        assert_eq!(d.file, "policy.cedar");
        assert_eq!((d.line, d.column), (2, 14));
        assert_eq!(d.snippet, "when { true }");
        assert_eq!((d.caret_start, d.caret_end), (14, 14));
        assert_eq!(d.message, "ParseError: expected ';', found end of input");
        assert_eq!(d.summary, "ParseError: expected ';', found end of input");
        assert_eq!(d.code, DiagnosticCode::Parse);
    }

    #[test]
    fn missing_locator_falls_back_to_name() {
        let d = diag("something broke", "p.cedar", "x");
        assert_eq!(d.file, "p.cedar");
        assert_eq!((d.line, d.column), (0, 0));
        assert_eq!(d.snippet, "");
        assert_eq!((d.caret_start, d.caret_end), (1, 1));
        assert_eq!(d.summary, "something broke");
    }

    #[test]
    fn input_placeholder_uses_compile_name() {
        let d = diag("ParseError: bad at <input>:1:1", "", "x");
        assert_eq!(d.file, "<input>");
        let d = diag("ParseError: bad at <input>:1:1", "real.cedar", "x");
        assert_eq!(d.file, "real.cedar");
    }

    #[test]
    fn word_ending_in_at_is_not_a_locator() {
        let d = diag(
            "ParseError: flat list at f.cedar:1:3",
            "f.cedar",
            "abcdef",
        );
        assert_eq!(d.file, "f.cedar");
        assert_eq!(d.message, "ParseError: flat list");
    }

    #[test]
    fn outermost_locator_wins() {
        let src = "line one\nline two\nline three";
        let d = diag(
            "LintError: bad include at outer.cedar:2:3 (caused by ParseError: x at inner.cedar:3:1)",
            "outer.cedar",
            src,
        );
        assert_eq!(d.file, "outer.cedar");
        assert_eq!((d.line, d.column), (2, 3));
        assert_eq!(d.snippet, "line two");
    }

    #[test]
    fn caret_clamps_past_end_of_line() {
        let d = diag("ParseError: x at f:1:40", "f", "short");
        assert_eq!((d.caret_start, d.caret_end), (6, 6));
        assert_eq!(d.column, 40);
    }

    #[test]
    fn caret_counts_characters() {
        assert_eq!(caret_range("héllo", 3), (3, 3));
        assert_eq!(caret_range("héllo", 9), (6, 6));
        assert_eq!(caret_range("", 1), (1, 1));
    }

    #[test]
    fn summary_truncates_long_messages() {
        let long = "x".repeat(400);
        let d = diag(&long, "f", "");
        assert_eq!(d.summary.len(), SUMMARY_MAX);
        assert_eq!(d.message.len(), 400);
    }

    #[test]
    fn lint_errors_classify_as_lint() {
        let d = diag("LintError: unknown action \"Fly\" at f:1:30", "f", "");
        assert_eq!(d.code, DiagnosticCode::Lint);
        assert_eq!(
            d.suggestion,
            "Confirm the action name uses the Action entity with PascalCase (e.g. Action::\"ProcessExec\")."
        );
    }

    #[test]
    fn suggestion_table() {
        assert!(suggest_fix("expected ',', found 'x'").starts_with("Add a comma"));
        assert!(suggest_fix("unknown entity type Foo").starts_with("Verify the entity type"));
        assert!(suggest_fix("undeclared identifier z").starts_with("Declare the identifier"));
        assert!(suggest_fix("mystery").starts_with("Review the policy syntax"));
    }

    #[test]
    fn render_cli_shape() {
        let src = "permit (principal, action, resource)\nwhen { true }";
        let d = diag("ParseError: expected ';' at p.cedar:2:14", "p.cedar", src);
        let expected = format!(
            "error: invalid policy\nfile: p.cedar:2:14\n2 | when {{ true }}\n   | {}^ ParseError: expected ';'\nhint: Terminate each policy statement with ';'.",
            " ".repeat(13)
        );
        assert_eq!(d.render_cli(), expected);
    }

    #[test]
    fn render_cli_without_snippet() {
        let d = Diagnostic::config("missing policy file path", "no policy file path provided", "");
        assert_eq!(d.render_cli(), "error: invalid policy");

        let d = diag("boom", "p.cedar", "");
        assert_eq!(
            d.render_cli(),
            "error: invalid policy\nfile: p.cedar:1:1\nhint: Review the policy syntax near the highlighted column and correct the statement."
        );
    }

    #[test]
    fn serializes_api_error_body() {
        let d = diag("ParseError: bad at p:1:2", "p", "abc");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["message"], "ParseError: bad");
        assert_eq!(json["caretStart"], 2);
        assert_eq!(json["code"], "parse");
        assert!(json.get("cause").is_none());
    }

    #[test]
    fn exposes_cause_as_source() {
        let d = diag("ParseError: bad at p:1:2", "p", "abc");
        assert_eq!(d.source().unwrap().to_string(), "ParseError: bad at p:1:2");
        assert_eq!(d.to_string(), "ParseError: bad");
    }
}
