//! TTY-aware color and styling helpers for human-friendly CLI output.
//!
//! Built on the [`console`] crate which automatically detects whether
//! stdout/stderr is a terminal and respects the `NO_COLOR` environment
//! variable (<https://no-color.org/>).

use console::Style;

/// A `Style` targeting **stdout** (auto-detects TTY + NO_COLOR).
fn out() -> Style {
    Style::new()
}

/// A `Style` targeting **stderr** (auto-detects TTY + NO_COLOR).
fn err() -> Style {
    Style::new().for_stderr()
}

/// Dim / muted text (for secondary information).
pub fn dim(text: &str) -> String {
    out().dim().apply_to(text).to_string()
}

/// Bold cyan – section headers.
pub fn header(text: &str) -> String {
    out().cyan().bold().apply_to(text).to_string()
}

/// Green – allow / success.
pub fn green(text: &str) -> String {
    out().green().apply_to(text).to_string()
}

/// Red – deny.
pub fn red(text: &str) -> String {
    out().red().apply_to(text).to_string()
}

/// Bold red on stderr.
pub fn err_red_bold(text: &str) -> String {
    err().red().bold().apply_to(text).to_string()
}

/// Dim on stderr.
pub fn err_dim(text: &str) -> String {
    err().dim().apply_to(text).to_string()
}

/// Bold cyan on stderr (hints).
pub fn err_cyan_bold(text: &str) -> String {
    err().cyan().bold().apply_to(text).to_string()
}

/// Colorize a rule effect (allow/deny).
pub fn effect(effect: &str) -> String {
    match effect.to_lowercase().as_str() {
        "allow" => green(effect),
        "deny" => red(effect),
        _ => effect.to_string(),
    }
}
