pub mod check;
pub mod lines;
pub mod watch;

use tether_lang::{HeaderRewriteRule, RuleSet, policy_lines};

use crate::style;

/// Render the canonical rule listing with colored effects.
pub(crate) fn render_lines(rules: &RuleSet, http: &[HeaderRewriteRule]) -> Vec<String> {
    policy_lines(rules, http)
        .into_iter()
        .map(|line| match line.split_once(' ') {
            Some((effect, rest)) => format!("{} {}", style::effect(effect), rest),
            None => line,
        })
        .collect()
}

pub(crate) fn print_lines(rules: &RuleSet, http: &[HeaderRewriteRule]) {
    let lines = render_lines(rules, http);
    if lines.is_empty() {
        println!("  {}", style::dim("(no rules)"));
    }
    for line in lines {
        println!("  {line}");
    }
}
