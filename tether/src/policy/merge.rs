//! Layer merge: file layer + runtime layer → active rule set.
//!
//! The merge is a pure function of its inputs. Precedence:
//!
//! - runtime rules come before file rules in every collection, so a runtime
//!   duplicate shadows the file copy;
//! - connect rules are globally reordered deny-before-allow, so any
//!   first-match evaluator meets a deny before a conflicting allow;
//! - an explicit runtime default wins; a runtime implicit allow raises the
//!   default to allow; otherwise the file default stands.

use std::collections::HashSet;

use tether_lang::{AccessRule, Effect, HeaderRewriteRule, RuleSet, ToolRule};

/// One rule source: the compiled file or the runtime API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layer {
    pub rules: RuleSet,
    pub http: Vec<HeaderRewriteRule>,
}

impl Layer {
    pub fn new(rules: RuleSet, http: Vec<HeaderRewriteRule>) -> Self {
        Self { rules, http }
    }
}

fn dedup_access<'a>(rules: impl IntoIterator<Item = &'a AccessRule>) -> Vec<AccessRule> {
    let mut seen = HashSet::new();
    rules
        .into_iter()
        .filter(|r| seen.insert(r.to_string()))
        .cloned()
        .collect()
}

fn deny_first(rules: Vec<AccessRule>) -> Vec<AccessRule> {
    let (mut deny, allow): (Vec<_>, Vec<_>) =
        rules.into_iter().partition(|r| r.effect == Effect::Deny);
    deny.extend(allow);
    deny
}

fn dedup_tools<'a>(rules: impl IntoIterator<Item = &'a ToolRule>) -> Vec<ToolRule> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for rule in rules {
        if seen.insert(rule.key()) {
            out.push(rule.clone());
        }
    }
    out
}

/// True when a runtime layer with no explicit default raises the connect
/// default over a file that explicitly denies unmatched connections.
pub fn raises_explicit_file_deny(file: &Layer, runtime: &Layer, runtime_only: bool) -> bool {
    let (fr, rt) = (&file.rules, &runtime.rules);
    !runtime_only
        && !rt.connect_default_explicit
        && rt.connect_default_allow
        && fr.connect_default_explicit
        && !fr.connect_default_allow
}

/// Compute the active rule set.
///
/// With `runtime_only`, the file layer is ignored entirely; the runtime layer
/// is still deduplicated and its connect rules ordered deny-first.
pub fn merge_layers(file: &Layer, runtime: &Layer, runtime_only: bool) -> Layer {
    let rt = &runtime.rules;
    if runtime_only {
        let rules = RuleSet {
            open: dedup_access(&rt.open),
            exec: dedup_access(&rt.exec),
            connect: deny_first(dedup_access(&rt.connect)),
            tools: dedup_tools(&rt.tools),
            connect_default_allow: rt.connect_default_allow,
            connect_default_explicit: rt.connect_default_explicit,
        };
        return Layer::new(rules, runtime.http.clone());
    }

    let fr = &file.rules;
    let (connect_default_allow, connect_default_explicit) = if rt.connect_default_explicit {
        (rt.connect_default_allow, true)
    } else if rt.connect_default_allow {
        (true, fr.connect_default_explicit)
    } else {
        (fr.connect_default_allow, fr.connect_default_explicit)
    };

    let rules = RuleSet {
        open: dedup_access(rt.open.iter().chain(&fr.open)),
        exec: dedup_access(rt.exec.iter().chain(&fr.exec)),
        connect: deny_first(dedup_access(rt.connect.iter().chain(&fr.connect))),
        tools: dedup_tools(rt.tools.iter().chain(&fr.tools)),
        connect_default_allow,
        connect_default_explicit,
    };
    let http = file.http.iter().chain(&runtime.http).cloned().collect();
    Layer::new(rules, http)
}
