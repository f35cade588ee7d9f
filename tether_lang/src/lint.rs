//! Checks for policy constructs the rule model cannot enforce.
//!
//! Errors fail compilation; warnings are advisory and only logged.

use std::collections::HashSet;
use std::net::Ipv6Addr;

use serde::Serialize;

use crate::ast::{Clause, ConditionKind, Policy, Scope};
use crate::lexer::{Span, line_col};
use crate::rules::{Effect, MAX_HOSTNAME_LEN, MAX_PATH_LEN, Operation};
use crate::transpile::{ActionKind, Resource, actions, resources};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One lint result, located in the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LintFinding {
    pub policy_id: String,
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    pub line: usize,
    pub column: usize,
}

const ACTION_HINT: &str = "Use FileOpen, FileOpenReadOnly, FileOpenReadWrite, ProcessExec, NetworkConnect, HttpRewrite, or McpCall.";
const DNSZONE_HINT: &str = "Add Host::\"zone\" explicitly if the apex should be included.";

struct Linter<'a> {
    source: &'a str,
    policy: &'a Policy,
    findings: Vec<LintFinding>,
    seen: HashSet<(&'static str, String)>,
}

impl<'a> Linter<'a> {
    fn push(
        &mut self,
        severity: Severity,
        span: Span,
        code: &'static str,
        message: String,
        suggestion: Option<&str>,
    ) {
        if !self.seen.insert((code, message.clone())) {
            return;
        }
        let (line, column) = line_col(self.source, span.start);
        self.findings.push(LintFinding {
            policy_id: self.policy.id.clone(),
            severity,
            code,
            message,
            suggestion: suggestion.map(str::to_string),
            line,
            column,
        });
    }

    fn error(&mut self, span: Span, code: &'static str, message: String, suggestion: Option<&str>) {
        self.push(Severity::Error, span, code, message, suggestion);
    }

    fn warn(&mut self, span: Span, code: &'static str, message: String, suggestion: Option<&str>) {
        self.push(Severity::Warning, span, code, message, suggestion);
    }

    fn check_principal(&mut self) {
        if !matches!(self.policy.principal, Scope::Any(_)) {
            self.warn(
                self.policy.principal.span(),
                "unsupported_principal",
                "principal constraints are not enforced; rules apply to the whole sandbox".into(),
                Some("Use bare 'principal' and run separate sandboxes to scope."),
            );
        }
    }

    fn check_actions(&mut self, actions: &[(ActionKind, Span)]) {
        if actions.is_empty() {
            self.error(
                self.policy.action.span(),
                "missing_action",
                "policy omits an explicit action".into(),
                Some(ACTION_HINT),
            );
        }
        for (action, span) in actions {
            match action {
                ActionKind::UnknownId(id) => self.error(
                    *span,
                    "unsupported_action_id",
                    format!("unknown action \"{id}\""),
                    Some(ACTION_HINT),
                ),
                ActionKind::NonCanonical(raw) => self.error(
                    *span,
                    "unsupported_action_syntax",
                    format!("non-canonical action {raw}; only Action::\"…\" is supported"),
                    Some(ACTION_HINT),
                ),
                _ => {}
            }
        }
    }

    fn check_resources(&mut self, actions: &[(ActionKind, Span)], res: &[(Resource, Span)]) {
        let policy = self.policy;
        let has_mcp = actions.iter().any(|(a, _)| *a == ActionKind::McpCall);
        if has_mcp && res.is_empty() {
            self.warn(
                self.policy.span,
                "mcp_no_resources",
                "McpCall policy has no resources; it applies to every server and tool".into(),
                Some("Specify MCP::Server or MCP::Tool resources."),
            );
        } else if res.is_empty() {
            self.error(
                self.policy.resource.span(),
                "no_resources",
                "policy has no enforceable resources".into(),
                Some("Use resource in [ File::\"/path\", Dir::\"/dir/\", Host::\"name[:port]\" ] or context.hostname."),
            );
        }

        for (resource, span) in res {
            match resource {
                Resource::McpServer(_) | Resource::McpTool(_) if !has_mcp => self.error(
                    *span,
                    "mcp_resource_without_mcp_call",
                    "MCP resources require Action::\"McpCall\"".into(),
                    Some("Add Action::\"McpCall\" or remove MCP::Server/MCP::Tool resources."),
                ),
                Resource::IpRange(_) => self.error(
                    *span,
                    "cidr_unsupported",
                    "IpRange/CIDR targets are not supported".into(),
                    None,
                ),
                Resource::Unsupported { type_name } => self.error(
                    *span,
                    "unsupported_resource_type",
                    format!("unknown entity type {type_name}"),
                    Some("Use File, Dir, or Host (Net::DnsZone maps to '*.zone')."),
                ),
                _ => {}
            }
        }

        for entity in policy.resource.entities().iter().chain(
            policy.clauses().flat_map(|(_, c)| match c {
                Clause::ResourceIn(es, _) => es.as_slice(),
                Clause::ResourceEq(e) => std::slice::from_ref(e),
                _ => &[],
            }),
        ) {
            if entity.path.last().is_some_and(|t| t == "DnsZone") {
                self.warn(
                    entity.span,
                    "dnszone_apex_excluded",
                    "Net::DnsZone matches subdomains only; the apex host is not included".into(),
                    Some(DNSZONE_HINT),
                );
            }
        }

        for (action, _) in actions {
            let ActionKind::Op(op) = action else { continue };
            for (resource, span) in res {
                if *op != Operation::Connect {
                    self.check_file_target(resource, *span);
                } else {
                    self.check_connect_target(resource, *span);
                }
            }
        }
    }

    fn check_file_target(&mut self, resource: &Resource, span: Span) {
        match resource {
            Resource::Host(_) => self.error(
                span,
                "resource_mismatch",
                "Host cannot be used with file/exec operations".into(),
                Some("Use File or Dir for file/exec operations."),
            ),
            Resource::File(path) | Resource::Dir(path) => {
                if path.len() > MAX_PATH_LEN {
                    self.error(
                        span,
                        "path_too_long",
                        format!("path length {} exceeds {MAX_PATH_LEN} bytes", path.len()),
                        Some("Shorten the path or target a higher-level directory."),
                    );
                }
                if matches!(resource, Resource::Dir(_)) && !path.ends_with('/') {
                    self.warn(
                        span,
                        "dir_missing_trailing_slash",
                        "directory resources should end with '/'".into(),
                        Some("Append '/' to indicate recursive coverage."),
                    );
                }
            }
            _ => {}
        }
    }

    fn check_connect_target(&mut self, resource: &Resource, span: Span) {
        match resource {
            Resource::File(_) | Resource::Dir(_) => self.error(
                span,
                "resource_mismatch",
                "File/Dir cannot be used with the NetworkConnect action".into(),
                Some("Use Host::\"name\" or Host::\"ip[:port]\"."),
            ),
            Resource::Host(value) => {
                if value.parse::<Ipv6Addr>().is_ok() || value.starts_with('[') {
                    self.error(
                        span,
                        "ipv6_unsupported",
                        format!("IPv6 literal \"{value}\" is not supported in connect rules"),
                        Some("Use an IPv4 address or a hostname."),
                    );
                    return;
                }
                let (host, port) = match value.split_once(':') {
                    Some((h, p)) => (h, Some(p)),
                    None => (value.as_str(), None),
                };
                if host.len() > MAX_HOSTNAME_LEN {
                    self.error(
                        span,
                        "hostname_too_long",
                        format!("hostname length {} exceeds {MAX_HOSTNAME_LEN} bytes", host.len()),
                        Some("Shorten the hostname."),
                    );
                }
                if host.contains('*') && !host.starts_with("*.") && host != "*"
                    || host.starts_with("*.") && host[2..].contains('*')
                {
                    self.error(
                        span,
                        "unsupported_wildcard",
                        format!("unsupported wildcard pattern \"{host}\"; only a '*.domain' prefix is supported"),
                        Some("Use '*.example.com' style or enumerate explicit hosts."),
                    );
                }
                if let Some(port) = port
                    && !matches!(port.parse::<u16>(), Ok(p) if p > 0)
                {
                    self.error(
                        span,
                        "invalid_port",
                        format!("invalid port \"{port}\" (must be 1-65535)"),
                        None,
                    );
                }
            }
            _ => {}
        }
    }

    fn check_conditions(&mut self) {
        let policy = self.policy;
        for condition in &policy.conditions {
            if condition.kind == ConditionKind::Unless {
                self.error(
                    condition.span,
                    "unsupported_unless",
                    "'unless' conditions are not supported".into(),
                    Some("Rewrite the policy using explicit forbid/permit rules."),
                );
            }
        }
        for (_, clause) in policy.clauses() {
            let key = match clause {
                Clause::ContextEq { key, .. } | Clause::ContextLike { key, .. } => key,
                _ => continue,
            };
            let lower = key.trim().to_ascii_lowercase();
            if !matches!(lower.as_str(), "hostname" | "header" | "value") {
                self.error(
                    clause.span(),
                    "unsupported_context_key",
                    format!("context key \"{key}\" is not supported (use 'hostname'; 'header'/'value' only for HttpRewrite)"),
                    None,
                );
            }
        }
    }

    fn check_rewrite(&mut self, actions: &[(ActionKind, Span)]) {
        let Some((_, span)) = actions.iter().find(|(a, _)| *a == ActionKind::HttpRewrite) else {
            return;
        };
        if self.policy.effect == Effect::Deny {
            self.warn(
                *span,
                "rewrite_forbid_noop",
                "forbid on HttpRewrite has no effect".into(),
                None,
            );
            return;
        }
        let policy = self.policy;
        let has = |name: &str| {
            policy.clauses().any(|(_, c)| {
                matches!(c, Clause::ContextEq { key, value, .. } if key.trim().eq_ignore_ascii_case(name) && !value.is_empty())
            })
        };
        if !has("header") || !has("value") {
            self.warn(
                *span,
                "rewrite_incomplete",
                "HttpRewrite needs both context.header and context.value; no rewrite is produced".into(),
                Some("Add: when { context.header == \"Name\" && context.value == \"...\" }"),
            );
        }
    }
}

/// Lint one parsed policy. Findings are deduplicated by code and message.
pub fn lint_policy(source: &str, policy: &Policy) -> Vec<LintFinding> {
    let mut linter = Linter {
        source,
        policy,
        findings: Vec::new(),
        seen: HashSet::new(),
    };
    let acts = actions(policy);
    let res = resources(policy);
    linter.check_principal();
    linter.check_actions(&acts);
    linter.check_resources(&acts, &res);
    linter.check_conditions();
    linter.check_rewrite(&acts);
    linter.findings
}
