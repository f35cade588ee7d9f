//! Lowering parsed policies into the rule model.

use std::collections::BTreeSet;

use tracing::debug;

use crate::ast::{Clause, EntityRef, Policy};
use crate::error::RuleParseError;
use crate::lexer::Span;
use crate::rules::{AccessRule, Effect, HeaderRewriteRule, Operation, RuleSet, Target, ToolRule};

/// What an `Action::"…"` entity asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ActionKind {
    Op(Operation),
    HttpRewrite,
    McpCall,
    /// An `Action::"…"` id that is not recognized.
    UnknownId(String),
    /// Any entity whose type is not `Action`.
    NonCanonical(String),
}

impl ActionKind {
    pub(crate) fn of(entity: &EntityRef) -> Self {
        if entity.type_name() != "Action" {
            return ActionKind::NonCanonical(format!("{}::\"{}\"", entity.type_name(), entity.id));
        }
        match entity.id.to_ascii_lowercase().as_str() {
            "fileopen" => ActionKind::Op(Operation::Open),
            "fileopenreadonly" => ActionKind::Op(Operation::OpenReadOnly),
            "fileopenreadwrite" => ActionKind::Op(Operation::OpenReadWrite),
            "processexec" => ActionKind::Op(Operation::Exec),
            "networkconnect" => ActionKind::Op(Operation::Connect),
            "httprewrite" => ActionKind::HttpRewrite,
            "mcpcall" => ActionKind::McpCall,
            _ => ActionKind::UnknownId(entity.id.clone()),
        }
    }
}

/// A resource after entity-type normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Resource {
    File(String),
    Dir(String),
    /// `host[:port]`, `*.zone`, `*`, or an IP literal.
    Host(String),
    McpServer(String),
    McpTool(String),
    IpRange(String),
    Unsupported { type_name: String },
}

impl Resource {
    pub(crate) fn of(entity: &EntityRef) -> Self {
        let ty = entity.type_name();
        let nested = entity.path.len() > 1;
        let last = entity.path.last().map(String::as_str).unwrap_or_default();
        let value = entity.id.clone();
        match last {
            "File" => Resource::File(value),
            "Dir" if !nested => Resource::Dir(value),
            "Directory" => Resource::Dir(value),
            "Host" if !nested => Resource::Host(value),
            "Hostname" | "Endpoint" => Resource::Host(value),
            "DnsZone" if value.starts_with("*.") => Resource::Host(value),
            "DnsZone" => Resource::Host(format!("*.{value}")),
            "Server" if nested => Resource::McpServer(value),
            "Tool" if nested => Resource::McpTool(value),
            "IpRange" => Resource::IpRange(value),
            _ => Resource::Unsupported { type_name: ty },
        }
    }
}

pub(crate) fn actions(policy: &Policy) -> Vec<(ActionKind, Span)> {
    policy
        .action
        .entities()
        .iter()
        .map(|e| (ActionKind::of(e), e.span))
        .collect()
}

/// Every resource a policy names: head entities, `resource in`/`==`
/// clauses, and `context.hostname` matches.
pub(crate) fn resources(policy: &Policy) -> Vec<(Resource, Span)> {
    let mut out: Vec<(Resource, Span)> = policy
        .resource
        .entities()
        .iter()
        .map(|e| (Resource::of(e), e.span))
        .collect();

    for (_, clause) in policy.clauses() {
        match clause {
            Clause::ResourceIn(entities, _) => {
                out.extend(entities.iter().map(|e| (Resource::of(e), e.span)));
            }
            Clause::ResourceEq(e) => out.push((Resource::of(e), e.span)),
            Clause::ContextEq { key, value, span } if key.eq_ignore_ascii_case("hostname") => {
                if !value.is_empty() {
                    out.push((Resource::Host(value.clone()), *span));
                }
            }
            Clause::ContextLike { key, pattern, span } if key.eq_ignore_ascii_case("hostname") => {
                if !pattern.is_empty() {
                    out.push((Resource::Host(pattern.clone()), *span));
                }
            }
            _ => {}
        }
    }
    out
}

/// Look up a `context.<key> == "…"` value, first match wins.
fn context_value<'a>(policy: &'a Policy, key: &str) -> Option<&'a str> {
    policy.clauses().find_map(|(_, clause)| match clause {
        Clause::ContextEq { key: k, value, .. } if k.trim().eq_ignore_ascii_case(key) => {
            Some(value.as_str())
        }
        _ => None,
    })
}

/// An access rule could not be built from a resource that passed lint.
#[derive(Debug)]
pub(crate) struct LowerError {
    pub error: RuleParseError,
    pub span: Span,
}

fn build_access(
    effect: Effect,
    operation: Operation,
    resource: &Resource,
) -> Option<Result<AccessRule, RuleParseError>> {
    let target = match (resource, operation) {
        (Resource::File(path), op) if op != Operation::Connect => Target::path(path.clone()),
        (Resource::Dir(path), op) if op != Operation::Connect => {
            let mut path = path.clone();
            if !path.ends_with('/') {
                path.push('/');
            }
            Target::path(path)
        }
        (Resource::Host(host), Operation::Connect) => Target::connect(host),
        _ => return None,
    };
    Some(target.and_then(|t| AccessRule::new(effect, operation, t)))
}

/// Normalized, deduplicated, sorted values of one MCP resource kind.
fn mcp_names(resources: &[(Resource, Span)], pick: fn(&Resource) -> Option<&str>) -> Vec<String> {
    let names: BTreeSet<String> = resources
        .iter()
        .filter_map(|(r, _)| pick(r))
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect();
    names.into_iter().collect()
}

fn lower_mcp(policy: &Policy, resources: &[(Resource, Span)], rules: &mut RuleSet) {
    let servers = mcp_names(resources, |r| match r {
        Resource::McpServer(s) => Some(s.as_str()),
        _ => None,
    });
    let tools = mcp_names(resources, |r| match r {
        Resource::McpTool(t) => Some(t.as_str()),
        _ => None,
    });

    // Denied servers are also blocked at the network layer.
    if policy.effect == Effect::Deny {
        for server in &servers {
            match Target::connect(server)
                .and_then(|t| AccessRule::new(Effect::Deny, Operation::Connect, t))
            {
                Ok(rule) => rules.push(rule),
                Err(e) => debug!(policy = %policy.id, server = %server, "no connect rule for MCP server: {e}"),
            }
        }
    }

    let servers = if servers.is_empty() { vec![String::new()] } else { servers };
    let tools = if tools.is_empty() { vec![String::new()] } else { tools };
    for server in &servers {
        for tool in &tools {
            rules.tools.push(ToolRule {
                effect: policy.effect,
                server: server.clone(),
                tool: tool.clone(),
            });
        }
    }
}

fn lower_rewrites(policy: &Policy, resources: &[(Resource, Span)]) -> Vec<HeaderRewriteRule> {
    let (Some(header), Some(value)) = (context_value(policy, "header"), context_value(policy, "value"))
    else {
        return Vec::new();
    };
    if header.is_empty() || value.is_empty() {
        return Vec::new();
    }
    resources
        .iter()
        .filter_map(|(r, _)| match r {
            Resource::Host(h) if !h.is_empty() => Some(HeaderRewriteRule {
                host: h.clone(),
                header: header.to_string(),
                value: value.to_string(),
            }),
            _ => None,
        })
        .collect()
}

/// Lower one policy into `rules` / `http`. The policy must already be lint-clean.
pub(crate) fn lower_policy(
    policy: &Policy,
    rules: &mut RuleSet,
    http: &mut Vec<HeaderRewriteRule>,
) -> Result<(), LowerError> {
    let actions = actions(policy);
    let resources = resources(policy);

    if actions.iter().any(|(a, _)| *a == ActionKind::McpCall) {
        lower_mcp(policy, &resources, rules);
        return Ok(());
    }

    if policy.effect == Effect::Allow && actions.iter().any(|(a, _)| *a == ActionKind::HttpRewrite) {
        http.extend(lower_rewrites(policy, &resources));
    }

    for (action, _) in &actions {
        let ActionKind::Op(operation) = action else {
            continue;
        };
        for (resource, span) in &resources {
            match build_access(policy.effect, *operation, resource) {
                Some(Ok(rule)) => rules.push(rule),
                Some(Err(error)) => return Err(LowerError { error, span: *span }),
                None => {}
            }
        }
    }
    Ok(())
}

/// A `*` host forbid sets an explicit deny default; a `*` permit raises the
/// default to allow unless a default was already set explicitly.
pub(crate) fn apply_connect_defaults(rules: &mut RuleSet) {
    let mut allow_any = false;
    let mut deny_any = false;
    for rule in &rules.connect {
        if let Target::Host { name, port: None } = &rule.target
            && name == "*"
        {
            match rule.effect {
                Effect::Allow => allow_any = true,
                Effect::Deny => deny_any = true,
            }
        }
    }
    if deny_any {
        rules.connect_default_allow = false;
        rules.connect_default_explicit = true;
    } else if allow_any && !rules.connect_default_explicit {
        rules.connect_default_allow = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn lower(src: &str) -> (RuleSet, Vec<HeaderRewriteRule>) {
        let mut rules = RuleSet::default();
        let mut http = Vec::new();
        for policy in parse(src).unwrap() {
            lower_policy(&policy, &mut rules, &mut http).unwrap();
        }
        apply_connect_defaults(&mut rules);
        (rules, http)
    }

    fn strings(rules: &[AccessRule]) -> Vec<String> {
        rules.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn resource_types_normalize() {
        let src = r#"permit (principal, action == Action::"NetworkConnect", resource in [
            Host::"a.com:443", Net::Hostname::"b.com", Net::DnsZone::"c.org", Net::DnsZone::"*.d.org"
        ]);"#;
        let (rules, _) = lower(src);
        assert_eq!(
            strings(&rules.connect),
            vec![
                "allow net.send a.com:443",
                "allow net.send b.com",
                "allow net.send *.c.org",
                "allow net.send *.d.org",
            ]
        );
    }

    #[test]
    fn file_actions_cross_resources() {
        let src = r#"forbid (principal, action in [Action::"FileOpenReadWrite", Action::"ProcessExec"],
            resource in [File::"/etc/passwd", Dir::"/secrets"]);"#;
        let (rules, _) = lower(src);
        assert_eq!(
            strings(&rules.open),
            vec!["deny file.open:rw /etc/passwd", "deny file.open:rw /secrets/"]
        );
        assert_eq!(
            strings(&rules.exec),
            vec!["deny proc.exec /etc/passwd", "deny proc.exec /secrets/"]
        );
        assert!(rules.exec[1].is_directory);
    }

    #[test]
    fn context_hostname_becomes_host() {
        let src = r#"permit (principal, action == Action::"NetworkConnect", resource)
            when { context.hostname like "*.example.com" };"#;
        let (rules, _) = lower(src);
        assert_eq!(strings(&rules.connect), vec!["allow net.send *.example.com"]);
    }

    #[test]
    fn wildcard_forbid_sets_explicit_default() {
        let (rules, _) = lower(
            r#"forbid (principal, action == Action::"NetworkConnect", resource == Host::"*");"#,
        );
        assert!(!rules.connect_default_allow);
        assert!(rules.connect_default_explicit);
    }

    #[test]
    fn wildcard_permit_sets_implicit_default() {
        let (rules, _) = lower(
            r#"permit (principal, action == Action::"NetworkConnect", resource == Host::"*");"#,
        );
        assert!(rules.connect_default_allow);
        assert!(!rules.connect_default_explicit);
    }

    #[test]
    fn forbid_mcp_denies_tools_and_hosts() {
        let src = r#"forbid (principal, action == Action::"McpCall", resource)
            when { resource in [ MCP::Server::"MCP.Example.com", MCP::Tool::"Delete", MCP::Tool::"push" ] };"#;
        let (rules, _) = lower(src);
        assert_eq!(strings(&rules.connect), vec!["deny net.send mcp.example.com"]);
        let tools: Vec<_> = rules.tools.iter().map(ToString::to_string).collect();
        assert_eq!(
            tools,
            vec![
                "deny mcp.call mcp.example.com delete",
                "deny mcp.call mcp.example.com push",
            ]
        );
    }

    #[test]
    fn forbid_mcp_tool_without_server_is_server_wildcard() {
        let src = r#"forbid (principal, action == Action::"McpCall", resource == MCP::Tool::"rm");"#;
        let (rules, _) = lower(src);
        assert!(rules.connect.is_empty());
        assert_eq!(rules.tools[0].to_string(), "deny mcp.call * rm");
    }

    #[test]
    fn http_rewrite_reads_context() {
        let src = r#"permit (principal, action == Action::"HttpRewrite", resource == Host::"api.example.com")
            when { context.header == "Authorization" && context.value == "Bearer abc" };"#;
        let (rules, http) = lower(src);
        assert!(rules.is_empty());
        assert_eq!(
            http,
            vec![HeaderRewriteRule {
                host: "api.example.com".into(),
                header: "Authorization".into(),
                value: "Bearer abc".into(),
            }]
        );
    }

    #[test]
    fn http_rewrite_without_value_is_dropped() {
        let src = r#"permit (principal, action == Action::"HttpRewrite", resource == Host::"h")
            when { context.header == "X" };"#;
        let (_, http) = lower(src);
        assert!(http.is_empty());
    }
}
