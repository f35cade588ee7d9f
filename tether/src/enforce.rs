//! Seams to the enforcement subsystems.
//!
//! The policy manager publishes every merged rule set to two consumers: the
//! kernel enforcement layer ([`KernelUpdater`]) and the network proxy
//! ([`ProxyUpdater`]). Both are injected; closures implement the traits
//! directly so tests and small binaries need no wrapper types.

use std::net::Ipv4Addr;

use tether_lang::{Effect, HeaderRewriteRule, RuleSet, Target, ToolRule};
use tracing::trace;

/// Receives the merged rule set for kernel-level enforcement.
///
/// Errors are reported to the caller of the mutating manager operation; they
/// never prevent the proxy from being updated.
pub trait KernelUpdater: Send + Sync {
    fn update_runtime_rules(&self, rules: &RuleSet) -> anyhow::Result<()>;
}

impl<F> KernelUpdater for F
where
    F: Fn(&RuleSet) -> anyhow::Result<()> + Send + Sync,
{
    fn update_runtime_rules(&self, rules: &RuleSet) -> anyhow::Result<()> {
        self(rules)
    }
}

/// Receives the merged rule set and header-rewrite rules for the proxy.
pub trait ProxyUpdater: Send + Sync {
    fn update_proxy(&self, rules: &RuleSet, http: &[HeaderRewriteRule]);
}

impl<F> ProxyUpdater for F
where
    F: Fn(&RuleSet, &[HeaderRewriteRule]) + Send + Sync,
{
    fn update_proxy(&self, rules: &RuleSet, http: &[HeaderRewriteRule]) {
        self(rules, http)
    }
}

/// The proxy's configuration surface.
pub trait ProxySink: Send + Sync {
    fn set_header_rewrite_rules(&self, rules: Vec<HeaderRewriteRule>);
    fn set_policy_checker(&self, checker: PolicyChecker);
}

/// Adapts a [`ProxySink`] into a [`ProxyUpdater`]: rewrite rules are
/// installed first, then a fresh [`PolicyChecker`].
#[derive(Debug)]
pub struct ProxyPublisher<S> {
    sink: S,
}

impl<S: ProxySink> ProxyPublisher<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S: ProxySink> ProxyUpdater for ProxyPublisher<S> {
    fn update_proxy(&self, rules: &RuleSet, http: &[HeaderRewriteRule]) {
        self.sink.set_header_rewrite_rules(http.to_vec());
        self.sink.set_policy_checker(PolicyChecker::new(rules));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HostPattern {
    Any,
    Exact(String),
    /// Stored with its leading dot: `*.example.com` → `.example.com`.
    Suffix(String),
}

impl HostPattern {
    fn new(name: &str) -> Self {
        let name = name.trim().trim_end_matches('.').to_ascii_lowercase();
        if name == "*" {
            HostPattern::Any
        } else if let Some(rest) = name.strip_prefix('*') {
            HostPattern::Suffix(rest.to_string())
        } else {
            HostPattern::Exact(name)
        }
    }

    fn matches(&self, hostname: &str) -> bool {
        match self {
            HostPattern::Any => true,
            HostPattern::Exact(h) => h == hostname,
            HostPattern::Suffix(s) => hostname.len() > s.len() && hostname.ends_with(s.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ConnectMatch {
    Host(HostPattern),
    Ip(Ipv4Addr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ConnectEntry {
    allow: bool,
    target: ConnectMatch,
    port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ToolEntry {
    allow: bool,
    server: String,
    tool: String,
}

/// Connect and tool-call evaluator built from an active rule set.
///
/// Both checks are first-match-wins over the rule order they were built
/// from; the merged order puts every connect deny first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyChecker {
    connect: Vec<ConnectEntry>,
    tools: Vec<ToolEntry>,
    default_allow: bool,
}

/// Lowercase, and reduce a URL or `host:port` to its bare host.
fn normalize_server(server: &str) -> String {
    let mut s = server.trim().to_ascii_lowercase();
    if let Some((_, rest)) = s.split_once("://") {
        s = rest.to_string();
    }
    if let Some((host, _)) = s.split_once('/') {
        s = host.to_string();
    }
    if let Some((host, port)) = s.rsplit_once(':')
        && !host.is_empty()
        && port.parse::<u16>().is_ok()
    {
        s = host.to_string();
    }
    s.trim().to_string()
}

impl PolicyChecker {
    pub fn new(rules: &RuleSet) -> Self {
        let connect = rules
            .connect
            .iter()
            .filter_map(|r| {
                let (target, port) = match &r.target {
                    Target::Host { name, port } => (ConnectMatch::Host(HostPattern::new(name)), *port),
                    Target::Ip { addr, port } => (ConnectMatch::Ip(*addr), *port),
                    Target::Path(_) => return None,
                };
                Some(ConnectEntry {
                    allow: r.effect == Effect::Allow,
                    target,
                    port,
                })
            })
            .collect();

        let mut tools: Vec<ToolEntry> = Vec::new();
        for ToolRule { effect, server, tool } in &rules.tools {
            let entry = ToolEntry {
                allow: *effect == Effect::Allow,
                server: normalize_server(server),
                tool: tool.trim().to_ascii_lowercase(),
            };
            if !tools.contains(&entry) {
                tools.push(entry);
            }
        }

        Self {
            connect,
            tools,
            default_allow: rules.connect_default_allow,
        }
    }

    /// Decide an outbound connection. `ip` is the resolved destination when
    /// known.
    pub fn check_connect(&self, hostname: &str, ip: Option<Ipv4Addr>, port: u16) -> bool {
        let hostname = hostname.trim().trim_end_matches('.').to_ascii_lowercase();
        let ip = ip.or_else(|| hostname.parse().ok());
        for entry in &self.connect {
            if entry.port.is_some_and(|p| p != port) {
                continue;
            }
            let matched = match &entry.target {
                ConnectMatch::Ip(addr) => ip == Some(*addr),
                ConnectMatch::Host(pattern) => pattern.matches(&hostname),
            };
            if matched {
                return entry.allow;
            }
        }
        trace!(hostname = %hostname, port, default = self.default_allow, "no connect rule matched");
        self.default_allow
    }

    /// Decide an MCP tool call. Calls are allowed when no rule matches.
    pub fn check_tool_call(&self, server: &str, tool: &str) -> bool {
        let server = normalize_server(server);
        let tool = tool.trim().to_ascii_lowercase();
        self.tools
            .iter()
            .find(|e| (e.server.is_empty() || e.server == server) && (e.tool.is_empty() || e.tool == tool))
            .is_none_or(|e| e.allow)
    }

    pub fn has_tool_rules(&self) -> bool {
        !self.tools.is_empty()
    }

    /// Verdict for connections no rule matches.
    pub fn default_allow(&self) -> bool {
        self.default_allow
    }

    pub fn connect_rule_count(&self) -> usize {
        self.connect.len()
    }
}
