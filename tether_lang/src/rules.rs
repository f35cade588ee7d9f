//! Compiled rule model: access-control rules, tool-call rules, and HTTP
//! header-rewrite rules.
//!
//! Every rule has exactly one canonical single-line rendering (its `Display`).
//! That rendering is the rule's identity for deduplication and removal, and it
//! is also the runtime rule syntax accepted by `FromStr`:
//!
//! ```text
//! allow file.open /etc/hosts
//! deny proc.exec /usr/bin/git push
//! deny net.send 1.1.1.1:443
//! deny mcp.call mcp.example.com delete_repo
//! allow http.rewrite api.example.com header:Authorization:Bearer abc
//! default net.send deny
//! ```

use std::cmp::Reverse;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RuleParseError;

/// Longest path the kernel rule maps can hold.
pub const MAX_PATH_LEN: usize = 255;
/// Longest hostname the kernel rule maps can hold.
pub const MAX_HOSTNAME_LEN: usize = 127;
/// Maximum number of exec arguments on a deny rule.
pub const MAX_EXEC_ARGS: usize = 4;
/// Maximum length of a single exec argument.
pub const MAX_ARG_LEN: usize = 31;

const ACCESS_FORMAT: &str = "<allow|deny> <operation> <target> [args...]";
const REWRITE_FORMAT: &str = "allow http.rewrite <host> header:<name>:<value>";
const TOOL_FORMAT: &str = "<allow|deny> mcp.call <server|*> [tool|*]";
const DEFAULT_FORMAT: &str = "default net.send <allow|deny>";

/// The verdict a rule produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Allow => write!(f, "allow"),
            Effect::Deny => write!(f, "deny"),
        }
    }
}

impl FromStr for Effect {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Effect::Allow),
            "deny" => Ok(Effect::Deny),
            _ => Err(RuleParseError::InvalidEffect(s.to_string())),
        }
    }
}

/// The kernel-level operation an [`AccessRule`] gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// Open in any mode.
    #[serde(rename = "file.open")]
    Open,
    #[serde(rename = "file.open:ro")]
    OpenReadOnly,
    /// Open in any write mode.
    #[serde(rename = "file.open:rw")]
    OpenReadWrite,
    #[serde(rename = "proc.exec")]
    Exec,
    /// Outbound network connect.
    #[serde(rename = "net.send")]
    Connect,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Open => "file.open",
            Operation::OpenReadOnly => "file.open:ro",
            Operation::OpenReadWrite => "file.open:rw",
            Operation::Exec => "proc.exec",
            Operation::Connect => "net.send",
        }
    }

    /// True for the three `file.open*` operations.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            Operation::Open | Operation::OpenReadOnly | Operation::OpenReadWrite
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file.open" => Ok(Operation::Open),
            "file.open:ro" => Ok(Operation::OpenReadOnly),
            "file.open:rw" => Ok(Operation::OpenReadWrite),
            "proc.exec" => Ok(Operation::Exec),
            "net.send" => Ok(Operation::Connect),
            _ => Err(RuleParseError::UnsupportedOperation(s.to_string())),
        }
    }
}

/// What an [`AccessRule`] applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Target {
    /// Filesystem path; a trailing `/` marks a directory subtree.
    Path(String),
    /// Hostname pattern: exact, `*.domain`, or `*`.
    Host { name: String, port: Option<u16> },
    Ip { addr: Ipv4Addr, port: Option<u16> },
}

impl Target {
    /// Build a path target, enforcing the kernel path length limit.
    pub fn path(path: impl Into<String>) -> Result<Self, RuleParseError> {
        let path = path.into();
        if path.is_empty() {
            return Err(RuleParseError::EmptyTarget);
        }
        if path.len() > MAX_PATH_LEN {
            return Err(RuleParseError::PathTooLong(path.len()));
        }
        Ok(Target::Path(path))
    }

    /// Parse a connect target: `host`, `host:port`, `ip`, or `ip:port`.
    pub fn connect(target: &str) -> Result<Self, RuleParseError> {
        if target.is_empty() {
            return Err(RuleParseError::EmptyTarget);
        }
        if target.parse::<Ipv6Addr>().is_ok() || target.starts_with('[') {
            return Err(RuleParseError::Ipv6Unsupported(target.to_string()));
        }

        let (host, port) = match target.split_once(':') {
            Some((host, port)) => (host, Some(parse_port(port)?)),
            None => (target, None),
        };
        if host.is_empty() {
            return Err(RuleParseError::EmptyTarget);
        }
        if host.len() > MAX_HOSTNAME_LEN {
            return Err(RuleParseError::HostnameTooLong(host.len()));
        }

        match host.parse::<Ipv4Addr>() {
            Ok(addr) => Ok(Target::Ip { addr, port }),
            Err(_) => Ok(Target::Host {
                name: host.to_string(),
                port,
            }),
        }
    }

    /// Length used to order rules from most to least specific.
    fn specificity(&self) -> usize {
        match self {
            Target::Path(p) => p.len(),
            Target::Host { name, .. } => name.len(),
            Target::Ip { .. } => 0,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Path(p) => f.write_str(p),
            Target::Host { name, port: None } => f.write_str(name),
            Target::Host {
                name,
                port: Some(port),
            } => write!(f, "{name}:{port}"),
            Target::Ip { addr, port: None } => write!(f, "{addr}"),
            Target::Ip {
                addr,
                port: Some(port),
            } => write!(f, "{addr}:{port}"),
        }
    }
}

fn parse_port(value: &str) -> Result<u16, RuleParseError> {
    let port: u16 = value.parse().map_err(|e: std::num::ParseIntError| {
        RuleParseError::InvalidPort {
            value: value.to_string(),
            reason: e.to_string(),
        }
    })?;
    if port == 0 {
        return Err(RuleParseError::InvalidPort {
            value: value.to_string(),
            reason: "port must be between 1 and 65535".into(),
        });
    }
    Ok(port)
}

/// A single kernel-enforceable access rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessRule {
    pub effect: Effect,
    pub operation: Operation,
    pub target: Target,
    /// Set when a path target ends in `/`.
    pub is_directory: bool,
    /// Argument blacklist for `deny proc.exec` rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl AccessRule {
    /// Build a rule, checking that the target kind fits the operation.
    pub fn new(effect: Effect, operation: Operation, target: Target) -> Result<Self, RuleParseError> {
        let fits = match (&target, operation) {
            (Target::Path(_), Operation::Connect) => false,
            (Target::Path(_), _) => true,
            (_, Operation::Connect) => true,
            _ => false,
        };
        if !fits {
            return Err(RuleParseError::TargetMismatch {
                operation,
                target: target.to_string(),
            });
        }
        let is_directory = matches!(&target, Target::Path(p) if p.ends_with('/'));
        Ok(Self {
            effect,
            operation,
            target,
            is_directory,
            args: Vec::new(),
        })
    }

    /// Attach an argument blacklist. Only `deny proc.exec` rules accept one.
    pub fn with_args<I, S>(mut self, args: I) -> Result<Self, RuleParseError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        if args.is_empty() {
            return Ok(self);
        }
        if self.operation != Operation::Exec {
            return Err(RuleParseError::ArgsNotAllowed(
                "arguments are only supported on proc.exec rules",
            ));
        }
        if self.effect == Effect::Allow {
            return Err(RuleParseError::ArgsNotAllowed(
                "allow rules cannot have arguments - use path-only allows with argument blacklist denies",
            ));
        }
        if args.len() > MAX_EXEC_ARGS {
            return Err(RuleParseError::TooManyArgs(args.len()));
        }
        if let Some(long) = args.iter().find(|a| a.len() > MAX_ARG_LEN) {
            return Err(RuleParseError::ArgTooLong(long.clone()));
        }
        self.args = args;
        Ok(self)
    }
}

impl fmt::Display for AccessRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.effect, self.operation, self.target)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

impl FromStr for AccessRule {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.len() < 3 {
            return Err(RuleParseError::InvalidFormat {
                rule: s.trim().to_string(),
                expected: ACCESS_FORMAT,
            });
        }
        let effect: Effect = parts[0].parse()?;
        let operation: Operation = parts[1].parse()?;
        let target = if operation == Operation::Connect {
            Target::connect(parts[2])?
        } else {
            Target::path(parts[2])?
        };
        AccessRule::new(effect, operation, target)?.with_args(parts[3..].iter().copied())
    }
}

/// Gate on higher-level (MCP) tool invocations. Empty fields are wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolRule {
    pub effect: Effect,
    pub server: String,
    pub tool: String,
}

impl ToolRule {
    /// Identity used for deduplication.
    pub fn key(&self) -> (Effect, &str, &str) {
        (self.effect, &self.server, &self.tool)
    }
}

fn wildcard_or(s: &str) -> &str {
    if s.is_empty() { "*" } else { s }
}

impl fmt::Display for ToolRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} mcp.call {} {}",
            self.effect,
            wildcard_or(&self.server),
            wildcard_or(&self.tool)
        )
    }
}

impl FromStr for ToolRule {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if !(3..=4).contains(&parts.len()) || parts[1] != "mcp.call" {
            return Err(RuleParseError::InvalidFormat {
                rule: s.trim().to_string(),
                expected: TOOL_FORMAT,
            });
        }
        let unwild = |t: &str| if t == "*" { String::new() } else { t.to_string() };
        Ok(ToolRule {
            effect: parts[0].parse()?,
            server: unwild(parts[2]),
            tool: parts.get(3).map(|t| unwild(t)).unwrap_or_default(),
        })
    }
}

/// Rewrites (or injects) a request header for a host at the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeaderRewriteRule {
    pub host: String,
    pub header: String,
    pub value: String,
}

impl fmt::Display for HeaderRewriteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "allow http.rewrite {} header:{}:{}",
            self.host, self.header, self.value
        )
    }
}

impl FromStr for HeaderRewriteRule {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.len() < 4 || parts[1] != "http.rewrite" {
            return Err(RuleParseError::InvalidFormat {
                rule: s.trim().to_string(),
                expected: REWRITE_FORMAT,
            });
        }
        if parts[0] != "allow" {
            return Err(RuleParseError::RewriteMustAllow);
        }

        let header_tok = parts[3]
            .strip_prefix("header:")
            .ok_or_else(|| RuleParseError::InvalidHeader(parts[3].to_string()))?;
        let (name, value) = header_tok
            .split_once(':')
            .ok_or_else(|| RuleParseError::InvalidHeader(parts[3].to_string()))?;

        let mut value = value.trim().to_string();
        if parts.len() > 4 {
            value.push(' ');
            value.push_str(&parts[4..].join(" "));
        }

        Ok(HeaderRewriteRule {
            host: parts[2].to_string(),
            header: name.trim().to_string(),
            value,
        })
    }
}

/// The compiled access-control policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub open: Vec<AccessRule>,
    pub exec: Vec<AccessRule>,
    pub connect: Vec<AccessRule>,
    pub tools: Vec<ToolRule>,
    /// Verdict for connect attempts no rule matches.
    pub connect_default_allow: bool,
    /// Whether the default above was set explicitly rather than inherited.
    pub connect_default_explicit: bool,
}

impl RuleSet {
    /// Append an access rule to the collection for its operation.
    pub fn push(&mut self, rule: AccessRule) {
        match rule.operation {
            Operation::Open | Operation::OpenReadOnly | Operation::OpenReadWrite => {
                self.open.push(rule)
            }
            Operation::Exec => self.exec.push(rule),
            Operation::Connect => self.connect.push(rule),
        }
    }

    pub fn len(&self) -> usize {
        self.open.len() + self.exec.len() + self.connect.len() + self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && !self.connect_default_explicit
    }
}

/// One line of the runtime rule syntax, classified by its operation token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeRule {
    Access(AccessRule),
    Tool(ToolRule),
    Rewrite(HeaderRewriteRule),
    /// `default net.send allow|deny`
    ConnectDefault { allow: bool },
}

impl FromStr for RuntimeRule {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        match (parts.first().copied(), parts.get(1).copied()) {
            (Some("default"), _) => {
                if parts.len() != 3 || parts[1] != "net.send" {
                    return Err(RuleParseError::InvalidFormat {
                        rule: s.trim().to_string(),
                        expected: DEFAULT_FORMAT,
                    });
                }
                let effect: Effect = parts[2].parse()?;
                Ok(RuntimeRule::ConnectDefault {
                    allow: effect == Effect::Allow,
                })
            }
            (_, Some("http.rewrite")) => s.parse().map(RuntimeRule::Rewrite),
            (_, Some("mcp.call")) => s.parse().map(RuntimeRule::Tool),
            _ => s.parse().map(RuntimeRule::Access),
        }
    }
}

impl fmt::Display for RuntimeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeRule::Access(r) => r.fmt(f),
            RuntimeRule::Tool(r) => r.fmt(f),
            RuntimeRule::Rewrite(r) => r.fmt(f),
            RuntimeRule::ConnectDefault { allow } => {
                let effect = if *allow { Effect::Allow } else { Effect::Deny };
                write!(f, "default net.send {effect}")
            }
        }
    }
}

fn sorted_by_specificity(rules: &[AccessRule]) -> Vec<String> {
    let mut keyed: Vec<(usize, String)> = rules
        .iter()
        .map(|r| (r.target.specificity(), r.to_string()))
        .collect();
    keyed.sort_by(|a, b| (Reverse(a.0), &a.1).cmp(&(Reverse(b.0), &b.1)));
    keyed.into_iter().map(|(_, s)| s).collect()
}

/// Render a rule set as a stable, human-readable listing.
///
/// Open and exec rules are ordered most specific path first, connect rules
/// longest hostname first; ties fall back to the canonical rendering.
pub fn policy_lines(rules: &RuleSet, http: &[HeaderRewriteRule]) -> Vec<String> {
    let mut lines = Vec::with_capacity(rules.len() + http.len() + 1);
    lines.extend(sorted_by_specificity(&rules.open));
    lines.extend(sorted_by_specificity(&rules.exec));
    if rules.connect_default_explicit {
        lines.push(
            RuntimeRule::ConnectDefault {
                allow: rules.connect_default_allow,
            }
            .to_string(),
        );
    }
    lines.extend(sorted_by_specificity(&rules.connect));

    let mut tools: Vec<String> = rules.tools.iter().map(ToString::to_string).collect();
    tools.sort();
    lines.extend(tools);

    let mut rewrites: Vec<String> = http.iter().map(ToString::to_string).collect();
    rewrites.sort();
    lines.extend(rewrites);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_rule_round_trips_canonical_form() {
        for line in [
            "allow file.open /etc/hosts",
            "allow file.open:ro /usr/share/",
            "deny file.open:rw /etc/",
            "allow proc.exec /usr/bin/apt",
            "deny proc.exec /usr/bin/git push --force",
            "deny net.send 1.1.1.1",
            "allow net.send api.example.com:443",
            "allow net.send *.github.com",
        ] {
            let rule: AccessRule = line.parse().unwrap();
            assert_eq!(rule.to_string(), line);
        }
    }

    #[test]
    fn canonical_form_collapses_whitespace() {
        let rule: AccessRule = "  allow   proc.exec\t/bin/ls ".parse().unwrap();
        assert_eq!(rule.to_string(), "allow proc.exec /bin/ls");
    }

    #[test]
    fn directory_flag_follows_trailing_slash() {
        let dir: AccessRule = "allow file.open /tmp/".parse().unwrap();
        let file: AccessRule = "allow file.open /tmp".parse().unwrap();
        assert!(dir.is_directory);
        assert!(!file.is_directory);
    }

    #[test]
    fn connect_targets_classify_ip_and_host() {
        let ip: AccessRule = "deny net.send 10.0.0.1:22".parse().unwrap();
        assert_eq!(
            ip.target,
            Target::Ip {
                addr: Ipv4Addr::new(10, 0, 0, 1),
                port: Some(22)
            }
        );
        let host: AccessRule = "allow net.send example.com".parse().unwrap();
        assert_eq!(
            host.target,
            Target::Host {
                name: "example.com".into(),
                port: None
            }
        );
    }

    #[test]
    fn rejects_malformed_access_rules() {
        assert!(matches!(
            "allow proc.exec".parse::<AccessRule>(),
            Err(RuleParseError::InvalidFormat { .. })
        ));
        assert!(matches!(
            "permit proc.exec /bin/ls".parse::<AccessRule>(),
            Err(RuleParseError::InvalidEffect(_))
        ));
        assert!(matches!(
            "allow file.write /tmp".parse::<AccessRule>(),
            Err(RuleParseError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            "deny net.send example.com:0".parse::<AccessRule>(),
            Err(RuleParseError::InvalidPort { .. })
        ));
        assert!(matches!(
            "deny net.send example.com:http".parse::<AccessRule>(),
            Err(RuleParseError::InvalidPort { .. })
        ));
        assert!(matches!(
            "deny net.send ::1".parse::<AccessRule>(),
            Err(RuleParseError::Ipv6Unsupported(_))
        ));
    }

    #[test]
    fn exec_args_only_on_deny() {
        assert!(matches!(
            "allow proc.exec /usr/bin/git push".parse::<AccessRule>(),
            Err(RuleParseError::ArgsNotAllowed(_))
        ));
        assert!(matches!(
            "deny file.open /etc/shadow extra".parse::<AccessRule>(),
            Err(RuleParseError::ArgsNotAllowed(_))
        ));
        assert!(matches!(
            "deny proc.exec /bin/x a b c d e".parse::<AccessRule>(),
            Err(RuleParseError::TooManyArgs(5))
        ));
    }

    #[test]
    fn enforces_kernel_length_limits() {
        let long_path = format!("allow file.open /{}", "a".repeat(300));
        assert!(matches!(
            long_path.parse::<AccessRule>(),
            Err(RuleParseError::PathTooLong(_))
        ));
        let long_host = format!("allow net.send {}.com", "h".repeat(130));
        assert!(matches!(
            long_host.parse::<AccessRule>(),
            Err(RuleParseError::HostnameTooLong(_))
        ));
    }

    #[test]
    fn rewrite_rule_rejoins_multi_word_values() {
        let rule: HeaderRewriteRule =
            "allow http.rewrite api.example.com header:Authorization:Bearer  abc def"
                .parse()
                .unwrap();
        assert_eq!(rule.host, "api.example.com");
        assert_eq!(rule.header, "Authorization");
        assert_eq!(rule.value, "Bearer abc def");
        assert_eq!(
            rule.to_string(),
            "allow http.rewrite api.example.com header:Authorization:Bearer abc def"
        );
    }

    #[test]
    fn rewrite_rule_value_may_contain_colons() {
        let rule: HeaderRewriteRule = "allow http.rewrite h header:X-Url:https://a.b:8443/x"
            .parse()
            .unwrap();
        assert_eq!(rule.header, "X-Url");
        assert_eq!(rule.value, "https://a.b:8443/x");
    }

    #[test]
    fn rewrite_rule_errors() {
        assert!(matches!(
            "allow http.rewrite host Authorization:x".parse::<HeaderRewriteRule>(),
            Err(RuleParseError::InvalidHeader(_))
        ));
        assert!(matches!(
            "allow http.rewrite host header:NoValue".parse::<HeaderRewriteRule>(),
            Err(RuleParseError::InvalidHeader(_))
        ));
        assert!(matches!(
            "deny http.rewrite host header:a:b".parse::<HeaderRewriteRule>(),
            Err(RuleParseError::RewriteMustAllow)
        ));
        assert!(matches!(
            "allow http.rewrite host".parse::<HeaderRewriteRule>(),
            Err(RuleParseError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn tool_rule_wildcards() {
        let rule: ToolRule = "deny mcp.call * delete_repo".parse().unwrap();
        assert_eq!(rule.server, "");
        assert_eq!(rule.tool, "delete_repo");
        assert_eq!(rule.to_string(), "deny mcp.call * delete_repo");

        let server_only: ToolRule = "allow mcp.call mcp.example.com".parse().unwrap();
        assert_eq!(server_only.to_string(), "allow mcp.call mcp.example.com *");
    }

    #[test]
    fn runtime_rule_dispatches_on_operation() {
        assert!(matches!(
            "allow proc.exec /bin/ls".parse::<RuntimeRule>(),
            Ok(RuntimeRule::Access(_))
        ));
        assert!(matches!(
            "allow http.rewrite h header:a:b".parse::<RuntimeRule>(),
            Ok(RuntimeRule::Rewrite(_))
        ));
        assert!(matches!(
            "deny mcp.call s t".parse::<RuntimeRule>(),
            Ok(RuntimeRule::Tool(_))
        ));
        assert_eq!(
            "default net.send deny".parse::<RuntimeRule>().unwrap(),
            RuntimeRule::ConnectDefault { allow: false }
        );
        assert!("default file.open deny".parse::<RuntimeRule>().is_err());
        assert!("".parse::<RuntimeRule>().is_err());
    }

    #[test]
    fn push_routes_by_operation() {
        let mut set = RuleSet::default();
        for line in [
            "allow file.open:ro /etc/",
            "allow proc.exec /bin/ls",
            "deny net.send 1.1.1.1",
        ] {
            set.push(line.parse().unwrap());
        }
        assert_eq!(set.open.len(), 1);
        assert_eq!(set.exec.len(), 1);
        assert_eq!(set.connect.len(), 1);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn policy_lines_orders_most_specific_first() {
        let mut set = RuleSet::default();
        for line in [
            "allow file.open /a/",
            "allow file.open /a/b/c",
            "allow net.send a.io",
            "deny net.send 10.0.0.1",
            "allow net.send api.example.com",
        ] {
            set.push(line.parse().unwrap());
        }
        set.connect_default_explicit = true;
        let http = vec![HeaderRewriteRule {
            host: "h".into(),
            header: "X".into(),
            value: "1".into(),
        }];

        assert_eq!(
            policy_lines(&set, &http),
            vec![
                "allow file.open /a/b/c",
                "allow file.open /a/",
                "default net.send deny",
                "allow net.send api.example.com",
                "allow net.send a.io",
                "deny net.send 10.0.0.1",
                "allow http.rewrite h header:X:1",
            ]
        );
    }

    #[test]
    fn rule_set_serializes_for_inspection() {
        let mut set = RuleSet::default();
        set.push("deny net.send 10.0.0.1:22".parse().unwrap());
        set.push("allow file.open:ro /etc/".parse().unwrap());

        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["open"][0]["operation"], "file.open:ro");
        assert_eq!(json["open"][0]["target"]["kind"], "path");
        assert_eq!(json["connect"][0]["target"]["value"]["addr"], "10.0.0.1");
        assert_eq!(json["connect"][0]["target"]["value"]["port"], 22);

        let back: RuleSet = serde_json::from_value(json).unwrap();
        assert_eq!(back, set);
    }
}
