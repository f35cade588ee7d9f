//! Error types for rule parsing and policy transpilation.

use crate::rules::Operation;

/// Error while parsing a single-line runtime rule (`allow proc.exec /bin/ls`).
///
/// These are plain errors: a runtime rule is one line of direct API input, so
/// there is no file/line/column context worth reporting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleParseError {
    #[error("invalid rule '{rule}': expected {expected}")]
    InvalidFormat { rule: String, expected: &'static str },

    #[error("invalid effect '{0}' (must be 'allow' or 'deny')")]
    InvalidEffect(String),

    #[error("unsupported operation '{0}'")]
    UnsupportedOperation(String),

    #[error("invalid port '{value}': {reason}")]
    InvalidPort { value: String, reason: String },

    #[error("IPv6 address '{0}' is not supported")]
    Ipv6Unsupported(String),

    #[error("path too long ({0} bytes, max 255)")]
    PathTooLong(usize),

    #[error("hostname too long ({0} bytes, max 127)")]
    HostnameTooLong(usize),

    #[error("missing rule target")]
    EmptyTarget,

    #[error("target '{target}' is not valid for {operation}")]
    TargetMismatch { operation: Operation, target: String },

    #[error("{0}")]
    ArgsNotAllowed(&'static str),

    #[error("too many arguments ({0}, max 4)")]
    TooManyArgs(usize),

    #[error("argument '{0}' too long (max 31 bytes)")]
    ArgTooLong(String),

    #[error("invalid header format '{0}'")]
    InvalidHeader(String),

    #[error("http.rewrite rules must use 'allow'")]
    RewriteMustAllow,
}

impl RuleParseError {
    /// Return a help message suggesting how to fix this error, if applicable.
    pub fn help(&self) -> Option<String> {
        match self {
            RuleParseError::InvalidFormat { expected, .. } => {
                Some(format!("expected format: {expected}"))
            }
            RuleParseError::InvalidEffect(_) => Some("valid effects are: allow, deny".into()),
            RuleParseError::UnsupportedOperation(_) => Some(
                "valid operations: file.open, file.open:ro, file.open:rw, proc.exec, net.send, \
                 mcp.call, http.rewrite"
                    .into(),
            ),
            RuleParseError::InvalidHeader(_) => {
                Some("format: allow http.rewrite <host> header:<name>:<value>".into())
            }
            RuleParseError::ArgsNotAllowed(_) | RuleParseError::TooManyArgs(_) => Some(
                "only deny proc.exec rules take arguments, e.g. \"deny proc.exec /usr/bin/git push\""
                    .into(),
            ),
            RuleParseError::TargetMismatch { operation, .. } if *operation == Operation::Connect => {
                Some("net.send targets are host[:port] or an IPv4 address[:port]".into())
            }
            RuleParseError::TargetMismatch { .. } => {
                Some("file and exec targets are absolute paths".into())
            }
            _ => None,
        }
    }
}

/// Error produced by [`crate::transpile`].
///
/// The `Display` form is the front-end's public error contract: a
/// `<Kind>Error: <detail>` message followed by `at <file>:<line>:<column>`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranspileError {
    #[error("ParseError: {message} at {file}:{line}:{column}")]
    Parse {
        message: String,
        file: String,
        line: usize,
        column: usize,
    },

    #[error("LintError: {message} at {file}:{line}:{column}")]
    Lint {
        /// Stable identifier of the lint (e.g. `resource_mismatch`).
        code: &'static str,
        message: String,
        suggestion: Option<String>,
        file: String,
        line: usize,
        column: usize,
    },
}

impl TranspileError {
    /// 1-based (line, column) of the error.
    pub fn location(&self) -> (usize, usize) {
        match self {
            TranspileError::Parse { line, column, .. } | TranspileError::Lint { line, column, .. } => {
                (*line, *column)
            }
        }
    }
}
