//! Compiled policy configuration.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tether_lang::{HeaderRewriteRule, RuleSet};
use tracing::{Level, info, instrument};

use super::compile::Compiler;
use super::diagnostic::Diagnostic;

/// The result of a successful compile: rules plus where they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    rules: RuleSet,
    http_rules: Vec<HeaderRewriteRule>,
    source: String,
    path: Option<PathBuf>,
    modified: Option<SystemTime>,
}

impl Config {
    pub(crate) fn new(
        rules: RuleSet,
        http_rules: Vec<HeaderRewriteRule>,
        source: String,
        path: Option<PathBuf>,
        modified: Option<SystemTime>,
    ) -> Self {
        Self {
            rules,
            http_rules,
            source,
            path,
            modified,
        }
    }

    pub(crate) fn located(mut self, path: PathBuf, modified: SystemTime) -> Self {
        self.path = Some(path);
        self.modified = Some(modified);
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn http_rules(&self) -> &[HeaderRewriteRule] {
        &self.http_rules
    }

    /// The exact text that was compiled.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// File modification time observed at compile time.
    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    pub fn into_parts(self) -> (RuleSet, Vec<HeaderRewriteRule>) {
        (self.rules, self.http_rules)
    }
}

/// Permissive first-boot policy: open and exec anywhere under `/`, connect
/// to any host.
pub const DEFAULT_POLICY: &str = r#"permit (principal, action in [Action::"FileOpen", Action::"FileOpenReadOnly", Action::"FileOpenReadWrite"], resource)
when { resource in [ Dir::"/" ] };

permit (principal, action == Action::"ProcessExec", resource)
when { resource in [ Dir::"/" ] };

permit (principal, action == Action::"NetworkConnect", resource)
when { resource in [ Host::"*" ] };
"#;

/// Write [`DEFAULT_POLICY`] to `path` if nothing exists there yet, creating
/// parent directories as needed. An existing file is never touched.
///
/// Returns `true` when the file was created.
#[instrument(level = Level::TRACE)]
pub fn ensure_default_file(path: &Path) -> Result<bool, Diagnostic> {
    if path.as_os_str().is_empty() || path.to_string_lossy().trim().is_empty() {
        return Err(Diagnostic::config(
            "missing policy file path",
            "no policy file path provided",
            "Provide the path to a policy file.",
        ));
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .map_err(|e| Diagnostic::io(dir, "failed to create policy directory", e))?;
    }
    match std::fs::metadata(path) {
        Ok(_) => Ok(false),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            std::fs::write(path, DEFAULT_POLICY)
                .map_err(|e| Diagnostic::io(path, "failed to write default policy", e))?;
            info!(path = %path.display(), "wrote default policy");
            Ok(true)
        }
        Err(e) => Err(Diagnostic::io(path, "failed to stat policy file", e)),
    }
}

/// Compile the policy at `path` with the built-in front-end.
pub fn load_file(path: impl AsRef<Path>) -> Result<Config, Diagnostic> {
    Compiler::default().compile_file(path.as_ref())
}
