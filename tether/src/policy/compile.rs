//! Compiler: policy text or file → [`Config`], or a [`Diagnostic`] on failure.

use std::error::Error;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tether_lang::{HeaderRewriteRule, RuleSet};
use tracing::{Level, debug, instrument};

use super::diagnostic::Diagnostic;
use super::loader::Config;

/// A policy-language front-end.
///
/// Errors are opaque to the compiler; they are turned into diagnostics by
/// looking for an `at <file>:<line>:<column>` locator in their text.
pub trait Frontend: Send + Sync {
    fn transpile(
        &self,
        name: &str,
        source: &str,
    ) -> Result<(RuleSet, Vec<HeaderRewriteRule>), Box<dyn Error + Send + Sync>>;
}

/// The built-in front-end backed by [`tether_lang::transpile`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CedarFrontend;

impl Frontend for CedarFrontend {
    fn transpile(
        &self,
        name: &str,
        source: &str,
    ) -> Result<(RuleSet, Vec<HeaderRewriteRule>), Box<dyn Error + Send + Sync>> {
        Ok(tether_lang::transpile(name, source)?)
    }
}

/// Compiles policy sources through a [`Frontend`].
#[derive(Clone)]
pub struct Compiler {
    frontend: Arc<dyn Frontend>,
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler").finish_non_exhaustive()
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(Arc::new(CedarFrontend))
    }
}

impl Compiler {
    pub fn new(frontend: Arc<dyn Frontend>) -> Self {
        Self { frontend }
    }

    /// Compile in-memory text. The result has no path or modification time.
    #[instrument(level = Level::TRACE, skip(self, source))]
    pub fn compile_text(&self, name: &str, source: &str) -> Result<Config, Diagnostic> {
        let (rules, http) = self
            .frontend
            .transpile(name, source)
            .map_err(|e| Diagnostic::from_frontend(e, name, source))?;
        debug!(name, rules = rules.len(), http = http.len(), "compiled policy");
        Ok(Config::new(rules, http, source.to_string(), None, None))
    }

    /// Read and compile a policy file, recording its path and modification
    /// time.
    #[instrument(level = Level::TRACE, skip(self))]
    pub fn compile_file(&self, path: &Path) -> Result<Config, Diagnostic> {
        if path.as_os_str().is_empty() || path.to_string_lossy().trim().is_empty() {
            return Err(Diagnostic::config(
                "missing policy file path",
                "no policy file path provided",
                "Provide the path to a policy file.",
            ));
        }
        let source = std::fs::read_to_string(path)
            .map_err(|e| Diagnostic::io(path, "failed to read policy file", e))?;
        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| Diagnostic::io(path, "failed to stat policy file", e))?;

        let name = path.display().to_string();
        let config = self.compile_text(&name, &source)?;
        Ok(config.located(path.to_path_buf(), modified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::DiagnosticCode;
    use std::io::Write;

    const POLICY: &str = r#"permit (principal, action == Action::"FileOpenReadOnly", resource == File::"/etc/hosts");"#;

    #[test]
    fn compile_text_has_no_location() {
        let cfg = Compiler::default().compile_text("p", POLICY).unwrap();
        assert_eq!(cfg.rules().open.len(), 1);
        assert_eq!(cfg.source(), POLICY);
        assert!(cfg.path().is_none());
        assert!(cfg.modified().is_none());
    }

    #[test]
    fn compile_file_records_path_and_mtime() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(POLICY.as_bytes()).unwrap();
        let cfg = Compiler::default().compile_file(file.path()).unwrap();
        assert_eq!(cfg.path(), Some(file.path()));
        assert!(cfg.modified().is_some());
    }

    #[test]
    fn blank_path_is_config_error() {
        let err = Compiler::default().compile_file(Path::new("  ")).unwrap_err();
        assert_eq!(err.code, DiagnosticCode::Config);
        assert_eq!(err.summary, "missing policy file path");
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Compiler::default()
            .compile_file(&dir.path().join("absent.cedar"))
            .unwrap_err();
        assert_eq!(err.code, DiagnosticCode::Io);
        assert!(err.source().is_some());
    }

    #[test]
    fn syntax_error_points_at_file_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{POLICY}\npermit (principal, action resource);\n"
        )
        .unwrap();
        let err = Compiler::default().compile_file(file.path()).unwrap_err();
        assert_eq!(err.code, DiagnosticCode::Parse);
        assert_eq!(err.file, file.path().display().to_string());
        assert_eq!(err.line, 2);
        assert_eq!(err.snippet, "permit (principal, action resource);");
        assert_eq!(err.column, 27);
    }

    #[test]
    fn missing_terminator_is_reported_on_its_own_line() {
        let src = "permit (principal, action == Action::\"NetworkConnect\", resource)\nwhen { resource in [ Host::\"x\" ] }";
        let err = Compiler::default().compile_text("policy.cedar", src).unwrap_err();
        assert_eq!(err.code, DiagnosticCode::Parse);
        assert_eq!(err.line, 2);
        assert_eq!(err.snippet, "when { resource in [ Host::\"x\" ] }");
        assert_eq!(err.file, "policy.cedar");
        assert!(err.render_cli().contains("2 | when { resource in [ Host::\"x\" ] }"));
    }

    struct Failing;

    impl Frontend for Failing {
        fn transpile(
            &self,
            _: &str,
            _: &str,
        ) -> Result<(RuleSet, Vec<HeaderRewriteRule>), Box<dyn Error + Send + Sync>> {
            Err("front-end exploded".into())
        }
    }

    #[test]
    fn custom_frontend_errors_become_diagnostics() {
        let err = Compiler::new(Arc::new(Failing)).compile_text("x", "").unwrap_err();
        assert_eq!(err.summary, "front-end exploded");
        assert_eq!(err.file, "x");
        assert_eq!(err.line, 0);
    }
}
