use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tether_lang::{HeaderRewriteRule, RuleSet};
use tracing::{Level, debug, info, instrument};

use crate::enforce::{PolicyChecker, ProxyPublisher, ProxySink, ProxyUpdater};
use crate::policy::{Compiler, Config, Diagnostic, PolicyManager, Watcher, ensure_default_file};
use crate::settings::{Overrides, TetherSettings};
use crate::style;

/// Load the policy, wire a manager, and hot-reload until Ctrl-C.
#[instrument(level = Level::TRACE)]
pub fn run(file: Option<PathBuf>, interval_ms: Option<u64>, rules: Vec<String>) -> Result<()> {
    let settings = TetherSettings::load_with(&Overrides {
        policy_path: file,
        poll_interval_ms: interval_ms,
    })?;
    let path = settings.require_policy_path()?.to_path_buf();

    let compiler = Compiler::default();
    let config = load_or_create(&path, &compiler)?;
    let watcher = Watcher::from_config(&config, compiler)?;

    let proxy = ProxyPublisher::new(LoggingProxy);
    let manager = Arc::new(PolicyManager::new(
        |rules: &RuleSet| -> anyhow::Result<()> {
            debug!(rules = rules.len(), "no kernel enforcement attached");
            Ok(())
        },
        move |rules: &RuleSet, http: &[HeaderRewriteRule]| {
            println!("{}", style::header("active policy"));
            super::print_lines(rules, http);
            proxy.update_proxy(rules, http);
        },
    ));

    let (file_rules, http) = config.into_parts();
    manager.update_file_layer(file_rules, http)?;
    for rule in &rules {
        manager
            .add_runtime_rule(rule)
            .with_context(|| format!("invalid --rule {rule:?}"))?;
    }

    let handle = watcher.spawn_managed(
        settings.poll_interval(),
        Arc::clone(&manager),
        |d: &Diagnostic| eprintln!("{}", d.render_cli()),
    )?;
    info!(path = %path.display(), interval_ms = settings.poll_interval_ms, "watching policy");
    eprintln!(
        "{}",
        style::err_dim(&format!("watching {} (Ctrl-C to stop)", path.display()))
    );

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(tokio::signal::ctrl_c())
        .context("failed to listen for Ctrl-C")?;

    handle.stop();
    info!("watch stopped");
    Ok(())
}

/// Compile the policy at `path`, writing the default policy first when the
/// file does not exist yet.
fn load_or_create(path: &Path, compiler: &Compiler) -> Result<Config, Diagnostic> {
    if ensure_default_file(path)? {
        eprintln!(
            "{}",
            style::err_dim(&format!("created default policy at {}", path.display()))
        );
    }
    compiler.compile_file(path)
}

/// Stand-in for the network proxy: logs what it would have installed.
#[derive(Debug)]
struct LoggingProxy;

impl ProxySink for LoggingProxy {
    fn set_header_rewrite_rules(&self, rules: Vec<HeaderRewriteRule>) {
        debug!(rewrites = rules.len(), "proxy header rewrites installed");
    }

    fn set_policy_checker(&self, checker: PolicyChecker) {
        debug!(
            connect_rules = checker.connect_rule_count(),
            tool_rules = checker.has_tool_rules(),
            default_allow = checker.default_allow(),
            "proxy policy checker installed"
        );
    }
}
