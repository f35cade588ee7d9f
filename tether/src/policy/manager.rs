//! Layered policy state and publication.
//!
//! [`PolicyManager`] owns a file layer, a runtime layer, and the runtime-only
//! flag. Every mutation recomputes the merged rule set from that state and
//! pushes it to the kernel updater, then the proxy updater.
//!
//! Writers serialize on a publish mutex, so publishes are delivered in
//! mutation order and each one reflects exactly one consistent state.
//! Readers only take the state read lock and always get owned copies.

use std::sync::{Mutex, PoisonError, RwLock};

use tether_lang::{HeaderRewriteRule, RuleParseError, RuleSet, RuntimeRule};
use tracing::{Level, debug, info, instrument, warn};

use super::merge::{Layer, merge_layers, raises_explicit_file_deny};
use crate::enforce::{KernelUpdater, ProxyUpdater};

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("invalid runtime rule: {0}")]
    InvalidRule(#[from] RuleParseError),

    #[error("kernel enforcement update failed")]
    Kernel(#[source] anyhow::Error),
}

impl ManagerError {
    pub fn help(&self) -> Option<String> {
        match self {
            ManagerError::InvalidRule(e) => e.help(),
            ManagerError::Kernel(_) => Some(
                "The proxy was still updated; kernel enforcement keeps its previous rules.".into(),
            ),
        }
    }
}

/// Defensive copies of both layers, for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub file: Layer,
    pub runtime: Layer,
    pub runtime_only: bool,
}

#[derive(Debug, Default)]
struct State {
    file: Layer,
    runtime: Layer,
    runtime_only: bool,
}

impl State {
    fn merged(&self) -> Layer {
        merge_layers(&self.file, &self.runtime, self.runtime_only)
    }
}

pub struct PolicyManager {
    state: RwLock<State>,
    publish_lock: Mutex<()>,
    kernel: Box<dyn KernelUpdater>,
    proxy: Box<dyn ProxyUpdater>,
}

impl std::fmt::Debug for PolicyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyManager")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl PolicyManager {
    /// Create a manager with empty layers. Nothing is published until the
    /// first mutation.
    pub fn new(kernel: impl KernelUpdater + 'static, proxy: impl ProxyUpdater + 'static) -> Self {
        Self {
            state: RwLock::new(State::default()),
            publish_lock: Mutex::new(()),
            kernel: Box::new(kernel),
            proxy: Box::new(proxy),
        }
    }

    /// Replace the file-derived layer.
    pub fn update_file_layer(
        &self,
        rules: RuleSet,
        http: Vec<HeaderRewriteRule>,
    ) -> Result<(), ManagerError> {
        self.apply("file", |state| state.file = Layer::new(rules, http))
    }

    /// Parse one runtime rule line and append it to the runtime layer.
    #[instrument(level = Level::TRACE, skip(self))]
    pub fn add_runtime_rule(&self, text: &str) -> Result<(), ManagerError> {
        let rule: RuntimeRule = text.parse()?;
        self.apply("runtime", move |state| {
            let rt = &mut state.runtime;
            match rule {
                RuntimeRule::Access(r) => rt.rules.push(r),
                RuntimeRule::Tool(t) => rt.rules.tools.push(t),
                RuntimeRule::Rewrite(h) => rt.http.push(h),
                RuntimeRule::ConnectDefault { allow } => {
                    rt.rules.connect_default_allow = allow;
                    rt.rules.connect_default_explicit = true;
                }
            }
        })
    }

    /// Parse one runtime rule line and remove every runtime entry with the
    /// same canonical form. Removing an absent rule still republishes.
    #[instrument(level = Level::TRACE, skip(self))]
    pub fn remove_runtime_rule(&self, text: &str) -> Result<(), ManagerError> {
        let rule: RuntimeRule = text.parse()?;
        self.apply("runtime", move |state| {
            let rt = &mut state.runtime;
            match rule {
                RuntimeRule::Access(r) => {
                    let key = r.to_string();
                    let keep = |x: &tether_lang::AccessRule| x.to_string() != key;
                    rt.rules.open.retain(keep);
                    rt.rules.exec.retain(keep);
                    rt.rules.connect.retain(keep);
                }
                RuntimeRule::Tool(t) => rt.rules.tools.retain(|x| x.key() != t.key()),
                RuntimeRule::Rewrite(h) => {
                    let key = h.to_string();
                    rt.http.retain(|x| x.to_string() != key);
                }
                RuntimeRule::ConnectDefault { .. } => {
                    rt.rules.connect_default_allow = false;
                    rt.rules.connect_default_explicit = false;
                }
            }
        })
    }

    /// Atomically replace the whole runtime layer.
    pub fn replace_runtime_layer(
        &self,
        rules: RuleSet,
        http: Vec<HeaderRewriteRule>,
    ) -> Result<(), ManagerError> {
        self.apply("runtime", |state| state.runtime = Layer::new(rules, http))
    }

    /// Exclude (or re-include) the file layer from the active merge. The file
    /// layer itself is kept.
    pub fn set_runtime_only(&self, enabled: bool) -> Result<(), ManagerError> {
        self.apply("runtime-only", |state| state.runtime_only = enabled)
    }

    pub fn runtime_only(&self) -> bool {
        self.read_state().runtime_only
    }

    /// The merged rule set, recomputed from the current layers.
    pub fn get_active_rules(&self) -> (RuleSet, Vec<HeaderRewriteRule>) {
        let merged = self.read_state().merged();
        (merged.rules, merged.http)
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.read_state();
        Snapshot {
            file: state.file.clone(),
            runtime: state.runtime.clone(),
            runtime_only: state.runtime_only,
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, source: &'static str, mutate: impl FnOnce(&mut State)) -> Result<(), ManagerError> {
        let _publishing = self.publish_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let merged = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            mutate(&mut state);
            if raises_explicit_file_deny(&state.file, &state.runtime, state.runtime_only) {
                warn!(
                    source,
                    "runtime rules raise the connect default to allow over the policy file's explicit deny"
                );
            }
            state.merged()
        };
        self.publish(source, &merged)
    }

    fn publish(&self, source: &'static str, merged: &Layer) -> Result<(), ManagerError> {
        let rules = &merged.rules;
        let kernel = self.kernel.update_runtime_rules(rules);
        if let Err(e) = &kernel {
            warn!(source, error = %e, "kernel enforcement update failed; updating proxy anyway");
        }
        self.proxy.update_proxy(rules, &merged.http);

        info!(
            source,
            open = rules.open.len(),
            exec = rules.exec.len(),
            connect = rules.connect.len(),
            tools = rules.tools.len(),
            http = merged.http.len(),
            "published active policy"
        );
        debug!(
            source,
            default_allow = rules.connect_default_allow,
            explicit = rules.connect_default_explicit,
            "connect default"
        );
        kernel.map_err(ManagerError::Kernel)
    }
}
