//! Polling hot-reload of the policy file.
//!
//! The watcher stats the file on a fixed interval and recompiles when the
//! modification time moves past the last successfully applied one. A failed
//! compile never reaches `on_update`; the previous configuration stays in
//! force and the failure is reported once per distinct mtime.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::compile::Compiler;
use super::diagnostic::Diagnostic;
use super::loader::Config;
use super::manager::PolicyManager;

/// Outcome of one [`Watcher::tick`].
#[derive(Debug)]
pub enum Tick {
    /// The file has not changed since the last applied configuration.
    Unchanged,
    /// The file changed and compiled cleanly.
    Updated(Config),
    /// The file changed but failed to compile. `notify` is false when this
    /// exact mtime already failed on an earlier tick.
    Failed { diagnostic: Diagnostic, notify: bool },
    /// The file could not be stat'ed. Reported on every tick.
    Unavailable(Diagnostic),
}

#[derive(Debug)]
pub struct Watcher {
    path: PathBuf,
    compiler: Compiler,
    last_success: SystemTime,
    last_error: Option<SystemTime>,
}

fn stat_mtime(path: &Path) -> Result<SystemTime, Diagnostic> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| Diagnostic::io(path, "failed to stat policy file", e))
}

impl Watcher {
    /// Watch `path`, treating its current contents as already applied.
    pub fn new(path: impl Into<PathBuf>, compiler: Compiler) -> Result<Self, Diagnostic> {
        let path = path.into();
        let last_success = stat_mtime(&path)?;
        Ok(Self {
            path,
            compiler,
            last_success,
            last_error: None,
        })
    }

    /// Watch the file a configuration was loaded from, using its recorded
    /// mtime as the baseline.
    pub fn from_config(config: &Config, compiler: Compiler) -> Result<Self, Diagnostic> {
        let Some(path) = config.path() else {
            return Err(Diagnostic::config(
                "missing policy file path",
                "configuration was not loaded from a file",
                "Load the policy with a file path before watching it.",
            ));
        };
        let last_success = match config.modified() {
            Some(t) => t,
            None => stat_mtime(path)?,
        };
        Ok(Self {
            path: path.to_path_buf(),
            compiler,
            last_success,
            last_error: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tick(&mut self) -> Tick {
        let mtime = match stat_mtime(&self.path) {
            Ok(t) => t,
            Err(d) => return Tick::Unavailable(d),
        };
        if mtime <= self.last_success {
            return Tick::Unchanged;
        }

        match self.compiler.compile_file(&self.path) {
            Ok(config) => {
                self.last_success = mtime;
                self.last_error = None;
                Tick::Updated(config)
            }
            Err(diagnostic) => {
                let notify = self.last_error != Some(mtime);
                self.last_error = Some(mtime);
                Tick::Failed { diagnostic, notify }
            }
        }
    }

    /// Run one tick and dispatch its outcome.
    pub fn poll(&mut self, on_update: &mut impl FnMut(Config), on_error: &mut impl FnMut(&Diagnostic)) {
        match self.tick() {
            Tick::Unchanged => {}
            Tick::Updated(config) => {
                info!(path = %self.path.display(), rules = config.rules().len(), "policy reloaded");
                on_update(config);
            }
            Tick::Failed { diagnostic, notify } => {
                if notify {
                    warn!(path = %self.path.display(), error = %diagnostic, "policy failed to compile; keeping previous policy");
                    on_error(&diagnostic);
                } else {
                    debug!(path = %self.path.display(), "policy still failing to compile");
                }
            }
            Tick::Unavailable(diagnostic) => {
                warn!(path = %self.path.display(), error = %diagnostic, "policy file unavailable");
                on_error(&diagnostic);
            }
        }
    }

    /// Poll every `interval` on a background thread until the returned handle
    /// is stopped or dropped. The first poll happens one interval from now.
    pub fn spawn<U, E>(mut self, interval: Duration, mut on_update: U, mut on_error: E) -> io::Result<WatchHandle>
    where
        U: FnMut(Config) + Send + 'static,
        E: FnMut(&Diagnostic) + Send + 'static,
    {
        let interval = interval.max(Duration::from_millis(1));
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = thread::Builder::new()
            .name("policy-watcher".into())
            .spawn(move || {
                rt.block_on(async move {
                    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    tokio::pin!(shutdown_rx);
                    loop {
                        tokio::select! {
                            _ = ticker.tick() => self.poll(&mut on_update, &mut on_error),
                            _ = &mut shutdown_rx => {
                                debug!(path = %self.path.display(), "watcher shutting down");
                                break;
                            }
                        }
                    }
                })
            })?;

        Ok(WatchHandle {
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// [`spawn`](Self::spawn), applying every good configuration to
    /// `manager`'s file layer.
    pub fn spawn_managed<E>(self, interval: Duration, manager: Arc<PolicyManager>, on_error: E) -> io::Result<WatchHandle>
    where
        E: FnMut(&Diagnostic) + Send + 'static,
    {
        self.spawn(
            interval,
            move |config: Config| {
                let (rules, http) = config.into_parts();
                if let Err(e) = manager.update_file_layer(rules, http) {
                    warn!(error = %e, "file layer applied with enforcement error");
                }
            },
            on_error,
        )
    }
}

/// Handle to a running watcher. Stopping (or dropping) it lets any in-flight
/// compile finish, then joins the thread.
#[derive(Debug)]
pub struct WatchHandle {
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WatchHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
