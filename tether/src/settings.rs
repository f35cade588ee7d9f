use std::path::{Path, PathBuf};
use std::time::Duration;

use dirs::home_dir;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::policy::Diagnostic;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to load settings")]
    Figment(#[source] Box<figment::Error>),

    #[error("poll interval must be greater than zero")]
    InvalidInterval,

    #[error("no policy file configured")]
    MissingPolicyPath(#[source] Box<Diagnostic>),
}

impl From<figment::Error> for SettingsError {
    fn from(e: figment::Error) -> Self {
        SettingsError::Figment(Box::new(e))
    }
}

impl SettingsError {
    pub fn help(&self) -> Option<String> {
        match self {
            SettingsError::Figment(_) => Some(format!(
                "check {} and TETHER_* environment variables",
                TetherSettings::settings_file()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "settings.json".into())
            )),
            SettingsError::InvalidInterval => Some("set poll_interval_ms to 1 or more".into()),
            SettingsError::MissingPolicyPath(_) => {
                Some("pass a policy file or set TETHER_POLICY_PATH".into())
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TetherSettings {
    /// Policy file to compile and watch.
    pub policy_path: PathBuf,

    /// How often the watcher stats the policy file.
    pub poll_interval_ms: u64,

    /// Log file; `TETHER_LOG` takes precedence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
}

impl Default for TetherSettings {
    fn default() -> Self {
        Self {
            policy_path: Self::policy_file().unwrap_or_default(),
            poll_interval_ms: 1000,
            log_path: None,
        }
    }
}

/// Values that take precedence over every other source, typically from
/// command-line flags.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
}

impl TetherSettings {
    pub fn settings_dir() -> Option<PathBuf> {
        home_dir().map(|h| h.join(".tether"))
    }

    pub fn settings_file() -> Option<PathBuf> {
        Self::settings_dir().map(|d| d.join("settings.json"))
    }

    pub fn policy_file() -> Option<PathBuf> {
        Self::settings_dir().map(|d| d.join("policy.cedar"))
    }

    /// Load from defaults, `~/.tether/settings.json`, then `TETHER_*`.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_with(&Overrides::default())
    }

    pub fn load_with(overrides: &Overrides) -> Result<Self, SettingsError> {
        Self::figment(Self::settings_file().as_deref(), overrides)
            .extract::<Self>()?
            .validated()
    }

    fn figment(file: Option<&Path>, overrides: &Overrides) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = file.filter(|p| p.exists()) {
            debug!(path = %path.display(), "loading settings file");
            figment = figment.merge(Json::file(path));
        }
        figment
            .merge(Env::prefixed("TETHER_").ignore(&["log"]))
            .merge(Serialized::defaults(overrides))
    }

    fn validated(self) -> Result<Self, SettingsError> {
        if self.poll_interval_ms == 0 {
            return Err(SettingsError::InvalidInterval);
        }
        Ok(self)
    }

    /// The configured policy path, or a `config` diagnostic when blank.
    pub fn require_policy_path(&self) -> Result<&Path, SettingsError> {
        if self.policy_path.as_os_str().is_empty() {
            return Err(SettingsError::MissingPolicyPath(Box::new(Diagnostic::config(
                "missing policy file path",
                "no policy file path provided",
                "Pass a policy file or set TETHER_POLICY_PATH.",
            ))));
        }
        Ok(&self.policy_path)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
