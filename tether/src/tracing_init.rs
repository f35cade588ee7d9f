use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;

use crate::settings::TetherSettings;

/// Log path: `TETHER_LOG` > configured `log_path` > `<settings dir>/tether.log`.
fn resolve_log_path(
    env: Option<OsString>,
    configured: Option<PathBuf>,
    settings_dir: Option<PathBuf>,
) -> PathBuf {
    env.filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or(configured.filter(|p| !p.as_os_str().is_empty()))
        .unwrap_or_else(|| {
            settings_dir
                .map(|d| d.join("tether.log"))
                .unwrap_or_else(|| PathBuf::from("tether.log"))
        })
}

fn open_log(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).ok()?;
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

/// The file log takes everything the daemon does; stderr is for operators
/// and stays at INFO unless `-v` asks for more.
fn level(to_file: bool, verbose: bool) -> Level {
    match (to_file, verbose) {
        (true, true) => Level::TRACE,
        (true, false) => Level::DEBUG,
        (false, true) => Level::DEBUG,
        (false, false) => Level::INFO,
    }
}

pub fn init_tracing(configured: Option<PathBuf>, verbose: bool) {
    let log_path = resolve_log_path(
        std::env::var_os("TETHER_LOG"),
        configured,
        TetherSettings::settings_dir(),
    );

    let log_file = open_log(&log_path);
    let fell_back = log_file.is_none();

    let layer: Box<dyn Layer<_> + Send + Sync> = match log_file {
        Some(file) => tracing_subscriber::fmt::layer()
            .with_writer(file)
            .pretty()
            .with_ansi(false)
            .with_filter(LevelFilter::from_level(level(true, verbose)))
            .boxed(),
        None => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_target(false)
            .with_ansi(console::colors_enabled_stderr())
            .with_filter(LevelFilter::from_level(level(false, verbose)))
            .boxed(),
    };

    tracing_subscriber::registry().with(layer).init();
    if fell_back {
        tracing::warn!(path = %log_path.display(), "log file unavailable, logging to stderr");
    }
}
