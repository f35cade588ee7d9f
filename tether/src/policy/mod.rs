//! Policy core: compile, merge, publish, and hot-reload.
//!
//! Data flows one way: a file edit is picked up by the [`Watcher`], compiled
//! by the [`Compiler`] into a [`Config`], applied to the [`PolicyManager`]'s
//! file layer, merged with the runtime layer, and published to the
//! enforcement seams in [`crate::enforce`].

pub mod compile;
pub mod diagnostic;
pub mod loader;
pub mod manager;
pub mod merge;
pub mod watcher;

pub use compile::{CedarFrontend, Compiler, Frontend};
pub use diagnostic::{Diagnostic, DiagnosticCode};
pub use loader::{Config, DEFAULT_POLICY, ensure_default_file, load_file};
pub use manager::{ManagerError, PolicyManager, Snapshot};
pub use merge::{Layer, merge_layers};
pub use watcher::{Tick, WatchHandle, Watcher};
