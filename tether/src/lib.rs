//! tether: policy core for an agent-sandboxing daemon.
//!
//! - [`policy`] compiles policy files, merges the file layer with runtime
//!   rules, publishes the active rule set, and hot-reloads on edits.
//! - [`enforce`] defines the seams the active rule set is published to.
//! - [`settings`] loads daemon configuration.
//!
//! The `tether` binary wraps these in a small CLI (`check`, `watch`, `lines`).

pub mod cli;
pub mod cmd;
pub mod enforce;
pub mod errors;
pub mod policy;
pub mod settings;
pub mod style;
pub mod tracing_init;
pub mod version;
