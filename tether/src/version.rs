use std::sync::OnceLock;

/// Package version with the git hash as build metadata, when the build had
/// one: `0.4.0+abc1234`, `0.4.0+abc1234-dirty`, or plain `0.4.0`.
pub fn version_long() -> &'static str {
    static VERSION: OnceLock<String> = OnceLock::new();
    VERSION.get_or_init(|| with_build_metadata(env!("CARGO_PKG_VERSION"), option_env!("TETHER_GIT_HASH")))
}

fn with_build_metadata(version: &str, hash: Option<&str>) -> String {
    match hash.map(str::trim).filter(|h| !h.is_empty()) {
        Some(hash) => format!("{version}+{hash}"),
        None => version.to_string(),
    }
}
