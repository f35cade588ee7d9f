use std::path::Path;
use std::process::Command;

/// Stamps `TETHER_GIT_HASH` for `--version`. A packager can pin it by
/// exporting the variable; otherwise it comes from `git describe`.
fn main() {
    println!("cargo:rerun-if-env-changed=TETHER_GIT_HASH");

    let hash = std::env::var("TETHER_GIT_HASH")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .or_else(describe);
    if let Some(hash) = hash {
        println!("cargo:rustc-env=TETHER_GIT_HASH={}", hash.trim());
    }

    let git_dir = Path::new("../.git");
    if git_dir.exists() {
        println!("cargo:rerun-if-changed=../.git/HEAD");
        println!("cargo:rerun-if-changed=../.git/index");
    }
}

/// `abc1234`, or `abc1234-dirty` with uncommitted changes.
fn describe() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=7", "--exclude=*"])
        .output()
        .ok()
        .filter(|o| o.status.success())?;
    let hash = String::from_utf8(output.stdout).ok()?;
    let hash = hash.trim();
    (!hash.is_empty()).then(|| hash.to_string())
}
