//! Build script for the bomscan CLI
//!
//! Writes `built.rs` and exports the values shown by `bomscan --version`.

use std::env;
use std::process::Command;

fn git_commit() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?;
    Some(hash.trim().to_string()).filter(|h| !h.is_empty())
}

fn main() {
    built::write_built_file().expect("Failed to acquire build-time information");

    let commit = env::var("GIT_COMMIT_HASH")
        .ok()
        .or_else(git_commit)
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rerun-if-env-changed=GIT_COMMIT_HASH");
    println!(
        "cargo:rustc-env=BUILT_HOST={}",
        env::var("HOST").unwrap_or_else(|_| "unknown".to_string())
    );
    println!("cargo:rustc-env=BUILT_GIT_COMMIT_HASH={}", commit);
    println!(
        "cargo:rustc-env=BUILT_TIME_UTC={}",
        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
    );
}
