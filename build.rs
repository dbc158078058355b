// SPDX-License-Identifier: MPL-2.0

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=QUADCAM_VERSION");

    // Packagers may pin the version
    let version = std::env::var("QUADCAM_VERSION").unwrap_or_else(|_| git_version());
    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// "0.2.0" at a tag, "0.2.0+5.abcdef1" past it, the package version without git
fn git_version() -> String {
    let fallback = env!("CARGO_PKG_VERSION").to_string();
    let Some(described) = git(&["describe", "--tags", "--long", "--match", "v*"]) else {
        return match git(&["rev-parse", "--short", "HEAD"]) {
            Some(hash) => format!("{}+{}", fallback, hash),
            None => fallback,
        };
    };

    // v<version>-<commits>-g<hash>
    let mut parts = described.rsplitn(3, '-');
    let (Some(hash), Some(commits), Some(tag)) = (parts.next(), parts.next(), parts.next()) else {
        return fallback;
    };
    let tag = tag.strip_prefix('v').unwrap_or(tag);
    let hash = hash.strip_prefix('g').unwrap_or(hash);
    if commits == "0" {
        tag.to_string()
    } else {
        format!("{}+{}.{}", tag, commits, hash)
    }
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}
