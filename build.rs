// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    // Re-run build script if git HEAD changes
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=DEPTH_COMPOSITE_VERSION");

    // Packagers can pin the version string
    let version = match std::env::var("DEPTH_COMPOSITE_VERSION") {
        Ok(v) => v,
        Err(_) => describe_version(),
    };

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// `git describe` output turned into `<tag>-<hash>` or `<tag>-dirty-<hash>`,
/// falling back to the crate version when git is unavailable.
fn describe_version() -> String {
    let described = run_git(&["describe", "--tags", "--always", "--match", "v*"]);
    let hash = run_git(&["rev-parse", "--short", "HEAD"]);

    let Some(described) = described else {
        let pkg = std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());
        return match hash {
            Some(hash) => format!("{}-{}", pkg, hash),
            None => pkg,
        };
    };

    let described = described.strip_prefix('v').unwrap_or(&described).to_string();
    let parts: Vec<&str> = described.rsplitn(3, '-').collect();
    if parts.len() == 3 {
        // <tag>-<commits>-g<hash>
        let short = parts[0].strip_prefix('g').unwrap_or(parts[0]);
        format!("{}-dirty-{}", parts[2], short)
    } else {
        format!("{}-{}", described, hash.unwrap_or_else(|| "unknown".to_string()))
    }
}

fn run_git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}
