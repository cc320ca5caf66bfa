//! Stamps the tsplay version string.
//!
//! `TSPLAY_BUILD_DATE` is always set. Dev builds also get `VERGEN_GIT_SHA`;
//! builds with the `release` feature leave it out so the version stays clean.

use std::process::Command;

/// Today's date as `YYYY-MM-DD`, or `unknown` without a usable `date`.
fn build_date() -> String {
    Command::new("date")
        .arg("+%Y-%m-%d")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(not(feature = "release"))]
fn emit_git_sha() {
    use vergen_gitcl::{Emitter, GitclBuilder};

    let emitted = GitclBuilder::default()
        .sha(true)
        .build()
        .map_err(|e| e.to_string())
        .and_then(|git| {
            Emitter::default()
                .add_instructions(&git)
                .and_then(|emitter| emitter.emit())
                .map_err(|e| e.to_string())
        });

    // Source tarballs have no git metadata.
    if let Err(reason) = emitted {
        println!("cargo:warning=git SHA unavailable: {}", reason);
        println!("cargo:rustc-env=VERGEN_GIT_SHA=unknown");
    }
}

fn main() {
    println!("cargo:rustc-env=TSPLAY_BUILD_DATE={}", build_date());

    #[cfg(not(feature = "release"))]
    emit_git_sha();
}
