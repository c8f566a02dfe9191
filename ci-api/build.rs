//! Stamps the binary with the values `/info` and the startup banner report

use std::process::Command;

/// Short commit id of the checkout, if built from one
fn commit_id() -> Option<String> {
    let output = Command::new("git").args(["rev-parse", "--short=8", "HEAD"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let id = String::from_utf8(output.stdout).ok()?;
    Some(id.trim().to_owned()).filter(|id| !id.is_empty())
}

fn main() {
    let stamps = [
        ("GIT_HASH", commit_id().unwrap_or_else(|| "unknown".into())),
        (
            "BUILD_TIMESTAMP",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        ),
        ("BUILD_PROFILE", std::env::var("PROFILE").unwrap_or_else(|_| "unknown".into())),
    ];

    for (name, value) in stamps {
        println!("cargo:rustc-env={name}={value}");
    }
}
