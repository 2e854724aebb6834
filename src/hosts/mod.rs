//! Hosts-file advisory check.
//!
//! Pointing the well-known provider hostnames at loopback lets unmodified
//! client SDKs talk to this gateway without any base-URL configuration. At
//! startup the gateway offers (never forces) to append the overrides.
//!
//! The confirmation is an injected capability so the flow is testable
//! without a real terminal; failures are logged by the caller and never
//! fatal, and the whole check is skippable via configuration.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Provider hostnames the gateway can impersonate via loopback overrides.
pub const UPSTREAM_HOSTNAMES: [&str; 2] = ["api.anthropic.com", "api.openai.com"];

/// Platform hosts-file location.
pub fn default_hosts_path() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\Windows\System32\drivers\etc\hosts")
    } else {
        PathBuf::from("/etc/hosts")
    }
}

/// Check the hosts file for the provider hostnames and, on consent, append
/// loopback overrides for the missing ones.
///
/// Returns `Ok(true)` if the file was modified.
pub fn advisory_check(path: &Path, confirm: impl FnOnce(&str) -> bool) -> Result<bool> {
    let content = std::fs::read_to_string(path)?;

    let missing: Vec<&str> = UPSTREAM_HOSTNAMES
        .iter()
        .filter(|hostname| !has_entry(&content, hostname))
        .copied()
        .collect();

    if missing.is_empty() {
        return Ok(false);
    }

    let prompt = format!(
        "{} is missing loopback overrides for {}. Add them? (y/n)",
        path.display(),
        missing.join(", ")
    );
    if !confirm(&prompt) {
        return Ok(false);
    }

    let mut file = OpenOptions::new().append(true).open(path)?;
    for hostname in missing {
        writeln!(file, "127.0.0.1 {hostname}")?;
    }
    Ok(true)
}

/// An uncommented line mentioning the hostname counts as an entry.
fn has_entry(content: &str, hostname: &str) -> bool {
    content
        .lines()
        .any(|line| !line.trim_start().starts_with('#') && line.contains(hostname))
}

/// Interactive confirmation on stdin.
pub fn stdin_confirm(prompt: &str) -> bool {
    println!("{prompt}");
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
