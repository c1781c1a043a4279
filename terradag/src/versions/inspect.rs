// src/versions/inspect.rs

use std::path::Path;
use std::sync::OnceLock;

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use semver::{Version, VersionReq};
use tracing::debug;

fn version_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"v(\d+\.\d+\.\d+)").expect("version token regex"))
}

/// Find out what version the Terraform binary at `binary_path` identifies
/// itself as, by running `<binary> version` and parsing the first line of
/// output (e.g. `Terraform v0.11.7`).
pub async fn inspect_version(binary_path: &Path) -> Result<Version> {
    let output = tokio::process::Command::new(binary_path)
        .arg("version")
        .output()
        .await
        .with_context(|| format!("running {:?} version", binary_path))?;

    if !output.status.success() {
        bail!(
            "{:?} version exited with {:?}",
            binary_path,
            output.status.code()
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let version = parse_version_output(&stdout)?;
    debug!(%version, binary = ?binary_path, "inspected terraform version");
    Ok(version)
}

/// Parse the output of `terraform version`.
///
/// The output must have at least two lines (the version line is followed by
/// at least a trailing newline) and the first line must contain a `vX.Y.Z`
/// token. The two failure shapes produce distinguishable errors.
pub fn parse_version_output(output: &str) -> Result<Version> {
    let mut parts = output.splitn(2, '\n');
    let first_line = parts.next().unwrap_or_default();
    if parts.next().is_none() {
        bail!("unable to read lines from version output: {output:?}");
    }

    let captures = version_token_re()
        .captures(first_line)
        .ok_or_else(|| anyhow!("unable to parse version from output line: {first_line:?}"))?;

    Version::parse(&captures[1])
        .with_context(|| format!("invalid version number in output line: {first_line:?}"))
}

/// Parse a version string, tolerating missing minor/patch components
/// ("0.11" means "0.11.0").
pub fn parse_version_lenient(input: &str) -> Result<Version> {
    let trimmed = input.trim().trim_start_matches('v');
    let mut parts = trimmed.splitn(3, '.');

    let major = parts.next().unwrap_or_default();
    let minor = parts.next().unwrap_or("0");
    let patch = parts.next().unwrap_or("0");

    Version::parse(&format!("{major}.{minor}.{patch}"))
        .with_context(|| format!("invalid version string: {input:?}"))
}

/// Whether `version` satisfies a requirement like `">=0.10"` or `"<0.12"`.
/// A malformed requirement never matches.
pub fn version_matches(version: &Version, requirement: &str) -> bool {
    match VersionReq::parse(requirement) {
        Ok(req) => req.matches(version),
        Err(_) => false,
    }
}
