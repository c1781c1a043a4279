// src/hooks.rs

//! Execution of user-configured lifecycle hooks.
//!
//! A hook is a shell-quoted command line. Its program is resolved on `PATH`
//! (unless given as a path), it inherits stdin and stderr so interactive
//! scripts (e.g. MFA prompts) keep working, and its stdout is captured.
//! When `set_env` is set and the hook exits zero, stdout lines of the form
//! `KEY=VALUE` are injected into the process environment; scanning stops
//! silently at the first line that does not match.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{anyhow, bail, Context, Result};
use parking_lot::Mutex;
use tokio::process::Command;
use tracing::debug;

use crate::config::model::HookSpec;

/// Hooks may run concurrently from parallel executions; environment
/// injection is serialised so writes do not interleave.
static ENV_INJECTION: Mutex<()> = Mutex::new(());

/// Run a hook to completion in `working_dir`.
pub async fn run_hook(working_dir: &Path, hook: &HookSpec) -> Result<()> {
    debug!(command = %hook.command, "running hook");

    let words = shell_words::split(&hook.command)
        .with_context(|| format!("parsing hook command: {}", hook.command))?;
    let (program, args) = words
        .split_first()
        .ok_or_else(|| anyhow!("empty hook command"))?;

    let program = resolve_program(program)?;

    let output = Command::new(&program)
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::inherit())
        .stderr(Stdio::inherit())
        .stdout(Stdio::piped())
        .output()
        .await
        .with_context(|| format!("running hook {:?}", program))?;

    if !output.status.success() {
        bail!(
            "hook {:?} exited with {}",
            hook.command,
            output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string())
        );
    }

    if hook.set_env {
        let stdout = String::from_utf8_lossy(&output.stdout);
        inject_env(&stdout);
    }

    Ok(())
}

/// Resolve the hook program: explicit paths are used as-is, bare words are
/// looked up on `PATH`.
fn resolve_program(program: &str) -> Result<PathBuf> {
    if program.contains(std::path::MAIN_SEPARATOR) {
        return Ok(PathBuf::from(program));
    }
    which::which(program).with_context(|| format!("hook command {program:?} not found on PATH"))
}

/// Scan hook stdout for `KEY=VALUE` lines and set them as environment
/// variables. Processing stops at the first line that does not conform;
/// that is not an error.
pub fn inject_env(stdout: &str) {
    let _guard = ENV_INJECTION.lock();

    for (key, value) in parse_env_pairs(stdout) {
        debug!(key = %key, "setting environment variable from hook output");
        std::env::set_var(key, value);
    }
}

/// The `KEY=VALUE` prefix of the given hook output: pairs are collected
/// until the first line that is not one.
pub fn parse_env_pairs(stdout: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    for line in stdout.lines() {
        let Some((key, value)) = line.split_once('=') else {
            break;
        };
        if key.is_empty() {
            break;
        }
        pairs.push((key.to_string(), value.to_string()));
    }

    pairs
}
