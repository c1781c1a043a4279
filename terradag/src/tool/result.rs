// src/tool/result.rs

use std::time::Duration;

use thiserror::Error;

use crate::exec::ProcessRunner;

/// Captured output of one Terraform invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub runtime: Duration,
    pub exit_code: i32,
    /// Present when this output came from a plan.
    pub plan: Option<PlanSummary>,
}

impl ToolOutput {
    pub(crate) fn from_runner(runner: &ProcessRunner) -> Self {
        Self {
            stdout: runner.stdout(),
            stderr: runner.stderr(),
            runtime: runner.runtime(),
            exit_code: runner.exit_code(),
            plan: None,
        }
    }

    /// Runtime truncated to whole seconds, for display.
    pub fn runtime_display(&self) -> String {
        format!("{}s", self.runtime.as_secs())
    }
}

/// What a plan found out.
#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub has_changes: bool,
    changes: String,
}

impl PlanSummary {
    pub fn new(has_changes: bool, changes: String) -> Self {
        Self {
            has_changes,
            changes,
        }
    }

    /// The textual change description, trimmed.
    pub fn changes(&self) -> &str {
        self.changes.trim()
    }
}

/// A failed Terraform step. Carries whatever output the step produced, so
/// the caller can still surface stdout/stderr of the failed command.
#[derive(Debug, Error)]
#[error("{cause}")]
pub struct ToolError {
    pub output: Option<ToolOutput>,
    pub cause: anyhow::Error,
}

impl ToolError {
    pub fn new(output: Option<ToolOutput>, cause: anyhow::Error) -> Self {
        Self { output, cause }
    }
}

pub type ToolResult = std::result::Result<ToolOutput, ToolError>;
