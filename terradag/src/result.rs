// src/result.rs

use crate::tool::{ToolError, ToolOutput};

/// What one execution produced, delivered on the results channel.
///
/// Per-execution failures are never raised as errors from the operation:
/// they ride here, and the operation as a whole is considered failed when
/// any result carries one. An execution that was skipped because a
/// dependency failed produces no result at all.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub id: String,
    /// Output of the last Terraform command that ran, when one did.
    pub tool: Option<ToolOutput>,
    /// The failure, when there was one. Process failures already lead with
    /// the child's stderr; callers must not print the stderr again.
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn ok(id: impl Into<String>, tool: ToolOutput) -> Self {
        Self {
            id: id.into(),
            tool: Some(tool),
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            id: id.into(),
            tool: None,
            error: Some(error.to_string()),
        }
    }

    pub fn from_tool_error(id: impl Into<String>, error: ToolError) -> Self {
        Self {
            id: id.into(),
            error: Some(error.to_string()),
            tool: error.output,
        }
    }

    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }
}
