// src/tool/config.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::model::RemoteConfig;
use crate::errors::{Result, TerradagError};

/// Everything a [`crate::tool::ToolSession`] needs to run one execution.
#[derive(Debug, Clone)]
pub struct ToolSessionConfig {
    /// Module name (for messages; the session directory uses the execution
    /// ID).
    pub name: String,
    /// Root of the Terraform code tree to clone into the sandbox.
    pub code_base_path: PathBuf,
    /// Path of the module inside the code tree.
    pub module_rel_path: String,
    /// Remote state configuration.
    pub remote: RemoteConfig,
    /// Bound variable values passed to plan/apply.
    pub variables: BTreeMap<String, String>,
    /// Terraform binary to run.
    pub tool_binary_path: PathBuf,
    /// Shared plugin cache directory, exported to children when set.
    pub shared_plugin_dir: Option<PathBuf>,
    /// Extra arguments appended to plan/apply invocations.
    pub extra_args: Vec<String>,
}

impl ToolSessionConfig {
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.code_base_path.as_os_str().is_empty() {
            errors.push("base path cannot be empty");
        }
        if self.module_rel_path.is_empty() {
            errors.push("module path cannot be empty");
        }
        if self.tool_binary_path.as_os_str().is_empty() {
            errors.push("terraform path cannot be empty");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TerradagError::Config(format!(
                "terraform session for {}: {}",
                self.name,
                errors.join("; ")
            )))
        }
    }
}
