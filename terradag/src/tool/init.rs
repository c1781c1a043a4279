// src/tool/init.rs

use anyhow::anyhow;
use tracing::debug;

use crate::tool::result::{ToolError, ToolResult};
use crate::tool::session::ToolSession;
use crate::versions::version_matches;

impl ToolSession {
    /// Initialize the Terraform module. This has to happen before plan or
    /// apply can run.
    ///
    /// Terraform older than 0.9 with no remote backend needs no init at
    /// all, so the session skips straight to `get`. Otherwise the argument
    /// shape depends on the version: `remote config` for pre-0.9 remotes,
    /// `init -input=false` from 0.9 on. Either way, a successful init is
    /// followed by `get` to fetch module dependencies.
    pub async fn init(&self) -> ToolResult {
        debug!(module_dir = ?self.module_dir(), "initializing module");

        let version = self.version_or_tool_err().await?;
        let legacy = version_matches(&version, "<0.9");

        if legacy && self.remote_backend().is_none() {
            return self.get().await;
        }

        let args = if legacy {
            self.init_args_legacy()
        } else {
            self.init_args_modern()
                .map_err(|err| ToolError::new(None, err))?
        };

        self.run_tool(args, vec![0]).await?;
        self.get().await
    }

    /// Fetch module dependencies.
    pub async fn get(&self) -> ToolResult {
        self.run_tool(vec!["get".to_string()], vec![0]).await
    }

    /// `remote config` arguments for Terraform older than 0.9, where the
    /// backend was configured on the command line.
    fn init_args_legacy(&self) -> Vec<String> {
        let mut args = vec!["remote".to_string(), "config".to_string()];

        if let Some(backend) = self.remote_backend() {
            args.push("-backend".to_string());
            args.push(backend.to_string());
        }

        for (key, value) in &self.config.remote.backend_config {
            args.push(format!("-backend-config={key}={value}"));
        }

        args
    }

    /// `init` arguments for Terraform 0.9 and later. A backend *name* is
    /// rejected here: from 0.9 on it must live in the Terraform code
    /// itself, only `-backend-config` values may be passed.
    fn init_args_modern(&self) -> anyhow::Result<Vec<String>> {
        if self.remote_backend().is_some() {
            return Err(anyhow!(
                "backend configuration was specified but is not compatible with Terraform 0.9.x and later"
            ));
        }

        let mut args = vec!["init".to_string()];

        for (key, value) in &self.config.remote.backend_config {
            args.push(format!("-backend-config={key}={value}"));
        }

        // -input=false makes Terraform error out instead of prompting (and
        // hanging) when it would normally ask for input.
        args.push("-input=false".to_string());

        Ok(args)
    }
}
