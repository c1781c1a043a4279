// src/tool/apply.rs

use crate::tool::result::ToolResult;
use crate::tool::session::ToolSession;
use crate::versions::version_matches;

impl ToolSession {
    /// Run `terraform apply`.
    ///
    /// From 0.11 on, `-auto-approve` is required for unattended applies.
    pub async fn apply(&self) -> ToolResult {
        self.ensure_init().await?;
        self.ensure_workspace().await?;

        let version = self.version_or_tool_err().await?;

        let mut args = vec!["apply".to_string()];
        if version_matches(&version, ">=0.11") {
            args.push("-auto-approve".to_string());
        }
        args.extend(self.variable_args());
        args.extend(self.config.extra_args.iter().cloned());

        self.run_tool(args, vec![0]).await
    }
}
