// src/tool/plan.rs

use std::sync::OnceLock;

use anyhow::anyhow;
use regex::Regex;

use crate::tool::result::{PlanSummary, ToolError, ToolResult};
use crate::tool::session::ToolSession;
use crate::versions::version_matches;

/// Matches the human-readable action list in 0.12+ plan output, delimited
/// by the 72-dash rule Terraform prints after it.
fn changes_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)Terraform will perform the following actions:(.*)-{72}")
            .expect("plan changes regex")
    })
}

impl ToolSession {
    /// Run `terraform plan` with `-detailed-exitcode`.
    ///
    /// Exit code 2 means the plan has changes and is success, not failure.
    /// The change description is obtained by `show`ing the plan file on
    /// pre-0.12 Terraform, or extracted from the plan's stdout on 0.12+.
    pub async fn plan(&self) -> ToolResult {
        self.ensure_init().await?;
        self.ensure_workspace().await?;

        let mut args = vec![
            "plan".to_string(),
            "-detailed-exitcode".to_string(),
            format!("-out={}.plan", self.id()),
        ];
        args.extend(self.variable_args());
        args.extend(self.config.extra_args.iter().cloned());

        let mut output = self.run_tool(args, vec![0, 2]).await?;

        if output.exit_code == 2 {
            let version = self.version_or_tool_err().await?;

            let changes = if version_matches(&version, "<0.12") {
                let shown = self.show(&format!("{}.plan", self.id())).await?;
                shown.stdout
            } else {
                match changes_re().captures(&output.stdout) {
                    Some(captures) => captures[1].to_string(),
                    None => {
                        return Err(ToolError::new(
                            Some(output),
                            anyhow!("unable to parse terraform plan output"),
                        ));
                    }
                }
            };

            output.plan = Some(PlanSummary::new(true, changes));
        } else {
            output.plan = Some(PlanSummary::new(false, String::new()));
        }

        Ok(output)
    }

    /// Render a previously written plan file.
    pub async fn show(&self, plan_file: &str) -> ToolResult {
        self.run_tool(vec!["show".to_string(), plan_file.to_string()], vec![0])
            .await
    }
}
