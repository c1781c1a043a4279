// src/tool/detach.rs

use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{anyhow, bail, Context};
use regex::Regex;
use semver::Version;
use tracing::debug;
use walkdir::WalkDir;

use crate::tool::backend::delete_backend_config;
use crate::tool::result::{ToolError, ToolResult};
use crate::tool::session::ToolSession;
use crate::versions::version_matches;

fn terraform_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"terraform\s*\{").expect("terraform block regex"))
}

impl ToolSession {
    /// Disconnect this session's module from its remote state.
    ///
    /// The module is initialized first if needed, so Terraform pulls the
    /// remote state down; then the backend is disabled (`remote config
    /// -disable` before 0.9, backend-block removal plus `init -force-copy`
    /// from 0.9 on). After that, local plans and applies cannot touch the
    /// shared state.
    ///
    /// As a failsafe, detach fails when no local state file exists in the
    /// module directory afterwards.
    pub async fn detach(&self) -> ToolResult {
        debug!(module_dir = ?self.module_dir(), "detaching remote state");

        self.ensure_init().await?;

        let version = self.version_or_tool_err().await?;

        let output = if version_matches(&version, "<0.9") {
            self.run_tool(
                vec![
                    "remote".to_string(),
                    "config".to_string(),
                    "-disable".to_string(),
                ],
                vec![0],
            )
            .await?
        } else {
            self.delete_backend_from_module(&version)
                .map_err(|err| ToolError::new(None, err))?;
            self.run_tool(
                vec!["init".to_string(), "-force-copy".to_string()],
                vec![0],
            )
            .await?
        };

        if !self.module_dir().join("terraform.tfstate").is_file() {
            return Err(ToolError::new(
                Some(output),
                anyhow!("detach failed: terraform.tfstate does not exist"),
            ));
        }

        Ok(output)
    }

    /// Delete the backend configuration from every Terraform file in the
    /// sandbox module directory that declares a `terraform { … }` block.
    ///
    /// The files are hard links into the code root, so each one is unlinked
    /// before the rewritten content is written in place; the original files
    /// are never mutated.
    fn delete_backend_from_module(&self, version: &Version) -> anyhow::Result<()> {
        let candidates = self.backend_config_candidates()?;
        if candidates.is_empty() {
            bail!("cannot find backend configuration in the Terraform files");
        }

        for path in candidates {
            debug!(file = ?path, "deleting backend config");

            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {:?}", path))?;
            let updated = delete_backend_config(&contents, version)
                .with_context(|| format!("rewriting {:?}", path))?;

            std::fs::remove_file(&path).with_context(|| format!("unlinking {:?}", path))?;
            std::fs::write(&path, updated).with_context(|| format!("writing {:?}", path))?;
        }

        Ok(())
    }

    /// Files under the module directory containing a `terraform { … }`
    /// block. Terraform's own scratch directory is not searched; binary
    /// files are skipped.
    fn backend_config_candidates(&self) -> anyhow::Result<Vec<PathBuf>> {
        let mut candidates = Vec::new();

        let walker = WalkDir::new(self.module_dir())
            .into_iter()
            .filter_entry(|e| e.file_name() != ".terraform");

        for entry in walker {
            let entry = entry.context("walking module directory")?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(contents) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            if terraform_block_re().is_match(&contents) {
                candidates.push(entry.path().to_path_buf());
            }
        }

        Ok(candidates)
    }
}
