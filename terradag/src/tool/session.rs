// src/tool/session.rs

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use semver::Version;
use tokio::sync::OnceCell;
use tracing::debug;
use walkdir::WalkDir;

use crate::errors::{Result, TerradagError};
use crate::exec::{Interruptor, ProcessConfig, ProcessRunner};
use crate::tool::config::ToolSessionConfig;
use crate::tool::result::{ToolError, ToolOutput, ToolResult};
use crate::versions::inspect_version;

/// Environment variable Terraform reads to locate its plugin cache.
pub const PLUGIN_CACHE_ENV: &str = "TF_PLUGIN_CACHE_DIR";

/// Wrapper around Terraform commands for a single execution.
///
/// All commands run inside the session's sandbox, a hard-linked clone of
/// the project code tree. Hard links keep the clone cheap; anything that
/// needs to rewrite a file must unlink it first so the original under the
/// code root is never mutated (see [`crate::tool::detach`]).
///
/// State machine: `new → initialized → (planned | applied | detached)`.
/// "initialized" is observable as the `.terraform` directory existing in
/// the module directory.
#[derive(Debug)]
pub struct ToolSession {
    pub(crate) id: String,
    pub(crate) config: ToolSessionConfig,

    pub(crate) base_dir: PathBuf,
    pub(crate) log_dir: PathBuf,
    pub(crate) sandbox_dir: PathBuf,
    pub(crate) module_dir: PathBuf,

    interrupt: Interruptor,
    version_cache: OnceCell<Version>,
}

impl ToolSession {
    /// Create a new Terraform session at `base_dir`. Refuses to reuse a
    /// directory from an earlier session.
    pub async fn create(
        id: impl Into<String>,
        base_dir: PathBuf,
        config: ToolSessionConfig,
        interrupt: Interruptor,
    ) -> Result<Self> {
        let id = id.into();
        config.validate()?;

        if base_dir.exists() {
            return Err(TerradagError::Config(format!(
                "cannot create new session: session already exists at {}",
                base_dir.display()
            )));
        }

        let log_dir = base_dir.join("logs");
        let sandbox_dir = base_dir.join("sandbox");

        for dir in [&base_dir, &log_dir, &sandbox_dir] {
            debug!(dir = ?dir, "mkdir");
            std::fs::create_dir_all(dir).with_context(|| format!("creating {:?}", dir))?;
        }

        debug!(
            from = ?config.code_base_path,
            to = ?sandbox_dir,
            "cloning code tree into sandbox"
        );
        {
            let src = config.code_base_path.clone();
            let dst = sandbox_dir.clone();
            tokio::task::spawn_blocking(move || clone_tree(&src, &dst))
                .await
                .context("sandbox clone task failed")?
                .with_context(|| {
                    format!(
                        "unable to clone tree from {:?} into sandbox",
                        config.code_base_path
                    )
                })?;
        }

        let module_dir = sandbox_dir.join(&config.module_rel_path);

        Ok(Self {
            id,
            config,
            base_dir,
            log_dir,
            sandbox_dir,
            module_dir,
            interrupt,
            version_cache: OnceCell::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sandbox_dir(&self) -> &Path {
        &self.sandbox_dir
    }

    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    /// Whether `terraform init` has been run in this session's module
    /// directory.
    pub fn initialized(&self) -> bool {
        self.module_dir.join(".terraform").is_dir()
    }

    /// The version the session's binary reports, detected once per session
    /// and cached to avoid repeated subprocess spawns.
    pub async fn version(&self) -> std::result::Result<&Version, anyhow::Error> {
        self.version_cache
            .get_or_try_init(|| async {
                inspect_version(&self.config.tool_binary_path)
                    .await
                    .context("unable to detect terraform version")
            })
            .await
    }

    pub(crate) async fn version_or_tool_err(&self) -> std::result::Result<Version, ToolError> {
        match self.version().await {
            Ok(v) => Ok(v.clone()),
            Err(err) => Err(ToolError::new(None, err)),
        }
    }

    /// The remote backend name, when one is configured and non-empty.
    pub(crate) fn remote_backend(&self) -> Option<&str> {
        self.config
            .remote
            .backend
            .as_deref()
            .filter(|b| !b.is_empty())
    }

    /// Build a runner for a Terraform invocation. The log file is named
    /// after the subcommand.
    pub(crate) fn tool_runner(
        &self,
        args: &[String],
        success_exit_codes: Vec<i32>,
    ) -> std::result::Result<ProcessRunner, ToolError> {
        let subcommand = args
            .first()
            .ok_or_else(|| ToolError::new(None, anyhow!("missing terraform arguments")))?;

        let mut env = Vec::new();
        if let Some(plugin_dir) = self.config.shared_plugin_dir.as_ref() {
            env.push((
                PLUGIN_CACHE_ENV.to_string(),
                plugin_dir.to_string_lossy().into_owned(),
            ));
        }

        let config = ProcessConfig {
            command: self.config.tool_binary_path.clone(),
            args: args.to_vec(),
            working_dir: self.module_dir.clone(),
            env,
            combined_log_path: Some(self.log_dir.join(format!("{subcommand}.log"))),
            success_exit_codes,
        };

        Ok(ProcessRunner::new(config, self.interrupt.clone()))
    }

    /// Run a Terraform invocation to completion, capturing its output. On
    /// failure the error still carries the captured output.
    pub(crate) async fn run_tool(
        &self,
        args: Vec<String>,
        success_exit_codes: Vec<i32>,
    ) -> ToolResult {
        let mut runner = self.tool_runner(&args, success_exit_codes)?;
        match runner.run().await {
            Ok(()) => Ok(ToolOutput::from_runner(&runner)),
            Err(err) => Err(ToolError::new(Some(ToolOutput::from_runner(&runner)), err)),
        }
    }

    /// Run init first when the session is not initialized yet.
    pub(crate) async fn ensure_init(&self) -> std::result::Result<(), ToolError> {
        if self.initialized() {
            return Ok(());
        }
        self.init().await.map(|_| ())
    }

    /// `-var name=value` pairs for every bound variable. The `workspace`
    /// variable is special-cased: it selects a Terraform workspace instead
    /// of being passed as a variable (see [`ToolSession::ensure_workspace`]).
    pub(crate) fn variable_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for (name, value) in &self.config.variables {
            if name == "workspace" {
                continue;
            }
            args.push("-var".to_string());
            args.push(format!("{name}={value}"));
        }
        args
    }

    /// Select the Terraform workspace when the execution carries a
    /// `workspace` variable.
    pub(crate) async fn ensure_workspace(&self) -> std::result::Result<(), ToolError> {
        let Some(workspace) = self.config.variables.get("workspace") else {
            return Ok(());
        };

        debug!(workspace = %workspace, "selecting terraform workspace");
        self.run_tool(
            vec![
                "workspace".to_string(),
                "select".to_string(),
                workspace.clone(),
            ],
            vec![0],
        )
        .await
        .map(|_| ())
    }
}

/// Clone the tree at `src` into `dst` using hard links, skipping Terraform
/// scratch state (`.terraform/`, `.terradag/`, `terraform.tfstate*`).
///
/// Hard-linking preserves inode identity for unchanged files; any later
/// rewrite inside the sandbox must unlink first.
pub(crate) fn clone_tree(src: &Path, dst: &Path) -> anyhow::Result<()> {
    let src = src
        .canonicalize()
        .with_context(|| format!("resolving {:?}", src))?;

    let walker = WalkDir::new(&src)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !skip_in_sandbox(entry.file_name()));

    for entry in walker {
        let entry = entry.context("walking code tree")?;
        let rel = entry
            .path()
            .strip_prefix(&src)
            .context("computing relative path in code tree")?;
        let target = dst.join(rel);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("creating {:?}", target))?;
        } else if file_type.is_symlink() {
            let link = std::fs::read_link(entry.path())
                .with_context(|| format!("reading link {:?}", entry.path()))?;
            make_symlink(&link, &target)
                .with_context(|| format!("creating symlink {:?}", target))?;
        } else {
            std::fs::hard_link(entry.path(), &target)
                .with_context(|| format!("hard-linking {:?} to {:?}", entry.path(), target))?;
        }
    }

    Ok(())
}

fn skip_in_sandbox(name: &std::ffi::OsStr) -> bool {
    let name = name.to_string_lossy();
    name == ".terraform" || name == ".terradag" || name.starts_with("terraform.tfstate")
}

#[cfg(unix)]
fn make_symlink(link: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(link, target)
}

#[cfg(not(unix))]
fn make_symlink(_link: &Path, target: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("cannot create symlink {:?} on this platform", target),
    ))
}
