// src/config/loader.rs

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use tracing::debug;

use crate::config::model::{HookSpec, ProjectConfig};
use crate::config::validate::validate_config;
use crate::errors::{Result, TerradagError};
use crate::versions::inspect_version;

/// Candidate config file locations, tried in order, relative to the current
/// working directory.
const CONFIG_SEARCH_PATHS: &[&str] = &[
    "terradag.yaml",
    "terradag.yml",
    "terraform/terradag.yaml",
    "terraform/terradag.yml",
];

/// Find the project config file when `--config` was not given: the first of
/// the well-known candidate paths that exists.
pub fn search_config_file(base_dir: &Path) -> Option<PathBuf> {
    CONFIG_SEARCH_PATHS
        .iter()
        .map(|c| base_dir.join(c))
        .find(|p| p.is_file())
}

/// Read and deserialize a config file, then resolve paths, defaults and
/// Terraform versions so the rest of the program can rely on them.
///
/// This does **not** perform semantic validation (module directories, hook
/// well-formedness); use [`load_and_validate`] for that.
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<ProjectConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file at {:?}", path))?;

    let mut config: ProjectConfig = serde_yaml::from_str(&contents)
        .map_err(|e| TerradagError::Config(format!("parsing YAML config from {:?}: {}", path, e)))?;

    let root = path.parent().unwrap_or_else(|| Path::new("."));
    let root = std::fs::canonicalize(root)
        .with_context(|| format!("resolving config directory {:?}", root))?;

    rewrite_config_paths(&root, &mut config);
    set_defaults(&root, &mut config);
    resolve_versions(&mut config).await?;

    Ok(config)
}

/// Load a configuration file and run semantic validation. This is the
/// recommended entry point for the rest of the application.
pub async fn load_and_validate(path: impl AsRef<Path>) -> Result<ProjectConfig> {
    let config = load_from_path(&path).await?;
    validate_config(&config)?;
    Ok(config)
}

/// Rewrite relative paths in the config to be absolute against the config
/// file's directory. Absolute paths and empty paths are left untouched.
fn rewrite_config_paths(root: &Path, config: &mut ProjectConfig) {
    rewrite_rel_path(root, &mut config.session_repo_dir);
    rewrite_rel_path(root, &mut config.terraform_code_root);

    if let Some(path) = config.terraform.path.as_mut() {
        rewrite_rel_path(root, path);
    }
    for module in &mut config.modules {
        if let Some(path) = module.terraform.path.as_mut() {
            rewrite_rel_path(root, path);
        }
    }

    for hook in &mut config.hooks.startup {
        rewrite_hook_command(root, hook);
    }
    for hook in &mut config.hooks.pre_module_run {
        rewrite_hook_command(root, hook);
    }
    for module in &mut config.modules {
        if let Some(hooks) = module.hooks.pre_module_run.as_mut() {
            for hook in hooks {
                rewrite_hook_command(root, hook);
            }
        }
    }
}

fn rewrite_rel_path(root: &Path, path: &mut PathBuf) {
    if path.as_os_str().is_empty() || path.is_absolute() {
        return;
    }
    let rewritten = root.join(&*path);
    debug!(from = ?path, to = ?rewritten, "rewriting relative config path");
    *path = rewritten;
}

/// Rewrite the program of a hook command when it is an explicit relative
/// path (`./scripts/x.sh`). Bare command words stay as-is and are resolved
/// on `PATH` at execution time.
fn rewrite_hook_command(root: &Path, hook: &mut HookSpec) {
    let Ok(mut words) = shell_words::split(&hook.command) else {
        // Leave malformed commands alone; validation reports them later.
        return;
    };
    let Some(program) = words.first_mut() else {
        return;
    };

    let has_separator = program.contains(std::path::MAIN_SEPARATOR);
    if has_separator && !Path::new(program).is_absolute() {
        *program = root.join(&*program).to_string_lossy().into_owned();
        hook.command = shell_words::join(words.iter().map(String::as_str));
    }
}

/// Fill in defaults: code root and session repo fall back to the config
/// directory, modules inherit project-level hooks and Terraform settings.
fn set_defaults(root: &Path, config: &mut ProjectConfig) {
    if config.terraform_code_root.as_os_str().is_empty() {
        config.terraform_code_root = root.to_path_buf();
    }
    if config.session_repo_dir.as_os_str().is_empty() {
        config.session_repo_dir = root.to_path_buf();
    }

    for module in &mut config.modules {
        module.code_root = config.terraform_code_root.clone();
        module.terraform.apply_defaults_from(&config.terraform);
        if module.hooks.pre_module_run.is_none() {
            module.hooks.pre_module_run = Some(config.hooks.pre_module_run.clone());
        }
    }
}

/// Detect the Terraform version for any tool config that has none, by
/// running the configured binary (or the one found on `PATH`) once.
async fn resolve_versions(config: &mut ProjectConfig) -> Result<()> {
    if config.terraform.path.is_none() && config.terraform.version.is_none() {
        let found = which::which("terraform").map_err(|e| {
            TerradagError::Config(format!(
                "no terraform version or path configured and none found on PATH: {e}"
            ))
        })?;
        debug!(path = ?found, "defaulting terraform path from PATH");
        config.terraform.path = Some(found);
    }

    if config.terraform.version.is_none() {
        config.terraform.version = Some(detect_version(&config.terraform).await?);
    }

    for module in &mut config.modules {
        // Defaults were applied before version detection, so a module only
        // lands here when it overrides the binary path itself.
        module.terraform.apply_defaults_from(&config.terraform);
        if module.terraform.version.is_none() {
            module.terraform.version = Some(detect_version(&module.terraform).await?);
        }
    }

    Ok(())
}

async fn detect_version(tool: &crate::config::model::ToolConfig) -> Result<semver::Version> {
    let path = tool
        .path
        .as_ref()
        .ok_or_else(|| anyhow!("cannot detect terraform version without a binary path"))?;
    let version = inspect_version(path)
        .await
        .with_context(|| format!("unable to detect terraform version from {:?}", path))?;
    debug!(%version, path = ?path, "detected terraform version");
    Ok(version)
}
