// src/config/validate.rs

use std::collections::BTreeSet;
use std::path::Path;

use crate::config::model::{ModuleConfig, ProjectConfig};
use crate::errors::{Result, TerradagError};

/// Run semantic validation against a loaded configuration.
///
/// This checks:
/// - module names are unique
/// - every module path is non-empty, stays inside the code root, and points
///   at an existing directory
/// - every module has a resolved Terraform version after defaulting
/// - dependencies refer to modules that exist
/// - hooks have a non-empty command
///
/// Whether every dependency resolves to at least one *execution* (and the
/// resulting graph is acyclic) is checked when the execution set is built;
/// see [`crate::execution::build_graph`].
pub fn validate_config(config: &ProjectConfig) -> Result<()> {
    let mut errors = Vec::new();

    let mut seen = BTreeSet::new();
    for module in &config.modules {
        if !seen.insert(module.name.as_str()) {
            errors.push(format!("module[{}]: duplicate module name", module.name));
        }
    }

    for module in &config.modules {
        validate_module(config, module, &mut errors);
    }

    for hook in config
        .hooks
        .startup
        .iter()
        .chain(config.hooks.pre_module_run.iter())
    {
        if hook.command.trim().is_empty() {
            errors.push("hook: missing hook command".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TerradagError::Config(errors.join("; ")))
    }
}

fn validate_module(config: &ProjectConfig, module: &ModuleConfig, errors: &mut Vec<String>) {
    let prefix = format!("module[{}]", module.name);

    if module.path.is_empty() {
        errors.push(format!("{prefix}: path cannot be empty"));
    } else {
        let full_path = module.code_root.join(&module.path);

        if !is_within_path(&module.code_root, &full_path) {
            errors.push(format!(
                "{prefix}: module path cannot be outside code root: module path: {}; code root: {}",
                full_path.display(),
                module.code_root.display()
            ));
        }
        if !full_path.is_dir() {
            errors.push(format!(
                "{prefix}: module directory does not exist: {}",
                full_path.display()
            ));
        }
    }

    if module.terraform.version.is_none() {
        errors.push(format!("{prefix}: terraform version is not set"));
    }

    for dep in &module.deps {
        if !config.modules.iter().any(|m| m.name == dep.module) {
            errors.push(format!(
                "{prefix}: dependency refers to unknown module '{}'",
                dep.module
            ));
        }
        if dep.module == module.name {
            errors.push(format!("{prefix}: module cannot depend on itself"));
        }
    }

    if let Some(hooks) = module.hooks.pre_module_run.as_ref() {
        for hook in hooks {
            if hook.command.trim().is_empty() {
                errors.push(format!("{prefix}: missing hook command"));
            }
        }
    }
}

/// Whether `path` is inside the hierarchy of `base`, after lexical
/// normalisation (no filesystem access).
pub fn is_within_path(base: &Path, path: &Path) -> bool {
    let base = normalize(base);
    let path = normalize(path);
    path.starts_with(&base)
}

fn normalize(path: &Path) -> std::path::PathBuf {
    use std::path::Component;

    let mut out = std::path::PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}
