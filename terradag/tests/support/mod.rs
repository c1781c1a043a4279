// tests/support/mod.rs

//! Shared fixtures for the integration tests: fake Terraform binaries and
//! project configurations mirroring a small multi-module infrastructure
//! layout.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use terradag::config::model::{
    Dependency, ModuleConfig, ModuleHooks, ProjectConfig, ProjectHooks, RemoteConfig, ToolConfig,
    Variable,
};
use terradag::execution::UserVariables;
use terradag::result::ExecutionResult;
use tokio::sync::mpsc;

/// Write an executable fake `terraform` shell script into `dir`.
///
/// The script reports itself as v0.12.24, creates a local state file on
/// `init` (so detach's post-condition can hold), and succeeds on every
/// subcommand.
pub fn fake_terraform(dir: &Path, name: &str) -> PathBuf {
    let script = r#"#!/bin/sh
case "$1" in
  version)
    echo "Terraform v0.12.24"
    echo ""
    ;;
  init)
    touch terraform.tfstate
    ;;
  *)
    ;;
esac
exit 0
"#;
    write_script(dir, name, script)
}

/// A fake `terraform` that fails on plan and apply with a parse-style error
/// on stderr, like a module with broken configuration would.
pub fn failing_terraform(dir: &Path, name: &str) -> PathBuf {
    let script = r#"#!/bin/sh
case "$1" in
  version)
    echo "Terraform v0.12.24"
    echo ""
    exit 0
    ;;
  init|get|workspace)
    exit 0
    ;;
  *)
    echo "Error parsing main.tf" >&2
    exit 1
    ;;
esac
"#;
    write_script(dir, name, script)
}

pub fn write_script(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("writing fake terraform script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod fake terraform script");
    }
    path
}

pub fn tool_config(path: &Path) -> ToolConfig {
    ToolConfig {
        path: Some(path.to_path_buf()),
        version: Some(semver::Version::new(0, 12, 24)),
    }
}

pub fn free_var(name: &str) -> Variable {
    Variable {
        name: name.to_string(),
        values: None,
    }
}

pub fn enum_var(name: &str, values: &[&str]) -> Variable {
    Variable {
        name: name.to_string(),
        values: Some(values.iter().map(|v| v.to_string()).collect()),
    }
}

pub fn dep(module: &str) -> Dependency {
    Dependency {
        module: module.to_string(),
        variables: None,
    }
}

pub fn dep_with(module: &str, filter: &[(&str, &str)]) -> Dependency {
    Dependency {
        module: module.to_string(),
        variables: Some(
            filter
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ),
    }
}

/// A module rooted at `<code_root>/<path>`; the directory is created.
pub fn module(code_root: &Path, name: &str, tool: &ToolConfig) -> ModuleConfig {
    std::fs::create_dir_all(code_root.join(name)).expect("creating module directory");

    ModuleConfig {
        name: name.to_string(),
        path: name.to_string(),
        deps: Vec::new(),
        remote: RemoteConfig::default(),
        variables: Vec::new(),
        terraform: tool.clone(),
        hooks: ModuleHooks {
            pre_module_run: Some(Vec::new()),
        },
        code_root: code_root.to_path_buf(),
    }
}

pub fn user_values(pairs: &[(&str, &str)]) -> UserVariables {
    UserVariables {
        values: pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        filters: Default::default(),
    }
}

pub fn user_values_with_filters(pairs: &[(&str, &str)], filters: &[&str]) -> UserVariables {
    let mut vars = user_values(pairs);
    vars.filters = filters.iter().map(|f| f.to_string()).collect();
    vars
}

/// The five-module project from the test scenarios:
///
/// - `app`, `database`: free `aws_region` × `environment` in {dev, prod,
///   staging}, depending on `users` and the same-environment `network`
/// - `network`: free `aws_region` × `environment` in {dev, prod, staging,
///   mgmt}
/// - `mgmt`: free `aws_region`, depending on the mgmt `network`
/// - `users`: no variables
pub fn scenario_config(
    code_root: &Path,
    session_repo: &Path,
    tool: &ToolConfig,
    users_tool: Option<&ToolConfig>,
) -> ProjectConfig {
    let mut app = module(code_root, "app", tool);
    app.variables = vec![free_var("aws_region"), enum_var("environment", &["dev", "prod", "staging"])];
    app.deps = vec![
        dep("users"),
        dep_with("network", &[("environment", "{{.environment}}")]),
    ];

    let mut database = module(code_root, "database", tool);
    database.variables = vec![
        free_var("aws_region"),
        enum_var("environment", &["dev", "prod", "staging"]),
    ];
    database.deps = vec![
        dep("users"),
        dep_with("network", &[("environment", "{{.environment}}")]),
    ];

    let mut network = module(code_root, "network", tool);
    network.variables = vec![
        free_var("aws_region"),
        enum_var("environment", &["dev", "prod", "staging", "mgmt"]),
    ];

    let mut mgmt = module(code_root, "mgmt", tool);
    mgmt.variables = vec![free_var("aws_region")];
    mgmt.deps = vec![dep_with("network", &[("environment", "mgmt")])];

    let users = match users_tool {
        Some(failing) => module(code_root, "users", failing),
        None => module(code_root, "users", tool),
    };

    ProjectConfig {
        terraform: tool.clone(),
        hooks: ProjectHooks::default(),
        flags: BTreeMap::new(),
        modules: vec![app, database, network, mgmt, users],
        session_repo_dir: session_repo.to_path_buf(),
        terraform_code_root: code_root.to_path_buf(),
    }
}

/// Collect everything from a results channel.
pub async fn drain_results(mut rx: mpsc::Receiver<ExecutionResult>) -> Vec<ExecutionResult> {
    let mut results = Vec::new();
    while let Some(result) = rx.recv().await {
        results.push(result);
    }
    results
}

/// Sorted IDs of a result set.
pub fn result_ids(results: &[ExecutionResult]) -> Vec<String> {
    let mut ids: Vec<String> = results.iter().map(|r| r.id.clone()).collect();
    ids.sort();
    ids
}
