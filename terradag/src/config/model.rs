// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use semver::Version;
use serde::Deserialize;

use crate::versions::parse_version_lenient;

/// Top-level project description as read from a YAML file.
///
/// ```yaml
/// terraform:
///   version: 0.11.7
///
/// terraform_code_root: .
/// session_repo_dir: /tmp/terradag
///
/// modules:
///   - name: network
///     path: network
///     variables:
///       - name: environment
///         values: [dev, prod]
/// ```
///
/// All sections are optional; the loader fills in defaults relative to the
/// config file location.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Default Terraform configuration for this project. Modules can
    /// override it with their own `terraform:` block.
    #[serde(default)]
    pub terraform: ToolConfig,

    /// Hooks invoked at various stages of the run lifecycle.
    #[serde(default)]
    pub hooks: ProjectHooks,

    /// Mapping of module variable names to CLI flags, to rename a variable
    /// on the command line and attach a help description.
    #[serde(default)]
    pub flags: BTreeMap<String, FlagConfig>,

    /// All Terraform modules in this project.
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,

    /// Directory where the `.terradag` session repository is created.
    /// Defaults to the config file's directory.
    #[serde(default)]
    pub session_repo_dir: PathBuf,

    /// Root of the Terraform code tree. Module paths are relative to it.
    /// Defaults to the config file's directory.
    #[serde(default)]
    pub terraform_code_root: PathBuf,
}

/// Terraform binary selection: an explicit path, a version to download, or
/// both (the path wins for execution; the version drives flag selection).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolConfig {
    /// Path to a Terraform binary. When unset, the version below is
    /// downloaded into the local version store.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Terraform version to run this module with. When unset, the loader
    /// inspects the binary at `path` (or on `PATH`) and fills this in.
    #[serde(default, deserialize_with = "de_version_opt")]
    pub version: Option<Version>,
}

impl ToolConfig {
    /// Fill unset fields from the project-level defaults.
    pub fn apply_defaults_from(&mut self, defaults: &ToolConfig) {
        if self.path.is_none() {
            self.path = defaults.path.clone();
        }
        if self.version.is_none() {
            self.version = defaults.version.clone();
        }
    }
}

/// `hooks:` at the project level.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectHooks {
    /// Run once after configuration is validated, before plan/apply.
    #[serde(default)]
    pub startup: Vec<HookSpec>,

    /// Default pre-run hooks for every module; modules without their own
    /// `pre_module_run` inherit these.
    #[serde(default)]
    pub pre_module_run: Vec<HookSpec>,
}

/// Module-level hook overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleHooks {
    /// Run before each execution of this module plans or applies.
    #[serde(default)]
    pub pre_module_run: Option<Vec<HookSpec>>,
}

/// A user command executed at a lifecycle stage.
///
/// The command line is shell-tokenized; argv[0] is resolved on `PATH` unless
/// it contains a path separator. A failing hook aborts the enclosing
/// operation. With `set_env`, stdout lines of the form `KEY=VALUE` are
/// injected into the process environment; scanning stops at the first line
/// that does not match.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookSpec {
    pub command: String,

    #[serde(default)]
    pub set_env: bool,
}

/// Remapping of a module variable to a CLI flag.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagConfig {
    /// Flag name on the command line (without the leading dashes).
    #[serde(default)]
    pub name: String,

    /// Help text shown next to the flag.
    #[serde(default)]
    pub description: String,
}

/// A single Terraform module and the ways it may be executed.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleConfig {
    /// Unique name of this module within the project.
    pub name: String,

    /// Path to the module directory, relative to `terraform_code_root`.
    pub path: String,

    /// Modules that must run before this one.
    #[serde(default)]
    pub deps: Vec<Dependency>,

    /// Remote state configuration for this module.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Variables this module accepts, in declaration order. The order is
    /// significant: execution IDs append variable values in this order.
    #[serde(default)]
    pub variables: Vec<Variable>,

    /// Terraform binary/version override for this module.
    #[serde(default)]
    pub terraform: ToolConfig,

    #[serde(default)]
    pub hooks: ModuleHooks,

    /// Absolute code root, copied from the project by the loader. Not a
    /// user-settable field.
    #[serde(skip)]
    pub code_root: PathBuf,
}

impl ModuleConfig {
    /// The pre-run hooks for this module, after the loader has applied
    /// project-level defaults.
    pub fn pre_module_run_hooks(&self) -> &[HookSpec] {
        self.hooks.pre_module_run.as_deref().unwrap_or(&[])
    }
}

/// The dependency of one module on (some executions of) another.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dependency {
    /// Name of the module being depended on.
    pub module: String,

    /// Optional variable filter narrowing the dependency to matching
    /// executions. Values may contain `{{.name}}` placeholders that are
    /// filled from the depending execution's variables. When absent, the
    /// dependency covers every execution of the module.
    #[serde(default)]
    pub variables: Option<BTreeMap<String, String>>,
}

/// Remote state settings passed through to `terraform init`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    /// Backend name; only meaningful for Terraform older than 0.9, where the
    /// backend was configured on the command line.
    #[serde(default)]
    pub backend: Option<String>,

    /// `-backend-config` key/value pairs. Values may contain `{{.name}}`
    /// placeholders resolved from the execution's bound variables.
    #[serde(default)]
    pub backend_config: BTreeMap<String, String>,
}

/// A variable a module can be executed with.
///
/// A variable without `values` is *free*: it must be supplied at runtime.
/// A variable with `values` is *enumerated*: each value produces its own
/// execution, and supplying it at runtime filters the executions instead.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Variable {
    pub name: String,

    #[serde(default)]
    pub values: Option<Vec<String>>,
}

impl Variable {
    /// True when the variable must be provided at runtime.
    pub fn is_free(&self) -> bool {
        self.allowed_values().is_empty()
    }

    /// True when the variable has an allowed-values list and therefore acts
    /// as an execution filter on the command line.
    pub fn is_enumerated(&self) -> bool {
        !self.allowed_values().is_empty()
    }

    pub fn allowed_values(&self) -> &[String] {
        self.values.as_deref().unwrap_or(&[])
    }
}

fn de_version_opt<'de, D>(deserializer: D) -> Result<Option<Version>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) => parse_version_lenient(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
