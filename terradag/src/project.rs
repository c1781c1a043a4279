// src/project.rs

//! Top-level composition: a project is a collection of Terraform modules,
//! based on configuration.
//!
//! Modules may be invoked with various parameters, either provided by the
//! user at runtime or predefined in configuration. The combination of a
//! module with a map of variable values is an *execution*. Executions can
//! depend on each other; based on those dependencies, all modules can be
//! planned or applied concurrently.

use std::sync::Arc;

use tracing::debug;

use crate::config::model::ProjectConfig;
use crate::config::validate::validate_config;
use crate::errors::{Result, TerradagError};
use crate::exec::Interruptor;
use crate::execution::{bind_all, build_graph, project_executions, ExecutionParams, UserVariables};
use crate::hooks::run_hook;
use crate::session::runner::OperationChannels;
use crate::session::{SessionContext, SessionRepo};
use crate::versions::VersionStore;

/// Name of the session repository directory created under
/// `session_repo_dir`.
const SESSION_REPO_NAME: &str = ".terradag";

/// Parameters for a plan or apply over the project.
#[derive(Debug, Clone, Default)]
pub struct OperationParams {
    /// Restrict the operation to these modules (`--modules`).
    pub module_names: Option<Vec<String>>,
    /// User-supplied variable values and filters.
    pub user_vars: UserVariables,
    /// Extra arguments passed through to Terraform.
    pub tool_args: Vec<String>,
}

impl OperationParams {
    fn execution_params(&self) -> ExecutionParams {
        ExecutionParams {
            module_names: self.module_names.clone(),
            user_vars: self.user_vars.clone(),
            tool_args: self.tool_args.clone(),
        }
    }
}

#[derive(Debug)]
pub struct Project {
    config: ProjectConfig,
    sessions: SessionRepo,
    interrupt: Interruptor,
}

impl Project {
    /// Build a project from a loaded configuration.
    ///
    /// Validates the configuration, opens the version store and the session
    /// repository, fail-fasts on an invalid dependency graph, and runs any
    /// startup hooks (whose `KEY=VALUE` stdout may inject environment
    /// variables consumed by later Terraform sessions).
    pub async fn new(config: ProjectConfig) -> Result<Self> {
        debug!("initializing project");

        validate_config(&config)?;

        let versions = Arc::new(VersionStore::for_current_system(None)?);

        let repo_path = config.session_repo_dir.join(SESSION_REPO_NAME);
        let interrupt = Interruptor::new();
        let ctx = Arc::new(SessionContext {
            versions,
            interrupt: interrupt.clone(),
            plugin_cache_dir: repo_path.join("plugins"),
        });
        let sessions = SessionRepo::open(repo_path, ctx)?;

        // Check the dependency graph is well-formed before any work starts:
        // configuration bugs surface here, not halfway through an apply.
        let all = project_executions(&config, &ExecutionParams::default());
        build_graph(&all)?;

        let project = Self {
            config,
            sessions,
            interrupt,
        };

        if !project.config.hooks.startup.is_empty() {
            let session = project.sessions.current()?;
            for hook in &project.config.hooks.startup {
                run_hook(session.path(), hook).await.map_err(|err| {
                    TerradagError::Config(format!("error running startup hook: {err}"))
                })?;
            }
        }

        Ok(project)
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// The process-wide interrupt handle; the CLI installs the OS signal
    /// listener on it.
    pub fn interrupt(&self) -> &Interruptor {
        &self.interrupt
    }

    /// Plan every matching execution concurrently, ignoring dependencies.
    /// With `detach`, sandboxes are disconnected from their remote state
    /// first so the plan cannot touch shared state.
    pub async fn plan(&self, params: OperationParams, detach: bool) -> Result<OperationChannels> {
        debug!("project: running plan");

        let executions = project_executions(&self.config, &params.execution_params());
        let bound = bind_all(&executions, &params.user_vars.values)?;

        let session = self.sessions.current()?;
        session.plan(bound, detach)
    }

    /// Apply every matching execution.
    ///
    /// An unfiltered apply runs in dependency order. A `--modules`-filtered
    /// apply runs *without* the graph: honouring dependencies could require
    /// running modules outside the filter, so the flat semantics are the
    /// explicit ones.
    pub async fn apply(&self, params: OperationParams) -> Result<OperationChannels> {
        debug!("project: running apply");

        let filtered = params.module_names.is_some();

        let executions = project_executions(&self.config, &params.execution_params());
        let bound = bind_all(&executions, &params.user_vars.values)?;

        let session = self.sessions.current()?;
        if filtered {
            session.apply(bound)
        } else {
            session.apply_with_graph(bound)
        }
    }
}
