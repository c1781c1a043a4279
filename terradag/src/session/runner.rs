// src/session/runner.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::errors::{Result, TerradagError};
use crate::exec::bounded_parallel;
use crate::execution::{build_graph, BoundExecution, ExecutionLike};
use crate::hooks::run_hook;
use crate::result::ExecutionResult;
use crate::session::repo::Session;
use crate::session::{SessionContext, PARALLELISM};
use crate::tool::session::PLUGIN_CACHE_ENV;
use crate::tool::{ToolSession, ToolSessionConfig};
use crate::versions::version_matches;

/// Channels returned by the session operations: best-effort status lines,
/// and one result per execution that ran.
pub type OperationChannels = (
    mpsc::Receiver<String>,
    mpsc::Receiver<ExecutionResult>,
);

fn channels(executions: usize) -> (
    mpsc::Sender<String>,
    mpsc::Receiver<String>,
    mpsc::Sender<ExecutionResult>,
    mpsc::Receiver<ExecutionResult>,
) {
    // The status channel is informational; it is sized so that a caller who
    // never reads it cannot deadlock the workers (sends are best-effort and
    // drop when full). The results channel holds one slot per execution, so
    // producers never block on it.
    let (status_tx, status_rx) = mpsc::channel(executions * 10 + 10);
    let (results_tx, results_rx) = mpsc::channel(executions.max(1));
    (status_tx, status_rx, results_tx, results_rx)
}

impl Session {
    /// Plan every execution, with bounded parallelism and no dependency
    /// ordering. With `detach`, each sandbox is disconnected from its
    /// remote state before planning.
    pub fn plan(
        self: &Arc<Self>,
        executions: Vec<BoundExecution>,
        detach: bool,
    ) -> Result<OperationChannels> {
        debug!(executions = executions.len(), detach, "session: running plan");

        let (status_tx, status_rx, results_tx, results_rx) = channels(executions.len());
        let ctx = Arc::clone(&self.ctx);
        let session_path = self.path().to_path_buf();
        let token = ctx.interrupt.token();

        let units: Vec<_> = executions
            .into_iter()
            .map(|execution| {
                let ctx = Arc::clone(&ctx);
                let session_path = session_path.clone();
                let status = status_tx.clone();
                let results = results_tx.clone();
                async move {
                    let result = plan_one(&ctx, &session_path, execution, detach, &status).await;
                    let _ = results.send(result).await;
                }
            })
            .collect();

        // The spawned owner holds the only remaining senders inside the
        // units; the results channel closes exactly once, when the last
        // started unit finishes.
        drop(status_tx);
        drop(results_tx);

        tokio::spawn(async move {
            bounded_parallel(PARALLELISM, token, units).await;
        });

        Ok((status_rx, results_rx))
    }

    /// Apply the given executions with no dependency ordering. Used for
    /// filtered/manual selections, where honouring dependencies could
    /// require running executions outside the selection.
    pub fn apply(self: &Arc<Self>, executions: Vec<BoundExecution>) -> Result<OperationChannels> {
        debug!(executions = executions.len(), "session: running apply without graph");

        let (status_tx, status_rx, results_tx, results_rx) = channels(executions.len());
        let ctx = Arc::clone(&self.ctx);
        let session_path = self.path().to_path_buf();
        let token = ctx.interrupt.token();

        let units: Vec<_> = executions
            .into_iter()
            .map(|execution| {
                let ctx = Arc::clone(&ctx);
                let session_path = session_path.clone();
                let status = status_tx.clone();
                let results = results_tx.clone();
                async move {
                    let result =
                        apply_one(&ctx, &session_path, execution, false, &status).await;
                    let _ = results.send(result).await;
                }
            })
            .collect();

        drop(status_tx);
        drop(results_tx);

        tokio::spawn(async move {
            bounded_parallel(PARALLELISM, token, units).await;
        });

        Ok((status_rx, results_rx))
    }

    /// Apply the given executions in dependency order.
    ///
    /// An execution starts once all of its dependencies have applied
    /// successfully; executions on the graph frontier run concurrently,
    /// bounded only by the graph's width. When an execution fails, all of
    /// its transitive dependents are skipped — a skipped execution emits
    /// no result at all, so absence from the results channel is the signal
    /// of skipping.
    pub fn apply_with_graph(
        self: &Arc<Self>,
        executions: Vec<BoundExecution>,
    ) -> Result<OperationChannels> {
        debug!(executions = executions.len(), "session: running apply with graph");

        let dag = build_graph(&executions)?;

        let (status_tx, status_rx, results_tx, results_rx) = channels(executions.len());
        let ctx = Arc::clone(&self.ctx);
        let session_path = self.path().to_path_buf();

        let mut nodes: HashMap<String, BoundExecution> = executions
            .into_iter()
            .map(|e| (e.id(), e))
            .collect();

        tokio::spawn(async move {
            let mut state: HashMap<String, NodeState> =
                nodes.keys().map(|id| (id.clone(), NodeState::Pending)).collect();
            let mut tasks: JoinSet<ExecutionResult> = JoinSet::new();

            // Seed the walk with every execution that has no dependencies.
            let ready: Vec<String> = state
                .iter()
                .filter(|(id, _)| dag.deps_of(id).is_empty())
                .map(|(id, _)| id.clone())
                .collect();
            for id in ready {
                start_node(
                    &mut tasks,
                    &mut state,
                    &mut nodes,
                    &id,
                    &ctx,
                    &session_path,
                    &status_tx,
                );
            }

            while let Some(joined) = tasks.join_next().await {
                let result = match joined {
                    Ok(result) => result,
                    Err(err) => {
                        warn!(error = %err, "execution task failed to join");
                        continue;
                    }
                };

                let id = result.id.clone();
                let failed = result.is_err();
                let _ = results_tx.send(result).await;

                state.insert(id.clone(), if failed { NodeState::Failed } else { NodeState::Done });

                if failed {
                    skip_dependents(&dag, &mut state, &id);
                    continue;
                }

                // Start any dependent whose dependencies are now all done.
                let newly_ready: Vec<String> = dag
                    .dependents_of(&id)
                    .iter()
                    .filter(|dep_id| {
                        matches!(state.get(dep_id.as_str()), Some(NodeState::Pending))
                            && dag
                                .deps_of(dep_id)
                                .iter()
                                .all(|d| matches!(state.get(d.as_str()), Some(NodeState::Done)))
                    })
                    .cloned()
                    .collect();
                for ready_id in newly_ready {
                    start_node(
                        &mut tasks,
                        &mut state,
                        &mut nodes,
                        &ready_id,
                        &ctx,
                        &session_path,
                        &status_tx,
                    );
                }
            }
            // All senders drop here; the results channel closes exactly
            // once, with skipped executions never having produced a result.
        });

        Ok((status_rx, results_rx))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    /// Waiting on dependencies.
    Pending,
    /// Currently applying.
    Running,
    /// Applied successfully.
    Done,
    /// Apply failed.
    Failed,
    /// Not run because an upstream execution failed.
    Skipped,
}

fn start_node(
    tasks: &mut JoinSet<ExecutionResult>,
    state: &mut HashMap<String, NodeState>,
    nodes: &mut HashMap<String, BoundExecution>,
    id: &str,
    ctx: &Arc<SessionContext>,
    session_path: &Path,
    status: &mpsc::Sender<String>,
) {
    let Some(execution) = nodes.remove(id) else {
        return;
    };

    debug!(execution = id, "dependencies satisfied; starting execution");
    state.insert(id.to_string(), NodeState::Running);

    let ctx = Arc::clone(ctx);
    let session_path = session_path.to_path_buf();
    let status = status.clone();
    tasks.spawn(async move { apply_one(&ctx, &session_path, execution, true, &status).await });
}

/// Mark every not-yet-started transitive dependent of `failed_id` as
/// skipped, so it never runs and never reports a result.
fn skip_dependents(
    dag: &crate::dag::ExecutionDag,
    state: &mut HashMap<String, NodeState>,
    failed_id: &str,
) {
    let mut stack: Vec<String> = dag.dependents_of(failed_id).to_vec();

    while let Some(id) = stack.pop() {
        // Anything already terminal or running is left alone, as is the
        // synthetic root (absent from the state map).
        if matches!(state.get(&id), Some(NodeState::Pending)) {
            debug!(execution = %id, "skipping execution due to upstream failure");
            state.insert(id.clone(), NodeState::Skipped);
            stack.extend(dag.dependents_of(&id).iter().cloned());
        }
    }
}

/// Build the per-execution Terraform session under the session directory.
async fn new_tool_session(
    ctx: &SessionContext,
    session_path: &Path,
    execution: &BoundExecution,
) -> Result<ToolSession> {
    let module = execution.module();
    let id = execution.id();

    let version = module.terraform.version.clone().ok_or_else(|| {
        TerradagError::Config(format!("module[{}]: terraform version is not set", module.name))
    })?;

    // An explicit binary path wins; otherwise the version store downloads
    // (or reuses) the right binary.
    let tool_binary_path = match module.terraform.path.clone() {
        Some(path) => path,
        None => ctx
            .versions
            .get(&version.to_string())
            .await
            .map_err(|err| {
                TerradagError::Other(anyhow::anyhow!(
                    "unable to activate Terraform {version}: {err}"
                ))
            })?,
    };

    // From 0.9 on, the backend name must live in the Terraform code itself.
    let mut remote = module.remote.clone();
    if version_matches(&version, ">=0.9") {
        remote.backend = None;
    }

    // Share one plugin cache across executions, but never clobber a cache
    // the user already configured.
    let shared_plugin_dir = if version_matches(&version, ">=0.10")
        && std::env::var_os(PLUGIN_CACHE_ENV).is_none()
    {
        std::fs::create_dir_all(&ctx.plugin_cache_dir)
            .with_context(|| format!("creating plugin cache {:?}", ctx.plugin_cache_dir))?;
        Some(ctx.plugin_cache_dir.clone())
    } else {
        None
    };

    let config = ToolSessionConfig {
        name: module.name.clone(),
        code_base_path: module.code_root.clone(),
        module_rel_path: module.path.clone(),
        remote,
        variables: execution.variables().clone(),
        tool_binary_path,
        shared_plugin_dir,
        extra_args: execution.tool_args().to_vec(),
    };

    ToolSession::create(id, session_path.join(execution.id()), config, ctx.interrupt.clone()).await
}

/// Plan one execution: session setup, hooks, init, optional detach, plan.
async fn plan_one(
    ctx: &Arc<SessionContext>,
    session_path: &PathBuf,
    execution: BoundExecution,
    detach: bool,
    status: &mpsc::Sender<String>,
) -> ExecutionResult {
    let id = execution.id();

    let tool = match new_tool_session(ctx, session_path, &execution).await {
        Ok(tool) => tool,
        Err(err) => return ExecutionResult::failed(id, err),
    };

    if let Some(result) = run_pre_module_hooks(&execution, session_path, status).await {
        return result;
    }

    let _ = status.try_send(format!("[{id}] Initializing..."));
    if let Err(err) = tool.init().await {
        return ExecutionResult::from_tool_error(id, err);
    }

    if detach {
        let _ = status.try_send(format!("[{id}] Disconnecting remote state..."));
        if let Err(err) = tool.detach().await {
            return ExecutionResult::from_tool_error(id, err);
        }
    }

    let _ = status.try_send(format!("[{id}] Planning..."));
    match tool.plan().await {
        Ok(output) => ExecutionResult::ok(id, output),
        Err(err) => ExecutionResult::from_tool_error(id, err),
    }
}

/// Apply one execution: session setup, optional hooks, init, apply.
async fn apply_one(
    ctx: &Arc<SessionContext>,
    session_path: &PathBuf,
    execution: BoundExecution,
    with_hooks: bool,
    status: &mpsc::Sender<String>,
) -> ExecutionResult {
    let id = execution.id();

    let tool = match new_tool_session(ctx, session_path, &execution).await {
        Ok(tool) => tool,
        Err(err) => return ExecutionResult::failed(id, err),
    };

    if with_hooks {
        if let Some(result) = run_pre_module_hooks(&execution, session_path, status).await {
            return result;
        }
    }

    let _ = status.try_send(format!("[{id}] Initializing..."));
    if let Err(err) = tool.init().await {
        return ExecutionResult::from_tool_error(id, err);
    }

    let _ = status.try_send(format!("[{id}] Applying..."));
    match tool.apply().await {
        Ok(output) => ExecutionResult::ok(id, output),
        Err(err) => ExecutionResult::from_tool_error(id, err),
    }
}

/// Run the execution's pre-module-run hooks; a hook failure aborts this
/// execution with an error result.
async fn run_pre_module_hooks(
    execution: &BoundExecution,
    session_path: &Path,
    status: &mpsc::Sender<String>,
) -> Option<ExecutionResult> {
    let id = execution.id();

    for hook in execution.module().pre_module_run_hooks() {
        let _ = status.try_send(format!("[{id}] Running pre-module-run hook..."));
        if let Err(err) = run_hook(session_path, hook).await {
            return Some(ExecutionResult::failed(
                id,
                format!("error running pre-module-run hook: {err}"),
            ));
        }
    }

    None
}
