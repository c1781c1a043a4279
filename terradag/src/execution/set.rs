// src/execution/set.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::model::{Dependency, ProjectConfig};
use crate::dag::ExecutionDag;
use crate::errors::{Result, TerradagError};
use crate::execution::expand::{module_executions, ExecutionParams};
use crate::execution::{BoundExecution, ExecutionLike, UnboundExecution};
use crate::template;

/// Expand every (selected) module of the project into unbound executions.
pub fn project_executions(
    config: &ProjectConfig,
    params: &ExecutionParams,
) -> Vec<UnboundExecution> {
    let mut results = Vec::new();

    for module in &config.modules {
        if let Some(names) = params.module_names.as_deref() {
            if !names.iter().any(|n| n == &module.name) {
                debug!(module = %module.name, "module does not match filter; skipping");
                continue;
            }
        }
        let module = Arc::new(module.clone());
        results.extend(module_executions(&module, params));
    }

    results
}

/// Bind user variables over a whole set. Fails on the first execution whose
/// free variables are not fully covered.
pub fn bind_all(
    executions: &[UnboundExecution],
    user_values: &BTreeMap<String, String>,
) -> Result<Vec<BoundExecution>> {
    executions.iter().map(|e| e.bind(user_values)).collect()
}

/// Build the dependency graph over a set of executions.
///
/// For every execution, each declared dependency is resolved against the
/// set: placeholders in the dependency's variable filter are first rendered
/// from the execution's own variables, then matching executions of the
/// target module are connected as dependencies. A dependency that resolves
/// to no execution makes the configuration invalid.
///
/// The returned graph has a synthetic root connected to every source node
/// and is guaranteed acyclic.
pub fn build_graph<E: ExecutionLike>(executions: &[E]) -> Result<ExecutionDag> {
    let mut dag = ExecutionDag::new();

    for execution in executions {
        dag.add_node(execution.id());
    }

    for execution in executions {
        let vars = execution.variables_text();

        for dep in &execution.module().deps {
            let filter = dep
                .variables
                .as_ref()
                .map(|f| template::render_map_values(f, &vars));

            let matches = filter_by_dep(executions, dep, filter.as_ref()).map_err(|reason| {
                TerradagError::InvalidDependency {
                    module: execution.module().name.clone(),
                    reason,
                }
            })?;

            for target in matches {
                dag.add_edge(&execution.id(), &target.id());
            }
        }
    }

    dag.ensure_root();
    dag.validate_acyclic()?;

    Ok(dag)
}

/// All executions in the set that belong to the named module.
fn filter_by_module<'a, E: ExecutionLike>(executions: &'a [E], module_name: &str) -> Vec<&'a E> {
    executions
        .iter()
        .filter(|e| e.module().name == module_name)
        .collect()
}

/// Executions matching a dependency declaration, with the variable filter
/// already rendered. Returns a human-readable reason on failure.
fn filter_by_dep<'a, E: ExecutionLike>(
    executions: &'a [E],
    dep: &Dependency,
    filter: Option<&BTreeMap<String, String>>,
) -> std::result::Result<Vec<&'a E>, String> {
    let of_module = filter_by_module(executions, &dep.module);
    if of_module.is_empty() {
        return Err(format!("missing dependency: {}", dep.module));
    }

    // No filter: depend on any and all executions of the module.
    let Some(filter) = filter else {
        return Ok(of_module);
    };

    let matching: Vec<&E> = of_module
        .into_iter()
        .filter(|e| filter_matches(filter, &e.variables_text()))
        .collect();

    if matching.is_empty() {
        return Err(format!(
            "no execution matching dep: {} {:?}",
            dep.module, filter
        ));
    }

    Ok(matching)
}

/// Whether the values of the keys listed in `filter` agree with
/// `candidate`. Keys absent from the candidate are ignored.
fn filter_matches(filter: &BTreeMap<String, String>, candidate: &BTreeMap<String, String>) -> bool {
    filter.iter().all(|(key, wanted)| {
        candidate
            .get(key)
            .map_or(true, |actual| actual == wanted)
    })
}
