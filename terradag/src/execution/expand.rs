// src/execution/expand.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::model::ModuleConfig;
use crate::execution::{UnboundExecution, UserVariables, VarValue};

/// Inputs selecting and parameterising the executions of an operation.
#[derive(Debug, Clone, Default)]
pub struct ExecutionParams {
    /// Restrict to these module names (`--modules`); `None` means all.
    pub module_names: Option<Vec<String>>,
    /// User-supplied variable values and filters.
    pub user_vars: UserVariables,
    /// Extra arguments passed through to every Terraform invocation.
    pub tool_args: Vec<String>,
}

/// Expand a module into its set of unbound executions.
///
/// Each enumerated variable contributes its allowed values (restricted to
/// the user's value when it is used as a filter); each free variable
/// contributes a single placeholder. The executions are the Cartesian
/// product of these axes; a module with no variables yields exactly one
/// execution.
///
/// Filter consistency: when the number of user-supplied filters that apply
/// to this module differs from the total number of user-supplied filters,
/// the module yields no executions at all. This is how filtering by e.g.
/// `environment=dev` drops modules that have no `environment` variable.
pub fn module_executions(
    module: &Arc<ModuleConfig>,
    params: &ExecutionParams,
) -> Vec<UnboundExecution> {
    let user = &params.user_vars;

    let applicable_filters = module
        .variables
        .iter()
        .filter(|v| user.has_filter(&v.name))
        .count();
    if applicable_filters != user.filter_count() {
        debug!(
            module = %module.name,
            applicable_filters,
            total_filters = user.filter_count(),
            "filter mismatch; module yields no executions"
        );
        return Vec::new();
    }

    if module.variables.is_empty() {
        return vec![UnboundExecution {
            module: Arc::clone(module),
            variables: BTreeMap::new(),
            tool_args: params.tool_args.clone(),
        }];
    }

    let mut axes: Vec<Vec<(String, VarValue)>> = Vec::new();

    for variable in &module.variables {
        let mut axis = Vec::new();

        if variable.is_enumerated() {
            let filter_value = user.values.get(&variable.name).filter(|v| !v.is_empty());

            for value in variable.allowed_values() {
                if filter_value.map_or(true, |wanted| wanted == value) {
                    axis.push((variable.name.clone(), VarValue::Concrete(value.clone())));
                }
            }
        } else {
            axis.push((
                variable.name.clone(),
                VarValue::Placeholder(variable.name.clone()),
            ));
        }

        axes.push(axis);
    }

    cartesian(&axes)
        .into_iter()
        .map(|assignment| UnboundExecution {
            module: Arc::clone(module),
            variables: assignment.into_iter().collect(),
            tool_args: params.tool_args.clone(),
        })
        .collect()
}

/// Cartesian product over the given axes. An empty axis collapses the
/// product to nothing (a filtered-out enumerated variable removes all of
/// the module's executions).
fn cartesian<T: Clone>(axes: &[Vec<T>]) -> Vec<Vec<T>> {
    let mut results: Vec<Vec<T>> = vec![Vec::new()];

    for axis in axes {
        let mut next = Vec::with_capacity(results.len() * axis.len());
        for partial in &results {
            for value in axis {
                let mut extended = partial.clone();
                extended.push(value.clone());
                next.push(extended);
            }
        }
        results = next;
    }

    results
}
