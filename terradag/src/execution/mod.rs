// src/execution/mod.rs

//! Executions: a module together with a concrete variable assignment.
//!
//! - [`expand`] turns a module's variable schema into the Cartesian set of
//!   unbound executions.
//! - [`set`] binds user variables over a whole set and builds the
//!   dependency graph between executions.
//!
//! An execution starts *unbound*: free variables hold a
//! [`VarValue::Placeholder`] until the user supplies a value. Binding
//! replaces every placeholder and renders templated configuration; only a
//! [`BoundExecution`] can actually be run.

pub mod expand;
pub mod set;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::config::model::ModuleConfig;
use crate::errors::{Result, TerradagError};
use crate::template;

pub use expand::{module_executions, ExecutionParams};
pub use set::{bind_all, build_graph, project_executions};

/// A variable value on an execution.
///
/// Free variables are placeholders until bound; enumerated variables carry a
/// concrete value from expansion. Keeping the distinction in the type (and
/// not in the shape of the string) makes "did a placeholder survive
/// binding?" impossible to get wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarValue {
    Concrete(String),
    Placeholder(String),
}

impl VarValue {
    /// Text form of the value: the concrete string, or `{name}` for a
    /// placeholder (used in IDs of unbound executions and error output).
    pub fn text(&self) -> String {
        match self {
            VarValue::Concrete(s) => s.clone(),
            VarValue::Placeholder(name) => format!("{{{name}}}"),
        }
    }
}

/// Values supplied by the user at runtime, e.g. via project CLI flags.
#[derive(Debug, Clone, Default)]
pub struct UserVariables {
    /// All supplied name→value pairs.
    pub values: BTreeMap<String, String>,
    /// The subset of names acting as execution filters (enumerated
    /// variables the user supplied).
    pub filters: BTreeSet<String>,
}

impl UserVariables {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn has_filter(&self, name: &str) -> bool {
        self.filters.contains(name)
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }
}

/// Common view over bound and unbound executions, used by graph
/// construction and filtering.
pub trait ExecutionLike {
    fn id(&self) -> String;
    fn module(&self) -> &Arc<ModuleConfig>;
    /// Variables as plain text (placeholders rendered as `{name}`).
    fn variables_text(&self) -> BTreeMap<String, String>;
}

/// A module execution before runtime variables have been bound. Never run
/// directly; call [`UnboundExecution::bind`] first.
#[derive(Debug, Clone)]
pub struct UnboundExecution {
    pub(crate) module: Arc<ModuleConfig>,
    pub(crate) variables: BTreeMap<String, VarValue>,
    pub(crate) tool_args: Vec<String>,
}

/// A module execution ready to run: all variables concrete, backend
/// configuration rendered.
#[derive(Debug, Clone)]
pub struct BoundExecution {
    module: Arc<ModuleConfig>,
    variables: BTreeMap<String, String>,
    tool_args: Vec<String>,
}

/// Compute the execution ID: the module name, followed by `-<value>` for
/// each of the module's variables in their declared order.
fn execution_id(module: &ModuleConfig, value_of: impl Fn(&str) -> Option<String>) -> String {
    let mut id = module.name.clone();
    for variable in &module.variables {
        if let Some(value) = value_of(&variable.name) {
            id.push('-');
            id.push_str(&value);
        }
    }
    id
}

impl UnboundExecution {
    /// Bind user-supplied variables, producing an execution that can run.
    ///
    /// User values overlay the expanded values; every placeholder must end
    /// up with a value or the bind fails with
    /// [`TerradagError::MissingRequiredVariables`] naming exactly the
    /// missing variables. All variable values and the module's backend
    /// configuration are then template-rendered against the bound map; an
    /// unresolved `{{.name}}` is a binding failure of the same kind.
    pub fn bind(&self, user_values: &BTreeMap<String, String>) -> Result<BoundExecution> {
        let mut bound: BTreeMap<String, String> = BTreeMap::new();
        let mut missing: Vec<String> = Vec::new();

        for (name, value) in &self.variables {
            match (user_values.get(name), value) {
                (Some(user), _) => {
                    bound.insert(name.clone(), user.clone());
                }
                (None, VarValue::Concrete(s)) => {
                    bound.insert(name.clone(), s.clone());
                }
                (None, VarValue::Placeholder(_)) => missing.push(name.clone()),
            }
        }

        // The bound map carries every user variable, not only the ones this
        // module declares; the ID only ever looks at declared variables.
        for (name, value) in user_values {
            bound.entry(name.clone()).or_insert_with(|| value.clone());
        }

        if !missing.is_empty() {
            missing.sort();
            missing.dedup();
            return Err(TerradagError::MissingRequiredVariables(missing));
        }

        // Values may reference other variables; render them against the
        // bound map and refuse leftovers.
        let rendered_vars = template::render_map_values_strict(&bound, &bound)
            .map_err(TerradagError::MissingRequiredVariables)?;

        let backend_config =
            template::render_map_values_strict(&self.module.remote.backend_config, &rendered_vars)
                .map_err(TerradagError::MissingRequiredVariables)?;

        let mut module = (*self.module).clone();
        module.remote.backend_config = backend_config;

        Ok(BoundExecution {
            module: Arc::new(module),
            variables: rendered_vars,
            tool_args: self.tool_args.clone(),
        })
    }
}

impl ExecutionLike for UnboundExecution {
    fn id(&self) -> String {
        execution_id(&self.module, |name| {
            self.variables.get(name).map(VarValue::text)
        })
    }

    fn module(&self) -> &Arc<ModuleConfig> {
        &self.module
    }

    fn variables_text(&self) -> BTreeMap<String, String> {
        self.variables
            .iter()
            .map(|(k, v)| (k.clone(), v.text()))
            .collect()
    }
}

impl BoundExecution {
    pub fn module(&self) -> &Arc<ModuleConfig> {
        &self.module
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn tool_args(&self) -> &[String] {
        &self.tool_args
    }
}

impl ExecutionLike for BoundExecution {
    fn id(&self) -> String {
        execution_id(&self.module, |name| self.variables.get(name).cloned())
    }

    fn module(&self) -> &Arc<ModuleConfig> {
        &self.module
    }

    fn variables_text(&self) -> BTreeMap<String, String> {
        self.variables.clone()
    }
}
