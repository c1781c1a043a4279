// src/errors.rs

//! Crate-wide error taxonomy.
//!
//! Startup-time errors (bad configuration, unresolvable dependencies,
//! missing user variables) are raised from the top-level `Project` calls.
//! Per-execution failures are never raised: they travel on the results
//! channel inside an [`crate::result::ExecutionResult`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TerradagError {
    /// Fatal configuration problem; no session is created.
    #[error("configuration error: {0}")]
    Config(String),

    /// Free variables that must be supplied at runtime were not.
    ///
    /// Carries the variable names; the CLI renders them back as flag names.
    #[error("missing required variable{}: {}", if .0.len() == 1 { "" } else { "s" }, .0.join(", "))]
    MissingRequiredVariables(Vec<String>),

    /// The execution graph contains a cycle.
    #[error("cycle detected in execution graph involving '{0}'")]
    DagCycle(String),

    /// A declared dependency does not resolve to any execution.
    #[error("invalid dependency for {module}: {reason}")]
    InvalidDependency { module: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TerradagError>;
