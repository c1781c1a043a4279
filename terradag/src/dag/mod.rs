// src/dag/mod.rs

//! Execution dependency graph.
//!
//! [`graph`] holds a simple directed acyclic graph keyed by execution ID,
//! with a synthetic root so a walk has a single entry point. Acyclicity is
//! checked at construction time with petgraph's toposort.

pub mod graph;

pub use graph::{ExecutionDag, ROOT_NODE};
