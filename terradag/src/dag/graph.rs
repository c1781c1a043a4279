// src/dag/graph.rs

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{Result, TerradagError};

/// Name of the synthetic root node connected to every source of the graph.
pub const ROOT_NODE: &str = "root";

/// Internal node structure: immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Executions that must complete before this one can run.
    deps: Vec<String>,
    /// Executions that depend on this one.
    dependents: Vec<String>,
}

/// In-memory DAG of executions, keyed by execution ID.
///
/// Edges point from an execution to the executions it depends on. The graph
/// keeps adjacency in both directions so the runtime walk can find newly
/// ready dependents cheaply.
#[derive(Debug, Clone, Default)]
pub struct ExecutionDag {
    nodes: BTreeMap<String, DagNode>,
}

impl ExecutionDag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: impl Into<String>) {
        self.nodes.entry(id.into()).or_default();
    }

    /// Record that `from` depends on `to`. Missing nodes are created;
    /// duplicate edges are ignored.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.add_node(from);
        self.add_node(to);

        let already = self
            .nodes
            .get(from)
            .map(|n| n.deps.iter().any(|d| d == to))
            .unwrap_or(false);
        if already {
            return;
        }

        if let Some(node) = self.nodes.get_mut(from) {
            node.deps.push(to.to_string());
        }
        if let Some(node) = self.nodes.get_mut(to) {
            node.dependents.push(from.to_string());
        }
    }

    /// All node IDs, the synthetic root included once added.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Node IDs excluding the synthetic root.
    pub fn execution_ids(&self) -> impl Iterator<Item = &str> {
        self.ids().filter(|id| *id != ROOT_NODE)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Immediate dependencies of a node.
    pub fn deps_of(&self, id: &str) -> &[String] {
        self.nodes.get(id).map(|n| n.deps.as_slice()).unwrap_or(&[])
    }

    /// Immediate dependents of a node.
    pub fn dependents_of(&self, id: &str) -> &[String] {
        self.nodes
            .get(id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Add the synthetic root and connect it to every source node (every
    /// execution nothing else depends on), so a traversal has a single
    /// entry point.
    pub fn ensure_root(&mut self) {
        if self.nodes.contains_key(ROOT_NODE) {
            return;
        }

        let sources: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.dependents.is_empty())
            .map(|(id, _)| id.clone())
            .collect();

        self.add_node(ROOT_NODE);
        for id in sources {
            self.add_edge(ROOT_NODE, &id);
        }
    }

    /// Fail with [`TerradagError::DagCycle`] if the graph is not acyclic.
    pub fn validate_acyclic(&self) -> Result<()> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for id in self.nodes.keys() {
            graph.add_node(id.as_str());
        }
        for (id, node) in &self.nodes {
            for dep in &node.deps {
                graph.add_edge(dep.as_str(), id.as_str(), ());
            }
        }

        match toposort(&graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(TerradagError::DagCycle(cycle.node_id().to_string())),
        }
    }
}
