// tests/dag_graph.rs

use terradag::dag::{ExecutionDag, ROOT_NODE};
use terradag::errors::TerradagError;

fn diamond() -> ExecutionDag {
    // d depends on b and c; b and c depend on a.
    let mut dag = ExecutionDag::new();
    dag.add_edge("b", "a");
    dag.add_edge("c", "a");
    dag.add_edge("d", "b");
    dag.add_edge("d", "c");
    dag
}

#[test]
fn edges_record_deps_and_dependents() {
    let dag = diamond();

    assert_eq!(dag.deps_of("d"), &["b".to_string(), "c".to_string()]);
    assert_eq!(dag.deps_of("a"), &[] as &[String]);

    let mut dependents = dag.dependents_of("a").to_vec();
    dependents.sort();
    assert_eq!(dependents, vec!["b".to_string(), "c".to_string()]);
}

#[test]
fn duplicate_edges_are_ignored() {
    let mut dag = ExecutionDag::new();
    dag.add_edge("b", "a");
    dag.add_edge("b", "a");

    assert_eq!(dag.deps_of("b"), &["a".to_string()]);
    assert_eq!(dag.dependents_of("a"), &["b".to_string()]);
}

#[test]
fn root_is_added_once_and_points_at_sources() {
    let mut dag = diamond();
    dag.ensure_root();
    dag.ensure_root();

    // Only d has no dependents, so the root depends exactly on d.
    assert_eq!(dag.deps_of(ROOT_NODE), &["d".to_string()]);
    assert_eq!(dag.execution_ids().count(), 4);
    assert_eq!(dag.ids().count(), 5);
}

#[test]
fn acyclic_graph_validates() {
    let mut dag = diamond();
    dag.ensure_root();
    assert!(dag.validate_acyclic().is_ok());
}

#[test]
fn cycles_fail_validation_naming_an_involved_node() {
    let mut dag = ExecutionDag::new();
    dag.add_edge("a", "b");
    dag.add_edge("b", "c");
    dag.add_edge("c", "a");

    let err = dag.validate_acyclic().unwrap_err();
    match err {
        TerradagError::DagCycle(node) => {
            assert!(["a", "b", "c"].contains(&node.as_str()), "odd node: {node}");
        }
        other => panic!("expected DagCycle, got {other}"),
    }
}

#[test]
fn unknown_nodes_have_no_edges() {
    let dag = diamond();
    assert!(dag.deps_of("ghost").is_empty());
    assert!(dag.dependents_of("ghost").is_empty());
    assert!(!dag.contains("ghost"));
}
