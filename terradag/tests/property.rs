// tests/property.rs

//! Property tests over execution expansion and binding.

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use terradag::config::model::{ModuleConfig, ModuleHooks, RemoteConfig, ToolConfig, Variable};
use terradag::errors::TerradagError;
use terradag::execution::{bind_all, module_executions, ExecutionLike, ExecutionParams};

/// A module with the given variables, rooted nowhere in particular —
/// expansion never touches the filesystem.
fn module_with(variables: Vec<Variable>) -> Arc<ModuleConfig> {
    Arc::new(ModuleConfig {
        name: "mod".to_string(),
        path: "mod".to_string(),
        deps: Vec::new(),
        remote: RemoteConfig::default(),
        variables,
        terraform: ToolConfig {
            path: None,
            version: Some(semver::Version::new(0, 12, 24)),
        },
        hooks: ModuleHooks {
            pre_module_run: Some(Vec::new()),
        },
        code_root: std::path::PathBuf::from("/"),
    })
}

fn variables_strategy() -> impl Strategy<Value = Vec<Variable>> {
    // Each variable is either free, or enumerated with 1..=3 distinct
    // values; names follow the declaration index.
    let value_sets = prop_oneof![
        Just(None),
        proptest::collection::vec("[a-z][a-z0-9]{0,5}", 1..=3).prop_map(Some),
    ];

    proptest::collection::vec(value_sets, 0..=4).prop_map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(index, values)| Variable {
                name: format!("var{index}"),
                values: values.map(|mut v| {
                    v.sort();
                    v.dedup();
                    v
                }),
            })
            .collect()
    })
}

proptest! {
    /// |executions| = ∏ max(1, |allowed_values(v)|); a module with no
    /// variables yields exactly one execution.
    #[test]
    fn expansion_count_is_the_cartesian_product(variables in variables_strategy()) {
        let expected: usize = variables
            .iter()
            .map(|v| v.values.as_ref().map_or(1, |vals| vals.len().max(1)))
            .product();

        let module = module_with(variables);
        let executions = module_executions(&module, &ExecutionParams::default());

        prop_assert_eq!(executions.len(), expected.max(1));
    }

    /// IDs are deterministic and unique within a module's expansion.
    #[test]
    fn expansion_ids_are_stable_and_unique(variables in variables_strategy()) {
        let module = module_with(variables);

        let first: Vec<String> = module_executions(&module, &ExecutionParams::default())
            .iter()
            .map(|e| e.id())
            .collect();
        let second: Vec<String> = module_executions(&module, &ExecutionParams::default())
            .iter()
            .map(|e| e.id())
            .collect();

        prop_assert_eq!(&first, &second);

        let mut deduped = first.clone();
        deduped.sort();
        deduped.dedup();
        prop_assert_eq!(deduped.len(), first.len(), "duplicate execution IDs: {:?}", first);
    }

    /// Binding succeeds exactly when every free variable is supplied, and
    /// otherwise reports exactly the unsupplied names.
    #[test]
    fn binding_completeness(
        variables in variables_strategy(),
        supply_mask in proptest::collection::vec(any::<bool>(), 4),
    ) {
        let free_names: Vec<String> = variables
            .iter()
            .filter(|v| v.values.is_none())
            .map(|v| v.name.clone())
            .collect();

        let module = module_with(variables);
        let executions = module_executions(&module, &ExecutionParams::default());

        let mut user_values = BTreeMap::new();
        let mut expected_missing = Vec::new();
        for (index, name) in free_names.iter().enumerate() {
            if supply_mask.get(index).copied().unwrap_or(false) {
                user_values.insert(name.clone(), "value".to_string());
            } else {
                expected_missing.push(name.clone());
            }
        }

        match bind_all(&executions, &user_values) {
            Ok(bound) => {
                prop_assert!(expected_missing.is_empty());
                prop_assert_eq!(bound.len(), executions.len());
            }
            Err(TerradagError::MissingRequiredVariables(missing)) => {
                expected_missing.sort();
                prop_assert_eq!(missing, expected_missing);
            }
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }
}
