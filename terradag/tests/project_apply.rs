// tests/project_apply.rs

//! End-to-end apply flows, with and without the dependency graph.

use std::error::Error;

use terradag::project::{OperationParams, Project};

mod support;
use support::{
    drain_results, failing_terraform, fake_terraform, result_ids, scenario_config, tool_config,
    user_values,
};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn graph_apply_skips_the_dependents_of_a_failed_execution() -> TestResult {
    let code = tempfile::tempdir()?;
    let repo = tempfile::tempdir()?;
    let tf = fake_terraform(code.path(), "fake-terraform");
    let failing = failing_terraform(code.path(), "failing-terraform");

    // `users` runs with a broken binary; `app` and `database` depend on it.
    let config = scenario_config(
        code.path(),
        repo.path(),
        &tool_config(&tf),
        Some(&tool_config(&failing)),
    );

    let project = Project::new(config).await?;
    let (_status, results) = project
        .apply(OperationParams {
            user_vars: user_values(&[("aws_region", "east1")]),
            ..Default::default()
        })
        .await?;

    let results = drain_results(results).await;

    // users fails; network and mgmt are unaffected; every app and
    // database execution is skipped and therefore absent.
    assert_eq!(
        result_ids(&results),
        vec![
            "mgmt-east1",
            "network-east1-dev",
            "network-east1-mgmt",
            "network-east1-prod",
            "network-east1-staging",
            "users",
        ]
    );

    for result in &results {
        if result.id == "users" {
            let error = result.error.as_ref().expect("users must fail");
            assert!(error.contains("Error parsing"), "unexpected error: {error}");
        } else {
            assert!(
                result.error.is_none(),
                "{} failed unexpectedly: {:?}",
                result.id,
                result.error
            );
        }
    }
    Ok(())
}

#[tokio::test]
async fn filtered_apply_bypasses_dependency_ordering() -> TestResult {
    let code = tempfile::tempdir()?;
    let repo = tempfile::tempdir()?;
    let tf = fake_terraform(code.path(), "fake-terraform");
    let failing = failing_terraform(code.path(), "failing-terraform");

    let config = scenario_config(
        code.path(),
        repo.path(),
        &tool_config(&tf),
        Some(&tool_config(&failing)),
    );

    let project = Project::new(config).await?;
    let (_status, results) = project
        .apply(OperationParams {
            module_names: Some(vec!["app".to_string(), "users".to_string()]),
            user_vars: user_values(&[("aws_region", "east1")]),
            ..Default::default()
        })
        .await?;

    let results = drain_results(results).await;

    // With --modules the apply is flat: app executions run even though
    // their `users` dependency fails in the same operation.
    assert_eq!(
        result_ids(&results),
        vec![
            "app-east1-dev",
            "app-east1-prod",
            "app-east1-staging",
            "users",
        ]
    );
    for result in &results {
        if result.id == "users" {
            assert!(result.error.is_some());
        } else {
            assert!(result.error.is_none(), "{} failed: {:?}", result.id, result.error);
        }
    }
    Ok(())
}

#[tokio::test]
async fn unfiltered_apply_succeeds_across_the_whole_graph() -> TestResult {
    let code = tempfile::tempdir()?;
    let repo = tempfile::tempdir()?;
    let tf = fake_terraform(code.path(), "fake-terraform");
    let config = scenario_config(code.path(), repo.path(), &tool_config(&tf), None);

    let project = Project::new(config).await?;
    let (_status, results) = project
        .apply(OperationParams {
            user_vars: user_values(&[("aws_region", "east1")]),
            ..Default::default()
        })
        .await?;

    let results = drain_results(results).await;
    assert_eq!(results.len(), 12);
    assert!(results.iter().all(|r| r.error.is_none()));
    Ok(())
}

#[tokio::test]
async fn graph_apply_runs_dependencies_before_dependents() -> TestResult {
    let code = tempfile::tempdir()?;
    let repo = tempfile::tempdir()?;
    let order_log = code.path().join("apply-order.log");

    // Applies append their execution ID (the grandparent of the sandbox
    // module directory) to a shared log, recording completion order.
    let script = format!(
        "#!/bin/sh\n\
         if [ \"$1\" = version ]; then\n\
           echo \"Terraform v0.12.24\"\n\
           echo \"\"\n\
           exit 0\n\
         fi\n\
         if [ \"$1\" = apply ]; then\n\
           basename \"$(dirname \"$(dirname \"$PWD\")\")\" >> {}\n\
         fi\n\
         exit 0\n",
        order_log.display()
    );
    let tf = support::write_script(code.path(), "ordering-terraform", &script);

    let config = scenario_config(code.path(), repo.path(), &tool_config(&tf), None);
    let project = Project::new(config).await?;
    let (_status, results) = project
        .apply(OperationParams {
            user_vars: user_values(&[("aws_region", "east1")]),
            ..Default::default()
        })
        .await?;
    let results = drain_results(results).await;
    assert_eq!(results.len(), 12);

    let log = std::fs::read_to_string(&order_log)?;
    let order: Vec<&str> = log.lines().collect();
    let position = |id: &str| {
        order
            .iter()
            .position(|entry| *entry == id)
            .unwrap_or_else(|| panic!("{id} not applied; order: {order:?}"))
    };

    // Every app/database execution applies after its users and network
    // dependencies; mgmt applies after the mgmt network.
    for env in ["dev", "prod", "staging"] {
        let network = position(&format!("network-east1-{env}"));
        assert!(position(&format!("app-east1-{env}")) > network);
        assert!(position(&format!("app-east1-{env}")) > position("users"));
        assert!(position(&format!("database-east1-{env}")) > network);
    }
    assert!(position("mgmt-east1") > position("network-east1-mgmt"));
    Ok(())
}

#[tokio::test]
async fn project_construction_fails_fast_on_an_unresolvable_dependency() -> TestResult {
    let code = tempfile::tempdir()?;
    let repo = tempfile::tempdir()?;
    let tf = fake_terraform(code.path(), "fake-terraform");
    let tool = tool_config(&tf);

    let mut network = support::module(code.path(), "network", &tool);
    network.variables = vec![support::enum_var("environment", &["dev", "prod"])];

    let mut app = support::module(code.path(), "app", &tool);
    app.deps = vec![support::dep_with("network", &[("environment", "qa")])];

    let config = terradag::config::model::ProjectConfig {
        terraform: tool.clone(),
        modules: vec![network, app],
        session_repo_dir: repo.path().to_path_buf(),
        terraform_code_root: code.path().to_path_buf(),
        ..Default::default()
    };

    let err = Project::new(config).await.unwrap_err();
    assert!(
        err.to_string().contains("invalid dependency for app"),
        "got: {err}"
    );
    Ok(())
}

#[tokio::test]
async fn project_construction_fails_fast_on_a_cycle() -> TestResult {
    let code = tempfile::tempdir()?;
    let repo = tempfile::tempdir()?;
    let tf = fake_terraform(code.path(), "fake-terraform");
    let tool = tool_config(&tf);

    let mut a = support::module(code.path(), "a", &tool);
    a.deps = vec![support::dep("b")];
    let mut b = support::module(code.path(), "b", &tool);
    b.deps = vec![support::dep("a")];

    let config = terradag::config::model::ProjectConfig {
        terraform: tool.clone(),
        modules: vec![a, b],
        session_repo_dir: repo.path().to_path_buf(),
        terraform_code_root: code.path().to_path_buf(),
        ..Default::default()
    };

    let err = Project::new(config).await.unwrap_err();
    assert!(
        err.to_string().contains("cycle detected"),
        "got: {err}"
    );
    Ok(())
}

#[tokio::test]
async fn startup_hook_failure_aborts_project_construction() -> TestResult {
    let code = tempfile::tempdir()?;
    let repo = tempfile::tempdir()?;
    let tf = fake_terraform(code.path(), "fake-terraform");
    let tool = tool_config(&tf);

    let config = terradag::config::model::ProjectConfig {
        terraform: tool.clone(),
        hooks: terradag::config::model::ProjectHooks {
            startup: vec![terradag::config::model::HookSpec {
                command: "false".to_string(),
                set_env: false,
            }],
            pre_module_run: Vec::new(),
        },
        modules: vec![support::module(code.path(), "solo", &tool)],
        session_repo_dir: repo.path().to_path_buf(),
        terraform_code_root: code.path().to_path_buf(),
        ..Default::default()
    };

    let err = Project::new(config).await.unwrap_err();
    assert!(
        err.to_string().contains("error running startup hook"),
        "got: {err}"
    );
    Ok(())
}

#[tokio::test]
async fn pre_module_hook_failure_fails_that_execution() -> TestResult {
    let code = tempfile::tempdir()?;
    let repo = tempfile::tempdir()?;
    let tf = fake_terraform(code.path(), "fake-terraform");
    let tool = tool_config(&tf);

    let mut solo = support::module(code.path(), "solo", &tool);
    solo.hooks.pre_module_run = Some(vec![terradag::config::model::HookSpec {
        command: "false".to_string(),
        set_env: false,
    }]);

    let config = terradag::config::model::ProjectConfig {
        terraform: tool.clone(),
        modules: vec![solo],
        session_repo_dir: repo.path().to_path_buf(),
        terraform_code_root: code.path().to_path_buf(),
        ..Default::default()
    };

    let project = Project::new(config).await?;
    let (_status, results) = project.plan(OperationParams::default(), false).await?;
    let results = drain_results(results).await;

    assert_eq!(results.len(), 1);
    let error = results[0].error.as_ref().expect("hook failure expected");
    assert!(
        error.contains("pre-module-run hook"),
        "unexpected error: {error}"
    );
    Ok(())
}
