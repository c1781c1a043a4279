// tests/tool_session.rs

use std::collections::BTreeMap;
use std::error::Error;

use terradag::exec::Interruptor;
use terradag::tool::{ToolSession, ToolSessionConfig};

mod support;
use support::fake_terraform;

type TestResult = Result<(), Box<dyn Error>>;

fn session_config(
    code_root: &std::path::Path,
    tool_path: &std::path::Path,
) -> ToolSessionConfig {
    ToolSessionConfig {
        name: "app".to_string(),
        code_base_path: code_root.to_path_buf(),
        module_rel_path: "app".to_string(),
        remote: Default::default(),
        variables: BTreeMap::new(),
        tool_binary_path: tool_path.to_path_buf(),
        shared_plugin_dir: None,
        extra_args: Vec::new(),
    }
}

/// Build a little code tree with content that must and must not be cloned.
fn code_tree(dir: &std::path::Path) {
    std::fs::create_dir_all(dir.join("app")).expect("mkdir app");
    std::fs::write(dir.join("app/main.tf"), "resource \"null_resource\" \"x\" {}\n")
        .expect("write main.tf");
    std::fs::write(dir.join("shared.tf"), "# shared\n").expect("write shared.tf");

    std::fs::create_dir_all(dir.join("app/.terraform")).expect("mkdir .terraform");
    std::fs::write(dir.join("app/.terraform/junk"), "junk").expect("write junk");
    std::fs::write(dir.join("app/terraform.tfstate"), "{}").expect("write tfstate");
    std::fs::write(dir.join("app/terraform.tfstate.backup"), "{}").expect("write backup");
    std::fs::create_dir_all(dir.join(".terradag")).expect("mkdir .terradag");
    std::fs::write(dir.join(".terradag/session-junk"), "junk").expect("write session junk");
}

#[tokio::test]
async fn create_clones_the_tree_with_hard_links() -> TestResult {
    let dir = tempfile::tempdir()?;
    let code_root = dir.path().join("code");
    code_tree(&code_root);
    let tool_path = fake_terraform(dir.path(), "terraform");

    let base = dir.path().join("session/app");
    let session = ToolSession::create(
        "app",
        base.clone(),
        session_config(&code_root, &tool_path),
        Interruptor::new(),
    )
    .await?;

    let cloned = session.sandbox_dir().join("app/main.tf");
    assert!(cloned.is_file());
    assert!(session.sandbox_dir().join("shared.tf").is_file());
    assert_eq!(session.module_dir(), session.sandbox_dir().join("app"));
    assert!(!session.initialized());

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let original = std::fs::metadata(code_root.join("app/main.tf"))?;
        let clone = std::fs::metadata(&cloned)?;
        assert_eq!(original.ino(), clone.ino(), "clone is not a hard link");
    }
    Ok(())
}

#[tokio::test]
async fn create_skips_scratch_state() -> TestResult {
    let dir = tempfile::tempdir()?;
    let code_root = dir.path().join("code");
    code_tree(&code_root);
    let tool_path = fake_terraform(dir.path(), "terraform");

    let session = ToolSession::create(
        "app",
        dir.path().join("session/app"),
        session_config(&code_root, &tool_path),
        Interruptor::new(),
    )
    .await?;

    let module = session.module_dir();
    assert!(!module.join(".terraform").exists());
    assert!(!module.join("terraform.tfstate").exists());
    assert!(!module.join("terraform.tfstate.backup").exists());
    assert!(!session.sandbox_dir().join(".terradag").exists());
    Ok(())
}

#[tokio::test]
async fn create_refuses_an_existing_session_directory() -> TestResult {
    let dir = tempfile::tempdir()?;
    let code_root = dir.path().join("code");
    code_tree(&code_root);
    let tool_path = fake_terraform(dir.path(), "terraform");

    let base = dir.path().join("session/app");
    ToolSession::create(
        "app",
        base.clone(),
        session_config(&code_root, &tool_path),
        Interruptor::new(),
    )
    .await?;

    let err = ToolSession::create(
        "app",
        base,
        session_config(&code_root, &tool_path),
        Interruptor::new(),
    )
    .await
    .unwrap_err();

    assert!(
        err.to_string().contains("session already exists"),
        "got: {err}"
    );
    Ok(())
}

#[tokio::test]
async fn empty_module_path_fails_validation() -> TestResult {
    let dir = tempfile::tempdir()?;
    let code_root = dir.path().join("code");
    code_tree(&code_root);
    let tool_path = fake_terraform(dir.path(), "terraform");

    let mut config = session_config(&code_root, &tool_path);
    config.module_rel_path = String::new();

    let err = ToolSession::create("app", dir.path().join("s"), config, Interruptor::new())
        .await
        .unwrap_err();
    assert!(
        err.to_string().contains("module path cannot be empty"),
        "got: {err}"
    );
    Ok(())
}

#[tokio::test]
async fn version_detection_is_cached_per_session() -> TestResult {
    let dir = tempfile::tempdir()?;
    let code_root = dir.path().join("code");
    code_tree(&code_root);

    // A script that logs every invocation, so the test can count spawns.
    let counter = dir.path().join("calls");
    let script = format!(
        "#!/bin/sh\necho run >> {}\necho \"Terraform v0.12.24\"\necho \"\"\n",
        counter.display()
    );
    let tool_path = support::write_script(dir.path(), "terraform", &script);

    let session = ToolSession::create(
        "app",
        dir.path().join("session/app"),
        session_config(&code_root, &tool_path),
        Interruptor::new(),
    )
    .await?;

    let first = session.version().await?.clone();
    let second = session.version().await?.clone();
    assert_eq!(first, semver::Version::new(0, 12, 24));
    assert_eq!(first, second);

    let calls = std::fs::read_to_string(&counter)?;
    assert_eq!(calls.lines().count(), 1, "version detected more than once");
    Ok(())
}
