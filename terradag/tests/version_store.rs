// tests/version_store.rs

use std::error::Error;

use terradag::versions::VersionStore;

mod support;
use support::write_script;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn cached_binary_is_returned_without_downloading() -> TestResult {
    let dir = tempfile::tempdir()?;
    let store = VersionStore::new(
        dir.path().to_path_buf(),
        "linux".to_string(),
        "amd64".to_string(),
    )?;

    // Pre-place the binary where the store expects it; get() must return
    // it without touching the network.
    let version_dir = dir.path().join("linux/amd64/0.12.24");
    std::fs::create_dir_all(&version_dir)?;
    write_script(&version_dir, "terraform", "#!/bin/sh\nexit 0\n");

    let first = store.get("0.12.24").await?;
    let second = store.get("0.12.24").await?;

    assert_eq!(first, version_dir.join("terraform"));
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn binary_path_follows_platform_arch_version_layout() -> TestResult {
    let dir = tempfile::tempdir()?;
    let store = VersionStore::new(
        dir.path().to_path_buf(),
        "darwin".to_string(),
        "arm64".to_string(),
    )?;

    assert_eq!(
        store.binary_path("0.11.7"),
        dir.path().join("darwin/arm64/0.11.7/terraform")
    );
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn link_points_a_path_at_the_cached_binary() -> TestResult {
    let dir = tempfile::tempdir()?;
    let store = VersionStore::new(
        dir.path().to_path_buf(),
        "linux".to_string(),
        "amd64".to_string(),
    )?;

    let version_dir = dir.path().join("linux/amd64/0.12.24");
    std::fs::create_dir_all(&version_dir)?;
    write_script(&version_dir, "terraform", "#!/bin/sh\nexit 0\n");

    let target = dir.path().join("current-terraform");
    store.link("0.12.24", &target, false).await?;
    assert_eq!(std::fs::read_link(&target)?, version_dir.join("terraform"));

    // Re-linking without overwrite fails; with overwrite it replaces.
    assert!(store.link("0.12.24", &target, false).await.is_err());
    store.link("0.12.24", &target, true).await?;
    assert_eq!(std::fs::read_link(&target)?, version_dir.join("terraform"));
    Ok(())
}

#[tokio::test]
async fn concurrent_requests_for_a_cached_version_all_resolve() -> TestResult {
    let dir = tempfile::tempdir()?;
    let store = std::sync::Arc::new(VersionStore::new(
        dir.path().to_path_buf(),
        "linux".to_string(),
        "amd64".to_string(),
    )?);

    let version_dir = dir.path().join("linux/amd64/0.11.7");
    std::fs::create_dir_all(&version_dir)?;
    write_script(&version_dir, "terraform", "#!/bin/sh\nexit 0\n");

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let store = std::sync::Arc::clone(&store);
        tasks.spawn(async move { store.get("0.11.7").await });
    }

    while let Some(result) = tasks.join_next().await {
        let path = result??;
        assert_eq!(path, version_dir.join("terraform"));
    }
    Ok(())
}
