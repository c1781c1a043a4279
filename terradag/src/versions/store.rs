// src/versions/store.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::Result;

/// Name of the Terraform binary inside the archive and the store.
const TOOL_BINARY: &str = "terraform";

/// Where release archives are downloaded from. Interpolated with
/// `(version, version, platform, arch)`.
const DOWNLOAD_URL: &str =
    "https://releases.hashicorp.com/terraform/{version}/terraform_{version}_{platform}_{arch}.zip";

/// A directory on the filesystem keeping Terraform binaries, laid out as
/// `<repo>/<platform>/<arch>/<version>/terraform`.
///
/// [`VersionStore::get`] serialises concurrent requests for the same
/// version behind a per-version mutex, so at most one task downloads a
/// given version while the rest wait for the cached path. Different
/// versions download in parallel.
#[derive(Debug)]
pub struct VersionStore {
    repo_path: PathBuf,
    platform: String,
    arch: String,

    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl VersionStore {
    /// Open (creating if needed) a version store at `repo_path`.
    pub fn new(repo_path: PathBuf, platform: String, arch: String) -> Result<Self> {
        std::fs::create_dir_all(&repo_path)
            .with_context(|| format!("creating version store at {:?}", repo_path))?;

        Ok(Self {
            repo_path,
            platform,
            arch,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Open a version store with platform and architecture detected from
    /// the current system. With no explicit path, the store lives in
    /// `~/.terradag/versions`.
    pub fn for_current_system(repo_path: Option<PathBuf>) -> Result<Self> {
        let repo_path = match repo_path {
            Some(p) => p,
            None => {
                let home = std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .ok_or_else(|| anyhow!("HOME is not set; cannot locate version store"))?;
                home.join(".terradag").join("versions")
            }
        };

        Self::new(
            repo_path,
            release_platform().to_string(),
            release_arch().to_string(),
        )
    }

    /// The path to the binary for `version`, downloading and caching it
    /// first when it is not in the store yet. Repeated calls after the
    /// first success return the same path without network I/O.
    pub async fn get(&self, version: &str) -> Result<PathBuf> {
        let lock = self.lock_for(version).await;
        let _guard = lock.lock().await;

        let path = self.binary_path(version);
        if path.is_file() {
            debug!(version, path = ?path, "terraform binary already cached");
            return Ok(path);
        }

        self.download(version).await?;
        Ok(path)
    }

    fn version_dir(&self, version: &str) -> PathBuf {
        self.repo_path
            .join(&self.platform)
            .join(&self.arch)
            .join(version)
    }

    /// Path of the cached binary for `version`, whether or not it exists.
    pub fn binary_path(&self, version: &str) -> PathBuf {
        self.version_dir(version).join(TOOL_BINARY)
    }

    /// Symlink the binary for `version` at `target_path`, downloading it
    /// first when needed. With `overwrite`, an existing link or file at the
    /// target is replaced.
    pub async fn link(&self, version: &str, target_path: &Path, overwrite: bool) -> Result<()> {
        let binary = self.get(version).await?;

        if overwrite && target_path.symlink_metadata().is_ok() {
            std::fs::remove_file(target_path)
                .with_context(|| format!("removing existing {:?}", target_path))?;
        }

        make_symlink(&binary, target_path)
            .with_context(|| format!("linking {:?} to {:?}", target_path, binary))?;
        Ok(())
    }

    async fn lock_for(&self, version: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(version.to_string()).or_default())
    }

    async fn download(&self, version: &str) -> Result<()> {
        let url = DOWNLOAD_URL
            .replace("{version}", version)
            .replace("{platform}", &self.platform)
            .replace("{arch}", &self.arch);

        info!(version, url = %url, "downloading terraform");

        // Scratch space inside the repo so the final rename stays on one
        // filesystem.
        let scratch = tempfile::tempdir_in(&self.repo_path)
            .with_context(|| format!("creating scratch directory in {:?}", self.repo_path))?;

        let response = reqwest::get(&url)
            .await
            .with_context(|| format!("downloading {url}"))?
            .error_for_status()
            .with_context(|| format!("downloading {url}"))?;
        let body = response
            .bytes()
            .await
            .with_context(|| format!("reading download body from {url}"))?;

        let zip_path = scratch.path().join("terraform.zip");
        tokio::fs::write(&zip_path, &body)
            .await
            .with_context(|| format!("writing {:?}", zip_path))?;

        let extract_dir = scratch.path().to_path_buf();
        tokio::task::spawn_blocking({
            let zip_path = zip_path.clone();
            let extract_dir = extract_dir.clone();
            move || unzip(&zip_path, &extract_dir)
        })
        .await
        .context("zip extraction task failed")??;

        let extracted = extract_dir.join(TOOL_BINARY);
        if !extracted.is_file() {
            return Err(anyhow!("terraform binary missing from zip file downloaded from {url}").into());
        }

        let target_dir = self.version_dir(version);
        std::fs::create_dir_all(&target_dir)
            .with_context(|| format!("creating {:?}", target_dir))?;
        std::fs::rename(&extracted, target_dir.join(TOOL_BINARY))
            .with_context(|| format!("moving terraform binary into {:?}", target_dir))?;

        info!(version, "terraform installed into version store");
        Ok(())
    }
}

/// Decompress a zip archive into `dest_dir`.
///
/// Every entry path is validated to stay inside the destination; an entry
/// that would escape (e.g. `../naughty.txt`) fails the extraction before
/// anything is written outside the target. File entries are created with
/// the mode recorded in the archive.
pub fn unzip(zip_path: &Path, dest_dir: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::open(zip_path)
        .with_context(|| format!("opening zip archive {:?}", zip_path))?;
    let mut archive =
        zip::ZipArchive::new(file).with_context(|| format!("reading zip archive {:?}", zip_path))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .with_context(|| format!("reading entry {index} of {:?}", zip_path))?;

        let relative = entry.enclosed_name().ok_or_else(|| {
            anyhow!(
                "zip entry {:?} escapes the extraction directory (path traversal)",
                entry.name()
            )
        })?;
        let out_path = dest_dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)
                .with_context(|| format!("creating directory {:?}", out_path))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {:?}", parent))?;
        }

        let mut out = std::fs::File::create(&out_path)
            .with_context(|| format!("creating file {:?}", out_path))?;
        std::io::copy(&mut entry, &mut out)
            .with_context(|| format!("extracting {:?}", out_path))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))
                .with_context(|| format!("setting permissions on {:?}", out_path))?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn make_symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(not(unix))]
fn make_symlink(_original: &Path, link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("cannot create symlink {:?} on this platform", link),
    ))
}

/// Platform name as used in release archive URLs.
fn release_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// Architecture name as used in release archive URLs.
fn release_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        other => other,
    }
}
