// src/session/mod.rs

//! Sessions: per-invocation workspace directories and the operations that
//! run inside them.
//!
//! - [`repo`] manages the `.terradag` session repository and its
//!   ULID-named session directories.
//! - [`runner`] fans executions out over Terraform sessions and streams
//!   status and results back on channels.

pub mod repo;
pub mod runner;

use std::path::PathBuf;
use std::sync::Arc;

use crate::exec::Interruptor;
use crate::versions::VersionStore;

pub use repo::{Session, SessionRepo};

/// How many executions plan and flat apply run concurrently.
pub const PARALLELISM: usize = 10;

/// Shared services a session needs to run executions.
#[derive(Debug)]
pub struct SessionContext {
    pub versions: Arc<VersionStore>,
    pub interrupt: Interruptor,
    /// Plugin cache directory shared by all executions of this invocation.
    pub plugin_cache_dir: PathBuf,
}
