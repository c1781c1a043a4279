// src/session/repo.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use tracing::debug;
use ulid::Ulid;

use crate::errors::Result;
use crate::session::SessionContext;

/// Parent directory containing individual sessions, one per orchestrator
/// invocation.
#[derive(Debug)]
pub struct SessionRepo {
    path: PathBuf,
    ctx: Arc<SessionContext>,
    current: Mutex<Option<Arc<Session>>>,
}

/// A timestamp-sortable directory hosting one invocation's per-execution
/// subdirectories, logs and sandboxes. Sessions persist after the run for
/// post-mortem inspection; nothing cleans them up automatically.
#[derive(Debug)]
pub struct Session {
    id: String,
    path: PathBuf,
    pub(crate) ctx: Arc<SessionContext>,
}

impl SessionRepo {
    /// Create or open a session repository at `path`.
    pub fn open(path: PathBuf, ctx: Arc<SessionContext>) -> Result<Self> {
        if !path.is_dir() {
            std::fs::create_dir_all(&path)
                .with_context(|| format!("creating session repository at {:?}", path))?;
        }

        Ok(Self {
            path,
            ctx,
            current: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a fresh session directory named by a new ULID.
    pub fn new_session(&self) -> Result<Arc<Session>> {
        let id = Ulid::new().to_string();
        let session_path = self.path.join(&id);

        std::fs::create_dir(&session_path)
            .with_context(|| format!("creating session directory {:?}", session_path))?;
        debug!(session = %id, path = ?session_path, "created session");

        Ok(Arc::new(Session {
            id,
            path: session_path,
            ctx: Arc::clone(&self.ctx),
        }))
    }

    /// The session for this invocation, created on first use.
    pub fn current(&self) -> Result<Arc<Session>> {
        let mut current = self.current.lock();
        if let Some(session) = current.as_ref() {
            return Ok(Arc::clone(session));
        }

        let session = self.new_session()?;
        *current = Some(Arc::clone(&session));
        Ok(session)
    }
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
