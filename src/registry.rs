use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One live pairing session: the external client's auth directory plus the
/// task driving the client.
struct SessionEntry {
    temp_dir: PathBuf,
    task: Option<JoinHandle<()>>,
}

/// In-memory map of active sessions, owned for the process lifetime and
/// passed explicitly to handlers. Entries are created when a browser joins a
/// relay room and destroyed on close, error, or the retention timeout.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, SessionEntry>>,
    temp_root: PathBuf,
}

impl SessionRegistry {
    pub fn new(temp_root: PathBuf) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            temp_root,
        }
    }

    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    /// Delete any stale temp root left over from a previous run. Called once
    /// before the listener binds.
    pub async fn sweep_temp_root(&self) {
        match tokio::fs::remove_dir_all(&self.temp_root).await {
            Ok(()) => info!("removed stale temp root {}", self.temp_root.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                "failed to sweep temp root {}: {err}",
                self.temp_root.display()
            ),
        }
    }

    /// Create a fresh temp directory for the session and register it. Any
    /// previous entry for the same id is torn down first, so at most one
    /// client handle is live per session id.
    pub async fn create(&self, session_id: &str) -> Result<PathBuf> {
        if self.sessions.contains_key(session_id) {
            debug!("session {session_id} rejoined; tearing down previous entry");
            self.cleanup(session_id).await;
        }

        let temp_dir = self.temp_root.join(session_id);
        if tokio::fs::try_exists(&temp_dir).await.unwrap_or(false) {
            let _ = tokio::fs::remove_dir_all(&temp_dir).await;
        }
        tokio::fs::create_dir_all(&temp_dir)
            .await
            .with_context(|| format!("failed to create {}", temp_dir.display()))?;

        self.sessions.insert(
            session_id.to_string(),
            SessionEntry {
                temp_dir: temp_dir.clone(),
                task: None,
            },
        );

        Ok(temp_dir)
    }

    /// Hand ownership of the connector's driving task to the registry so
    /// cleanup can abort it.
    pub fn attach_task(&self, session_id: &str, task: JoinHandle<()>) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            if let Some(old) = entry.task.replace(task) {
                old.abort();
            }
        } else {
            // Session was already cleaned up; don't leak the client task.
            task.abort();
        }
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Destroy a session: abort the client task and delete the temp
    /// directory. Filesystem failures are logged and swallowed.
    pub async fn cleanup(&self, session_id: &str) {
        let Some((_, entry)) = self.sessions.remove(session_id) else {
            return;
        };

        if let Some(task) = entry.task {
            task.abort();
        }

        match tokio::fs::remove_dir_all(&entry.temp_dir).await {
            Ok(()) => debug!("session {session_id} cleaned up"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                "failed to remove {} for session {session_id}: {err}",
                entry.temp_dir.display()
            ),
        }
    }

    /// Destroy the session after a fixed delay. This is the only cancellation
    /// mechanism for connections whose browser tab has gone away.
    pub fn schedule_cleanup(&self, session_id: String, delay: Duration) {
        let registry = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!("retention window elapsed for session {session_id}");
            registry.cleanup(&session_id).await;
        });
    }

    /// Tear down every active session; used on shutdown.
    pub async fn drain(&self) {
        let ids: Vec<String> = self
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for id in ids {
            self.cleanup(&id).await;
        }
    }
}
