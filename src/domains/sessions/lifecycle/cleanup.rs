use crate::domains::git::WorktreeProvisioner;
use crate::domains::sessions::entity::Session;
use crate::domains::sessions::handle::AgentSession;
use log::{info, warn};
use std::sync::Arc;

/// Best-effort teardown that runs before the authoritative row delete.
pub struct DeletionCoordinator<'a> {
    provisioner: &'a dyn WorktreeProvisioner,
}

#[derive(Debug, Clone, Default)]
pub struct DeletionOutcome {
    pub worktree_removed: bool,
    pub handle_cleaned: bool,
    pub errors: Vec<String>,
}

impl<'a> DeletionCoordinator<'a> {
    pub fn new(provisioner: &'a dyn WorktreeProvisioner) -> Self {
        Self { provisioner }
    }

    /// Every step failure is recorded and skipped; the caller still performs
    /// the database delete afterwards.
    pub async fn run(
        &self,
        session: &Session,
        handle: Option<&Arc<AgentSession>>,
    ) -> DeletionOutcome {
        let mut outcome = DeletionOutcome::default();

        if let Some(worktree) = &session.worktree {
            match self.provisioner.remove_worktree(worktree, true).await {
                Ok(()) => {
                    info!(
                        "Delete {}: removed worktree {}",
                        session.id,
                        worktree.worktree_path.display()
                    );
                    outcome.worktree_removed = true;
                }
                Err(e) => {
                    let msg = format!("Worktree removal failed: {e}");
                    warn!("Delete {}: {msg}", session.id);
                    outcome.errors.push(msg);
                }
            }
        }

        if let Some(handle) = handle {
            match handle.cleanup().await {
                Ok(()) => outcome.handle_cleaned = true,
                Err(e) => {
                    let msg = format!("Live handle cleanup failed: {e}");
                    warn!("Delete {}: {msg}", session.id);
                    outcome.errors.push(msg);
                }
            }
        }

        if outcome.errors.is_empty() {
            info!("Delete {}: cleanup completed", session.id);
        } else {
            warn!(
                "Delete {}: cleanup completed with {} error(s)",
                session.id,
                outcome.errors.len()
            );
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::agents::DetachedRuntime;
    use crate::domains::git::{GitSupport, WorktreeRequest};
    use crate::domains::sessions::entity::{
        SessionConfig, SessionMetadata, SessionStatus, WorktreeInfo,
    };
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FailingProvisioner {
        remove_called: AtomicBool,
    }

    #[async_trait]
    impl WorktreeProvisioner for FailingProvisioner {
        async fn detect_git_support(&self, _path: &Path) -> GitSupport {
            GitSupport::default()
        }

        async fn create_worktree(&self, _request: WorktreeRequest) -> Result<WorktreeInfo> {
            Err(anyhow!("not under test"))
        }

        async fn remove_worktree(&self, _info: &WorktreeInfo, _force: bool) -> Result<()> {
            self.remove_called.store(true, Ordering::SeqCst);
            Err(anyhow!("worktree is locked"))
        }

        async fn get_current_branch(&self, _path: &Path) -> Result<String> {
            Err(anyhow!("not under test"))
        }

        async fn rename_branch(&self, _info: &WorktreeInfo, _new: &str) -> Result<()> {
            Err(anyhow!("not under test"))
        }
    }

    fn session_with_worktree() -> Session {
        Session {
            id: "s1".to_string(),
            workspace_path: "/tmp/wt".into(),
            status: SessionStatus::Active,
            title: None,
            config: SessionConfig::default(),
            metadata: SessionMetadata::default(),
            worktree: Some(WorktreeInfo {
                worktree_path: "/tmp/wt".into(),
                main_repo_path: "/tmp/repo".into(),
                branch: "session/x-abc12345".to_string(),
            }),
            room_id: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn worktree_failure_is_collected_and_handle_still_cleaned() {
        let provisioner = FailingProvisioner {
            remove_called: AtomicBool::new(false),
        };
        let session = session_with_worktree();
        let handle = Arc::new(AgentSession::new(session.clone(), Arc::new(DetachedRuntime)));

        let coordinator = DeletionCoordinator::new(&provisioner);
        let outcome = coordinator.run(&session, Some(&handle)).await;

        assert!(provisioner.remove_called.load(Ordering::SeqCst));
        assert!(!outcome.worktree_removed);
        assert!(outcome.handle_cleaned);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("Worktree removal failed"));
    }

    #[tokio::test]
    async fn session_without_worktree_skips_removal() {
        let provisioner = FailingProvisioner {
            remove_called: AtomicBool::new(false),
        };
        let mut session = session_with_worktree();
        session.worktree = None;

        let coordinator = DeletionCoordinator::new(&provisioner);
        let outcome = coordinator.run(&session, None).await;

        assert!(!provisioner.remove_called.load(Ordering::SeqCst));
        assert!(outcome.errors.is_empty());
    }
}
