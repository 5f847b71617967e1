use crate::domains::agents::ToolsConfigSource;
use crate::domains::git::{WorktreeProvisioner, WorktreeRequest};
use crate::domains::sessions::cache::SessionCache;
use crate::domains::sessions::entity::{
    CreateSessionParams, Session, SessionConfig, SessionMetadata, SessionPatch, SessionStatus,
    WorktreeChoiceKind, WorktreeChoiceRecord, WorktreeChoiceStatus,
};
use crate::domains::sessions::handle::SessionHandleFactory;
use crate::domains::sessions::lifecycle::DeletionCoordinator;
use crate::domains::sessions::repository::SessionStore;
use crate::domains::sessions::utils::{generate_branch_name, generate_session_id};
use crate::errors::DaemonError;
use crate::events::DaemonEvent;
use crate::infrastructure::events::{Channel, DaemonHub, MessageHub};
use chrono::Utc;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

/// Deployment-level knobs the lifecycle consults on every create.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub workspace_root: PathBuf,
    pub worktrees_enabled: bool,
    pub defaults: SessionConfig,
}

/// Session lifecycle orchestration: creation, the worktree-choice flow,
/// partial updates, archive and delete. Persistence goes through
/// `SessionStore`, git side effects through the injected provisioner, and
/// every state change is announced on the daemon hub.
pub struct SessionLifecycle {
    store: SessionStore,
    cache: Arc<SessionCache>,
    provisioner: Arc<dyn WorktreeProvisioner>,
    handle_factory: Arc<dyn SessionHandleFactory>,
    tools: Arc<dyn ToolsConfigSource>,
    hub: DaemonHub,
    messages: MessageHub,
    settings: LifecycleSettings,
}

impl SessionLifecycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: SessionStore,
        cache: Arc<SessionCache>,
        provisioner: Arc<dyn WorktreeProvisioner>,
        handle_factory: Arc<dyn SessionHandleFactory>,
        tools: Arc<dyn ToolsConfigSource>,
        hub: DaemonHub,
        messages: MessageHub,
        settings: LifecycleSettings,
    ) -> Self {
        log::debug!(
            "Creating SessionLifecycle with workspace root: {}",
            settings.workspace_root.display()
        );
        Self {
            store,
            cache,
            provisioner,
            handle_factory,
            tools,
            hub,
            messages,
            settings,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    /// Create a session. Provisioning never fails creation: an eager worktree
    /// attempt that errors falls back to the base path, and the session keeps
    /// the pending choice status so the client can retry or go direct.
    pub async fn create(&self, params: CreateSessionParams) -> Result<Session, DaemonError> {
        let session_id = generate_session_id();
        let base_path = params
            .workspace_path
            .clone()
            .unwrap_or_else(|| self.settings.workspace_root.clone());

        let mut config = self.settings.defaults.clone();
        if let Some(patch) = &params.config {
            config.apply(patch);
        }
        config.tools = Some(self.tools.tools_config());

        let mut status = SessionStatus::Active;
        let mut workspace_path = base_path.clone();
        let mut worktree = None;
        let mut worktree_choice = None;

        if self.settings.worktrees_enabled {
            let support = self.provisioner.detect_git_support(&base_path).await;
            if support.is_git_repo && !support.is_bare {
                if let Some(base_branch) = params.base_branch.clone() {
                    let seed = params.title.clone().unwrap_or_else(|| session_id.clone());
                    let branch = generate_branch_name(&seed, &session_id);
                    let repo_root = support.git_root.clone().unwrap_or_else(|| base_path.clone());
                    let request = WorktreeRequest {
                        repo_root,
                        session_id: session_id.clone(),
                        branch,
                        base_branch: Some(base_branch),
                    };
                    match self.provisioner.create_worktree(request).await {
                        Ok(info) => {
                            workspace_path = info.worktree_path.clone();
                            worktree_choice = Some(WorktreeChoiceRecord {
                                status: WorktreeChoiceStatus::Completed,
                                choice: WorktreeChoiceKind::Worktree,
                                completed_at: Some(Utc::now()),
                                branch: Some(info.branch.clone()),
                            });
                            worktree = Some(info);
                        }
                        Err(e) => {
                            log::warn!(
                                "Eager worktree provisioning for session {session_id} failed, \
                                 falling back to {}: {e}",
                                base_path.display()
                            );
                        }
                    }
                }
                if worktree.is_none() {
                    status = SessionStatus::PendingWorktreeChoice;
                }
            }
        }

        let now = Utc::now();
        let metadata = SessionMetadata {
            title_generated: params.title.is_some(),
            workspace_initialized: true,
            worktree_choice,
            session_type: params.session_type,
            paired_session_id: params.paired_session_id.clone(),
            parent_session_id: params.parent_session_id.clone(),
            current_task_id: params.current_task_id.clone(),
            ..Default::default()
        };

        let session = Session {
            id: session_id,
            workspace_path,
            status,
            title: params.title.clone(),
            config,
            metadata,
            worktree,
            room_id: params.room_id.clone(),
            created_by: params.created_by.clone(),
            created_at: now,
            updated_at: now,
        };

        self.store
            .create_session(&session)
            .map_err(DaemonError::db)?;

        let handle = self.handle_factory.build(session.clone());
        self.cache.insert(handle);

        self.hub.emit(
            DaemonEvent::SessionCreated,
            &json!({ "sessionId": session.id, "session": session }),
        );

        log::info!(
            "Created session {} ({}) at {}",
            session.id,
            session.status.as_str(),
            session.workspace_path.display()
        );
        Ok(session)
    }

    /// Resolve a pending worktree choice. A failed worktree provisioning
    /// degrades to the direct path rather than erroring, so the session always
    /// leaves the pending state.
    pub async fn complete_worktree_choice(
        &self,
        session_id: &str,
        choice: WorktreeChoiceKind,
    ) -> Result<Session, DaemonError> {
        let mut session = self.require_session(session_id)?;

        if session.status != SessionStatus::PendingWorktreeChoice {
            return Err(DaemonError::InvalidSessionState {
                session_id: session_id.to_string(),
                current_state: session.status.as_str().to_string(),
                expected_state: SessionStatus::PendingWorktreeChoice.as_str().to_string(),
            });
        }

        let mut effective = choice;
        let mut branch = None;

        if choice == WorktreeChoiceKind::Worktree {
            let seed = session.title.clone().unwrap_or_else(|| session.id.clone());
            let branch_name = generate_branch_name(&seed, &session.id);
            let support = self
                .provisioner
                .detect_git_support(&session.workspace_path)
                .await;
            let repo_root = support
                .git_root
                .clone()
                .unwrap_or_else(|| session.workspace_path.clone());
            let request = WorktreeRequest {
                repo_root,
                session_id: session.id.clone(),
                branch: branch_name,
                base_branch: None,
            };
            match self.provisioner.create_worktree(request).await {
                Ok(info) => {
                    branch = Some(info.branch.clone());
                    session.workspace_path = info.worktree_path.clone();
                    session.worktree = Some(info);
                }
                Err(e) => {
                    log::warn!(
                        "Worktree choice for session {session_id} failed, staying in {}: {e}",
                        session.workspace_path.display()
                    );
                    effective = WorktreeChoiceKind::Direct;
                }
            }
        }

        if effective == WorktreeChoiceKind::Direct {
            match self
                .provisioner
                .get_current_branch(&session.workspace_path)
                .await
            {
                Ok(current) => branch = Some(current),
                Err(e) => {
                    log::debug!("Branch detection for session {session_id} failed: {e}");
                }
            }
        }

        session.status = SessionStatus::Active;
        session.metadata.worktree_choice = Some(WorktreeChoiceRecord {
            status: WorktreeChoiceStatus::Completed,
            choice: effective,
            completed_at: Some(Utc::now()),
            branch,
        });

        self.store
            .persist_session(&mut session)
            .map_err(DaemonError::db)?;
        self.sync_cached_handle(&session).await;

        self.hub.emit(
            DaemonEvent::SessionUpdated,
            &json!({ "sessionId": session.id, "session": session }),
        );
        Ok(session)
    }

    /// Apply a partial update to the stored record and the cached handle.
    pub async fn update(
        &self,
        session_id: &str,
        patch: SessionPatch,
    ) -> Result<Session, DaemonError> {
        let session = self
            .store
            .update_session(session_id, &patch)
            .map_err(|e| DaemonError::from_session_lookup(session_id, e))?;

        self.sync_cached_handle(&session).await;

        self.hub.emit(
            DaemonEvent::SessionUpdated,
            &json!({ "sessionId": session_id, "source": "update", "session": patch }),
        );
        Ok(session)
    }

    /// Delete a session. Worktree removal and handle cleanup are best-effort;
    /// only the database delete can fail the operation.
    pub async fn delete(&self, session_id: &str) -> Result<(), DaemonError> {
        let session = self.require_session(session_id)?;

        let handle = self.cache.get(session_id);
        DeletionCoordinator::new(self.provisioner.as_ref())
            .run(&session, handle.as_ref())
            .await;

        self.store
            .delete_session(session_id)
            .map_err(DaemonError::db)?;
        self.cache.remove(session_id);

        let payload = json!({ "sessionId": session_id });
        self.messages
            .event(DaemonEvent::SessionDeleted, &payload, Channel::Global);
        self.hub.emit(DaemonEvent::SessionDeleted, &payload);

        log::info!("Deleted session {session_id}");
        Ok(())
    }

    /// Archive keeps the row and worktree but drops the live handle.
    pub async fn archive(&self, session_id: &str) -> Result<Session, DaemonError> {
        let mut session = self.require_session(session_id)?;

        if let Some(handle) = self.cache.remove(session_id)
            && let Err(e) = handle.cleanup().await
        {
            log::warn!("Archive {session_id}: handle cleanup failed: {e}");
        }

        session.status = SessionStatus::Archived;
        self.store
            .persist_session(&mut session)
            .map_err(DaemonError::db)?;

        self.hub.emit(
            DaemonEvent::SessionUpdated,
            &json!({ "sessionId": session.id, "session": session }),
        );
        Ok(session)
    }

    /// Record a message uuid whose output the user removed from view. Set-add,
    /// safe to repeat.
    pub async fn mark_output_removed(
        &self,
        session_id: &str,
        message_uuid: &str,
    ) -> Result<(), DaemonError> {
        let mut session = self.require_session(session_id)?;

        if session
            .metadata
            .removed_outputs
            .iter()
            .any(|uuid| uuid == message_uuid)
        {
            return Ok(());
        }

        session
            .metadata
            .removed_outputs
            .push(message_uuid.to_string());
        self.store
            .persist_session(&mut session)
            .map_err(DaemonError::db)?;
        self.sync_cached_handle(&session).await;
        Ok(())
    }

    /// Re-derive the session branch from the current title and rename it,
    /// repointing the worktree. Returns the branch the session ends up on, or
    /// `None` for sessions without a worktree.
    pub async fn rename_branch(&self, session_id: &str) -> Result<Option<String>, DaemonError> {
        let mut session = self.require_session(session_id)?;

        let Some(worktree) = session.worktree.clone() else {
            return Ok(None);
        };

        let seed = session.title.clone().unwrap_or_else(|| session.id.clone());
        let target = generate_branch_name(&seed, &session.id);
        if target == worktree.branch {
            return Ok(Some(target));
        }

        self.provisioner
            .rename_branch(&worktree, &target)
            .await
            .map_err(|e| DaemonError::git("rename branch", e))?;

        if let Some(info) = session.worktree.as_mut() {
            info.branch = target.clone();
        }
        if let Some(record) = session.metadata.worktree_choice.as_mut() {
            record.branch = Some(target.clone());
        }
        self.store
            .persist_session(&mut session)
            .map_err(DaemonError::db)?;
        self.sync_cached_handle(&session).await;

        self.hub.emit(
            DaemonEvent::SessionUpdated,
            &json!({ "sessionId": session.id, "session": session }),
        );
        Ok(Some(target))
    }

    pub fn get(&self, session_id: &str) -> Result<Session, DaemonError> {
        self.store
            .get_session(session_id)
            .map_err(|e| DaemonError::from_session_lookup(session_id, e))
    }

    pub fn list(&self) -> Result<Vec<Session>, DaemonError> {
        self.store.list_sessions().map_err(DaemonError::db)
    }

    /// Rebuild live handles for non-archived sessions, used at daemon startup.
    pub fn restore_cache(&self) -> Result<usize, DaemonError> {
        let sessions = self.store.list_sessions().map_err(DaemonError::db)?;
        let mut restored = 0;
        for session in sessions {
            if session.status == SessionStatus::Archived {
                continue;
            }
            if !self.cache.contains(&session.id) {
                self.cache.insert(self.handle_factory.build(session));
                restored += 1;
            }
        }
        if restored > 0 {
            log::info!("Restored {restored} session handle(s) into the cache");
        }
        Ok(restored)
    }

    fn require_session(&self, session_id: &str) -> Result<Session, DaemonError> {
        self.store
            .find_session(session_id)
            .map_err(DaemonError::db)?
            .ok_or_else(|| DaemonError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    async fn sync_cached_handle(&self, session: &Session) {
        if let Some(handle) = self.cache.get(&session.id) {
            handle.replace_data(session.clone()).await;
        }
    }
}
