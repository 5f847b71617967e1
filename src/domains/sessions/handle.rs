use crate::domains::agents::{DetachedRuntime, SdkQuery, SessionRuntime};
use crate::domains::sessions::entity::{MetadataPatch, Session, SessionPatch};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Live in-memory handle for a session.
///
/// Holds the latest session snapshot, the optional SDK query attached to it
/// and the runtime that owns the agent process. The persisted record stays
/// authoritative; lifecycle code writes the database first and then pushes
/// the same change into the handle.
pub struct AgentSession {
    pub id: String,
    data: RwLock<Session>,
    query: RwLock<Option<Arc<dyn SdkQuery>>>,
    runtime: Arc<dyn SessionRuntime>,
}

impl AgentSession {
    pub fn new(session: Session, runtime: Arc<dyn SessionRuntime>) -> Self {
        Self {
            id: session.id.clone(),
            data: RwLock::new(session),
            query: RwLock::new(None),
            runtime,
        }
    }

    pub async fn get_session_data(&self) -> Session {
        self.data.read().await.clone()
    }

    pub async fn replace_data(&self, session: Session) {
        *self.data.write().await = session;
    }

    pub async fn apply_patch(&self, patch: &SessionPatch) {
        self.data.write().await.apply_patch(patch);
    }

    pub async fn update_metadata(&self, patch: &MetadataPatch) {
        self.data.write().await.metadata.apply(patch);
    }

    pub async fn attach_query(&self, query: Arc<dyn SdkQuery>) {
        *self.query.write().await = Some(query);
    }

    pub async fn detach_query(&self) {
        *self.query.write().await = None;
    }

    pub async fn query(&self) -> Option<Arc<dyn SdkQuery>> {
        self.query.read().await.clone()
    }

    /// Drops the attached query and tears down the runtime.
    pub async fn cleanup(&self) -> Result<()> {
        self.detach_query().await;
        self.runtime.cleanup().await
    }

    /// Resynchronizes the SDK transcript after stored messages changed.
    pub async fn restart(&self) -> Result<()> {
        self.runtime.restart().await
    }
}

/// Builds live handles for newly created or reloaded sessions.
pub trait SessionHandleFactory: Send + Sync {
    fn build(&self, session: Session) -> Arc<AgentSession>;
}

/// Factory for handles that start without a transport attached.
pub struct DetachedHandleFactory;

impl SessionHandleFactory for DetachedHandleFactory {
    fn build(&self, session: Session) -> Arc<AgentSession> {
        Arc::new(AgentSession::new(session, Arc::new(DetachedRuntime)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::agents::RewindFilesOutcome;
    use crate::domains::sessions::entity::{SessionConfig, SessionMetadata, SessionStatus};
    use async_trait::async_trait;
    use chrono::Utc;

    fn sample_session(id: &str) -> Session {
        Session {
            id: id.to_string(),
            workspace_path: "/tmp/ws".into(),
            status: SessionStatus::Active,
            title: Some("sample".to_string()),
            config: SessionConfig::default(),
            metadata: SessionMetadata::default(),
            worktree: None,
            room_id: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    struct StubQuery;

    #[async_trait]
    impl SdkQuery for StubQuery {
        fn transport_ready(&self) -> bool {
            true
        }

        async fn rewind_files(&self, _message_uuid: &str, _dry_run: bool) -> RewindFilesOutcome {
            RewindFilesOutcome::default()
        }
    }

    #[tokio::test]
    async fn patch_updates_live_snapshot() {
        let handle = AgentSession::new(sample_session("s1"), Arc::new(DetachedRuntime));
        let patch = SessionPatch {
            title: Some("renamed".to_string()),
            ..SessionPatch::default()
        };
        handle.apply_patch(&patch).await;
        assert_eq!(
            handle.get_session_data().await.title.as_deref(),
            Some("renamed")
        );
    }

    #[tokio::test]
    async fn cleanup_detaches_query() {
        let handle = AgentSession::new(sample_session("s1"), Arc::new(DetachedRuntime));
        handle.attach_query(Arc::new(StubQuery)).await;
        assert!(handle.query().await.is_some());

        handle.cleanup().await.unwrap();
        assert!(handle.query().await.is_none());
    }

    #[test]
    fn factory_builds_handle_with_session_id() {
        let factory = DetachedHandleFactory;
        let handle = factory.build(sample_session("abc"));
        assert_eq!(handle.id, "abc");
    }
}
