use crate::domains::sessions::handle::AgentSession;
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory map of live session handles keyed by session id.
///
/// The cache answers "is this session currently loaded" and nothing more.
/// Persistence stays in the database; lifecycle code keeps the two in step
/// so a handle never outlives its row. Mutations go through
/// `SessionLifecycle` so every insert or removal has a matching event.
#[derive(Default)]
pub struct SessionCache {
    sessions: DashMap<String, Arc<AgentSession>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: Arc<AgentSession>) {
        self.sessions.insert(handle.id.clone(), handle);
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<AgentSession>> {
        self.sessions.get(session_id).map(|entry| entry.clone())
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<AgentSession>> {
        self.sessions.remove(session_id).map(|(_, handle)| handle)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::agents::DetachedRuntime;
    use crate::domains::sessions::entity::{Session, SessionConfig, SessionMetadata, SessionStatus};
    use chrono::Utc;

    fn handle(id: &str) -> Arc<AgentSession> {
        let session = Session {
            id: id.to_string(),
            workspace_path: "/tmp/ws".into(),
            status: SessionStatus::Active,
            title: None,
            config: SessionConfig::default(),
            metadata: SessionMetadata::default(),
            worktree: None,
            room_id: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        Arc::new(AgentSession::new(session, Arc::new(DetachedRuntime)))
    }

    #[test]
    fn insert_get_remove() {
        let cache = SessionCache::new();
        cache.insert(handle("a"));
        assert!(cache.contains("a"));
        assert!(cache.get("a").is_some());
        assert_eq!(cache.len(), 1);

        let removed = cache.remove("a").unwrap();
        assert_eq!(removed.id, "a");
        assert!(cache.get("a").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let cache = SessionCache::new();
        assert!(cache.remove("missing").is_none());
    }

    #[test]
    fn insert_replaces_existing_handle() {
        let cache = SessionCache::new();
        cache.insert(handle("a"));
        cache.insert(handle("a"));
        assert_eq!(cache.len(), 1);
    }
}
