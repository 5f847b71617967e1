use crate::{
    domains::sessions::entity::{MessageRecord, MetadataPatch, Session, SessionPatch, SessionStatus},
    infrastructure::database::{
        Database, MessageMethods, SdkMessagePage, SdkMessageQuery, SessionMethods,
    },
};
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};

/// Database-facing accessor shared by the lifecycle and rewind paths.
#[derive(Clone)]
pub struct SessionStore {
    pub db: Database,
}

impl SessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create_session(&self, session: &Session) -> Result<()> {
        self.db
            .create_session(session)
            .map_err(|e| anyhow!("Failed to create session in database: {e}"))
    }

    pub fn get_session(&self, session_id: &str) -> Result<Session> {
        self.db
            .get_session(session_id)
            .map_err(|e| anyhow!("Failed to get session '{session_id}': {e}"))
    }

    pub fn find_session(&self, session_id: &str) -> Result<Option<Session>> {
        self.db
            .find_session(session_id)
            .map_err(|e| anyhow!("Failed to look up session '{session_id}': {e}"))
    }

    /// Applies a partial patch to the stored record and returns the updated
    /// session. Read-modify-write without a transaction; concurrent writers
    /// are last-write-wins.
    pub fn update_session(&self, session_id: &str, patch: &SessionPatch) -> Result<Session> {
        let mut session = self.get_session(session_id)?;
        session.apply_patch(patch);
        session.updated_at = Utc::now();
        self.db.update_session(&session)?;
        Ok(session)
    }

    pub fn update_session_metadata(
        &self,
        session_id: &str,
        patch: &MetadataPatch,
    ) -> Result<Session> {
        let mut session = self.get_session(session_id)?;
        session.metadata.apply(patch);
        session.updated_at = Utc::now();
        self.db.update_session(&session)?;
        Ok(session)
    }

    /// Persists an already-mutated session snapshot.
    pub fn persist_session(&self, session: &mut Session) -> Result<()> {
        session.updated_at = Utc::now();
        self.db.update_session(session)
    }

    pub fn update_session_status(&self, session_id: &str, status: SessionStatus) -> Result<Session> {
        let patch = SessionPatch {
            status: Some(status),
            ..SessionPatch::default()
        };
        self.update_session(session_id, &patch)
    }

    pub fn delete_session(&self, session_id: &str) -> Result<()> {
        self.db.delete_session(session_id)
    }

    pub fn list_sessions(&self) -> Result<Vec<Session>> {
        self.db
            .list_sessions()
            .map_err(|e| anyhow!("Failed to list sessions: {e}"))
    }

    pub fn insert_message(&self, message: &MessageRecord) -> Result<()> {
        self.db
            .insert_message(message)
            .map_err(|e| anyhow!("Failed to insert message: {e}"))
    }

    pub fn get_user_messages(&self, session_id: &str) -> Result<Vec<MessageRecord>> {
        self.db
            .get_user_messages(session_id)
            .map_err(|e| anyhow!("Failed to get user messages: {e}"))
    }

    pub fn get_user_message_by_uuid(
        &self,
        session_id: &str,
        uuid: &str,
    ) -> Result<Option<MessageRecord>> {
        self.db
            .get_user_message_by_uuid(session_id, uuid)
            .map_err(|e| anyhow!("Failed to get user message '{uuid}': {e}"))
    }

    pub fn count_messages_after(
        &self,
        session_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<u64> {
        self.db
            .count_messages_after(session_id, timestamp)
            .map_err(|e| anyhow!("Failed to count messages: {e}"))
    }

    pub fn delete_messages_at_and_after(
        &self,
        session_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<u64> {
        self.db
            .delete_messages_at_and_after(session_id, timestamp)
            .map_err(|e| anyhow!("Failed to delete messages: {e}"))
    }

    pub fn get_sdk_messages(
        &self,
        session_id: &str,
        query: &SdkMessageQuery,
    ) -> Result<SdkMessagePage> {
        self.db
            .get_sdk_messages(session_id, query)
            .map_err(|e| anyhow!("Failed to get sdk messages: {e}"))
    }
}
