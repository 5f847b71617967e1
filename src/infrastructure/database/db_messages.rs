use super::connection::Database;
use super::timestamps::utc_from_epoch_millis_lossy;
use crate::domains::sessions::entity::MessageRecord;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Row, params};

fn row_to_message(row: &Row) -> rusqlite::Result<MessageRecord> {
    let content_json: String = row.get(3)?;
    let content = serde_json::from_str(&content_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let created_at: i64 = row.get(4)?;

    Ok(MessageRecord {
        uuid: row.get(0)?,
        session_id: row.get(1)?,
        message_type: row.get(2)?,
        content,
        timestamp: utc_from_epoch_millis_lossy(created_at),
    })
}

#[derive(Debug, Clone, Default)]
pub struct SdkMessageQuery {
    pub limit: Option<u32>,
    /// Cursor: only messages strictly older than this are returned.
    pub before: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct SdkMessagePage {
    pub messages: Vec<MessageRecord>,
    pub has_more: bool,
}

pub trait MessageMethods {
    fn insert_message(&self, message: &MessageRecord) -> Result<()>;
    fn get_user_messages(&self, session_id: &str) -> Result<Vec<MessageRecord>>;
    fn get_user_message_by_uuid(
        &self,
        session_id: &str,
        uuid: &str,
    ) -> Result<Option<MessageRecord>>;
    fn count_messages_after(&self, session_id: &str, timestamp: DateTime<Utc>) -> Result<u64>;
    fn delete_messages_at_and_after(
        &self,
        session_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<u64>;
    fn get_sdk_messages(&self, session_id: &str, query: &SdkMessageQuery)
    -> Result<SdkMessagePage>;
}

impl MessageMethods for Database {
    fn insert_message(&self, message: &MessageRecord) -> Result<()> {
        let conn = self.get_conn()?;
        let content = serde_json::to_string(&message.content)?;
        conn.execute(
            "INSERT INTO messages (uuid, session_id, message_type, content, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.uuid,
                message.session_id,
                message.message_type,
                content,
                message.timestamp.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn get_user_messages(&self, session_id: &str) -> Result<Vec<MessageRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT uuid, session_id, message_type, content, created_at
                FROM messages
                WHERE session_id = ?1 AND message_type = 'user'
                ORDER BY created_at ASC, rowid ASC",
        )?;
        let messages = stmt
            .query_map(params![session_id], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    fn get_user_message_by_uuid(
        &self,
        session_id: &str,
        uuid: &str,
    ) -> Result<Option<MessageRecord>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            "SELECT uuid, session_id, message_type, content, created_at
                FROM messages
                WHERE session_id = ?1 AND uuid = ?2 AND message_type = 'user'",
            params![session_id, uuid],
            row_to_message,
        );

        match result {
            Ok(message) => Ok(Some(message)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn count_messages_after(&self, session_id: &str, timestamp: DateTime<Utc>) -> Result<u64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE session_id = ?1 AND created_at > ?2",
            params![session_id, timestamp.timestamp_millis()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn delete_messages_at_and_after(
        &self,
        session_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<u64> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "DELETE FROM messages WHERE session_id = ?1 AND created_at >= ?2",
            params![session_id, timestamp.timestamp_millis()],
        )?;
        Ok(rows as u64)
    }

    fn get_sdk_messages(
        &self,
        session_id: &str,
        query: &SdkMessageQuery,
    ) -> Result<SdkMessagePage> {
        let conn = self.get_conn()?;

        let before = query
            .before
            .map(|t| t.timestamp_millis())
            .unwrap_or(i64::MAX);
        // One extra row tells us whether the page is truncated.
        let fetch = query.limit.map(|l| i64::from(l) + 1).unwrap_or(-1);

        let mut stmt = conn.prepare(
            "SELECT uuid, session_id, message_type, content, created_at
                FROM messages
                WHERE session_id = ?1 AND created_at < ?2
                ORDER BY created_at ASC, rowid ASC
                LIMIT ?3",
        )?;
        let mut messages = stmt
            .query_map(params![session_id, before, fetch], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let has_more = match query.limit {
            Some(limit) => {
                let truncated = messages.len() > limit as usize;
                messages.truncate(limit as usize);
                truncated
            }
            None => false,
        };

        Ok(SdkMessagePage { messages, has_more })
    }
}
