use super::connection::Database;
use super::timestamps::utc_from_epoch_seconds_lossy;
use crate::domains::sessions::entity::{Session, SessionStatus, WorktreeInfo};
use anyhow::{Result, anyhow};
use rusqlite::{Row, params};
use std::path::PathBuf;

fn json_column_error(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
    let status_str: String = row.get(2)?;
    let status = SessionStatus::parse(&status_str).ok_or_else(|| {
        json_column_error(
            2,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown session status: {status_str}"),
            ),
        )
    })?;

    let config_json: String = row.get(4)?;
    let config = serde_json::from_str(&config_json).map_err(|e| json_column_error(4, e))?;

    let metadata_json: String = row.get(5)?;
    let metadata = serde_json::from_str(&metadata_json).map_err(|e| json_column_error(5, e))?;

    let worktree_path: Option<String> = row.get(6)?;
    let main_repo_path: Option<String> = row.get(7)?;
    let branch: Option<String> = row.get(8)?;
    let worktree = match (worktree_path, main_repo_path, branch) {
        (Some(worktree_path), Some(main_repo_path), Some(branch)) => Some(WorktreeInfo {
            worktree_path: PathBuf::from(worktree_path),
            main_repo_path: PathBuf::from(main_repo_path),
            branch,
        }),
        _ => None,
    };

    let created_at: i64 = row.get(11)?;
    let updated_at: i64 = row.get(12)?;

    Ok(Session {
        id: row.get(0)?,
        workspace_path: PathBuf::from(row.get::<_, String>(1)?),
        status,
        title: row.get(3)?,
        config,
        metadata,
        worktree,
        room_id: row.get(9)?,
        created_by: row.get(10)?,
        created_at: utc_from_epoch_seconds_lossy(created_at),
        updated_at: utc_from_epoch_seconds_lossy(updated_at),
    })
}

const SESSION_COLUMNS: &str = "id, workspace_path, status, title, config, metadata,
        worktree_path, main_repo_path, branch, room_id, created_by, created_at, updated_at";

pub trait SessionMethods {
    fn create_session(&self, session: &Session) -> Result<()>;
    fn get_session(&self, id: &str) -> Result<Session>;
    fn find_session(&self, id: &str) -> Result<Option<Session>>;
    fn update_session(&self, session: &Session) -> Result<()>;
    fn delete_session(&self, id: &str) -> Result<()>;
    fn list_sessions(&self) -> Result<Vec<Session>>;
}

impl SessionMethods for Database {
    fn create_session(&self, session: &Session) -> Result<()> {
        let conn = self.get_conn()?;

        let config = serde_json::to_string(&session.config)?;
        let metadata = serde_json::to_string(&session.metadata)?;

        conn.execute(
            "INSERT INTO sessions (
                id, workspace_path, status, title, config, metadata,
                worktree_path, main_repo_path, branch, room_id, created_by,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                session.id,
                session.workspace_path.to_string_lossy(),
                session.status.as_str(),
                session.title,
                config,
                metadata,
                session
                    .worktree
                    .as_ref()
                    .map(|w| w.worktree_path.to_string_lossy().to_string()),
                session
                    .worktree
                    .as_ref()
                    .map(|w| w.main_repo_path.to_string_lossy().to_string()),
                session.worktree.as_ref().map(|w| w.branch.clone()),
                session.room_id,
                session.created_by,
                session.created_at.timestamp(),
                session.updated_at.timestamp(),
            ],
        )?;

        Ok(())
    }

    fn get_session(&self, id: &str) -> Result<Session> {
        let conn = self.get_conn()?;
        let session = conn.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
            params![id],
            row_to_session,
        )?;
        Ok(session)
    }

    fn find_session(&self, id: &str) -> Result<Option<Session>> {
        match self.get_session(id) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                if let Some(rusqlite::Error::QueryReturnedNoRows) =
                    e.downcast_ref::<rusqlite::Error>()
                {
                    Ok(None)
                } else {
                    Err(e)
                }
            }
        }
    }

    fn update_session(&self, session: &Session) -> Result<()> {
        let conn = self.get_conn()?;

        let config = serde_json::to_string(&session.config)?;
        let metadata = serde_json::to_string(&session.metadata)?;

        let rows = conn.execute(
            "UPDATE sessions SET
                workspace_path = ?2, status = ?3, title = ?4, config = ?5,
                metadata = ?6, worktree_path = ?7, main_repo_path = ?8,
                branch = ?9, room_id = ?10, created_by = ?11, updated_at = ?12
            WHERE id = ?1",
            params![
                session.id,
                session.workspace_path.to_string_lossy(),
                session.status.as_str(),
                session.title,
                config,
                metadata,
                session
                    .worktree
                    .as_ref()
                    .map(|w| w.worktree_path.to_string_lossy().to_string()),
                session
                    .worktree
                    .as_ref()
                    .map(|w| w.main_repo_path.to_string_lossy().to_string()),
                session.worktree.as_ref().map(|w| w.branch.clone()),
                session.room_id,
                session.created_by,
                session.updated_at.timestamp(),
            ],
        )?;

        if rows == 0 {
            return Err(anyhow!("Session not found: {}", session.id));
        }
        Ok(())
    }

    fn delete_session(&self, id: &str) -> Result<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(anyhow!("Session not found: {id}"));
        }
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<Session>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY created_at ASC, rowid ASC"
        ))?;
        let sessions = stmt
            .query_map([], row_to_session)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::sessions::entity::{SessionConfig, SessionMetadata};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn test_db() -> (TempDir, Database) {
        let tmp = TempDir::new().unwrap();
        let db = Database::new(Some(tmp.path().join("test.db"))).unwrap();
        (tmp, db)
    }

    fn sample_session(id: &str) -> Session {
        Session {
            id: id.to_string(),
            workspace_path: PathBuf::from("/workspaces/demo"),
            status: SessionStatus::Active,
            title: Some("Demo session".to_string()),
            config: SessionConfig {
                model: "sonnet".to_string(),
                max_tokens: 8192,
                temperature: 0.7,
                ..Default::default()
            },
            metadata: SessionMetadata::default(),
            worktree: None,
            room_id: Some("room-1".to_string()),
            created_by: Some("tester".to_string()),
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            updated_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn create_and_get_round_trip() {
        let (_tmp, db) = test_db();
        let mut session = sample_session("s1");
        session.worktree = Some(WorktreeInfo {
            worktree_path: PathBuf::from("/repo/.leitwerk/worktrees/demo"),
            main_repo_path: PathBuf::from("/repo"),
            branch: "session/demo-s1".to_string(),
        });
        session.metadata.removed_outputs = vec!["uuid-1".to_string()];

        db.create_session(&session).unwrap();
        let loaded = db.get_session("s1").unwrap();

        assert_eq!(loaded, session);
    }

    #[test]
    fn get_missing_session_reports_no_rows() {
        let (_tmp, db) = test_db();
        let err = db.get_session("missing").unwrap_err();
        assert!(err.to_string().to_lowercase().contains("no rows"));
        assert_eq!(db.find_session("missing").unwrap(), None);
    }

    #[test]
    fn update_rewrites_mutable_columns() {
        let (_tmp, db) = test_db();
        let mut session = sample_session("s1");
        db.create_session(&session).unwrap();

        session.status = SessionStatus::Archived;
        session.title = Some("Renamed".to_string());
        session.metadata.message_count = 5;
        db.update_session(&session).unwrap();

        let loaded = db.get_session("s1").unwrap();
        assert_eq!(loaded.status, SessionStatus::Archived);
        assert_eq!(loaded.title.as_deref(), Some("Renamed"));
        assert_eq!(loaded.metadata.message_count, 5);
    }

    #[test]
    fn update_missing_session_fails() {
        let (_tmp, db) = test_db();
        let session = sample_session("ghost");
        let err = db.update_session(&session).unwrap_err();
        assert!(err.to_string().contains("Session not found"));
    }

    #[test]
    fn delete_removes_the_row() {
        let (_tmp, db) = test_db();
        db.create_session(&sample_session("s1")).unwrap();
        db.delete_session("s1").unwrap();
        assert_eq!(db.find_session("s1").unwrap(), None);
        assert!(db.delete_session("s1").is_err());
    }

    #[test]
    fn list_orders_by_creation() {
        let (_tmp, db) = test_db();
        let mut a = sample_session("a");
        a.created_at = Utc.timestamp_opt(1_700_000_100, 0).unwrap();
        let mut b = sample_session("b");
        b.created_at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        db.create_session(&a).unwrap();
        db.create_session(&b).unwrap();

        let ids: Vec<String> = db.list_sessions().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["b".to_string(), "a".to_string()]);
    }
}
