use super::connection::Database;
use super::timestamps::{utc_from_epoch_millis_lossy, utc_from_epoch_millis_lossy_opt};
use crate::domains::rooms::entity::{Task, TaskPriority, TaskStatus};
use anyhow::{Result, anyhow};
use rusqlite::{Row, params};

fn text_column_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
    let status_str: String = row.get(4)?;
    let status = TaskStatus::parse(&status_str)
        .ok_or_else(|| text_column_error(4, format!("unknown task status: {status_str}")))?;

    let priority_str: String = row.get(5)?;
    let priority = TaskPriority::parse(&priority_str)
        .ok_or_else(|| text_column_error(5, format!("unknown task priority: {priority_str}")))?;

    let result_json: Option<String> = row.get(8)?;
    let result = match result_json {
        Some(json) => Some(serde_json::from_str(&json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?),
        None => None,
    };

    let depends_on_json: String = row.get(10)?;
    let depends_on = serde_json::from_str(&depends_on_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at: i64 = row.get(12)?;
    let started_at: Option<i64> = row.get(13)?;
    let completed_at: Option<i64> = row.get(14)?;

    Ok(Task {
        id: row.get(0)?,
        room_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status,
        priority,
        progress: row.get::<_, i64>(6)?.clamp(0, 100) as u8,
        current_step: row.get(7)?,
        result,
        error: row.get(9)?,
        depends_on,
        session_id: row.get(11)?,
        created_at: utc_from_epoch_millis_lossy(created_at),
        started_at: utc_from_epoch_millis_lossy_opt(started_at),
        completed_at: utc_from_epoch_millis_lossy_opt(completed_at),
    })
}

const TASK_COLUMNS: &str = "id, room_id, title, description, status, priority, progress,
        current_step, result, error, depends_on, session_id, created_at, started_at, completed_at";

/// Every query is filtered by room id in SQL, so a manager bound to one room
/// cannot observe another room's tasks no matter how it is called.
pub trait TaskMethods {
    fn create_task(&self, task: &Task) -> Result<()>;
    fn get_task(&self, room_id: &str, task_id: &str) -> Result<Option<Task>>;
    fn update_task(&self, task: &Task) -> Result<()>;
    fn delete_task(&self, room_id: &str, task_id: &str) -> Result<bool>;
    fn list_tasks(&self, room_id: &str) -> Result<Vec<Task>>;
    fn count_tasks_with_status(&self, room_id: &str, status: TaskStatus) -> Result<u64>;
}

impl TaskMethods for Database {
    fn create_task(&self, task: &Task) -> Result<()> {
        let conn = self.get_conn()?;
        let result = match &task.result {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };
        let depends_on = serde_json::to_string(&task.depends_on)?;

        conn.execute(
            "INSERT INTO tasks (
                id, room_id, title, description, status, priority, progress,
                current_step, result, error, depends_on, session_id,
                created_at, started_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                task.id,
                task.room_id,
                task.title,
                task.description,
                task.status.as_str(),
                task.priority.as_str(),
                i64::from(task.progress),
                task.current_step,
                result,
                task.error,
                depends_on,
                task.session_id,
                task.created_at.timestamp_millis(),
                task.started_at.map(|t| t.timestamp_millis()),
                task.completed_at.map(|t| t.timestamp_millis()),
            ],
        )?;
        Ok(())
    }

    fn get_task(&self, room_id: &str, task_id: &str) -> Result<Option<Task>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE room_id = ?1 AND id = ?2"),
            params![room_id, task_id],
            row_to_task,
        );

        match result {
            Ok(task) => Ok(Some(task)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn update_task(&self, task: &Task) -> Result<()> {
        let conn = self.get_conn()?;
        let result = match &task.result {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };
        let depends_on = serde_json::to_string(&task.depends_on)?;

        let rows = conn.execute(
            "UPDATE tasks SET
                title = ?3, description = ?4, status = ?5, priority = ?6,
                progress = ?7, current_step = ?8, result = ?9, error = ?10,
                depends_on = ?11, session_id = ?12, started_at = ?13,
                completed_at = ?14
            WHERE room_id = ?1 AND id = ?2",
            params![
                task.room_id,
                task.id,
                task.title,
                task.description,
                task.status.as_str(),
                task.priority.as_str(),
                i64::from(task.progress),
                task.current_step,
                result,
                task.error,
                depends_on,
                task.session_id,
                task.started_at.map(|t| t.timestamp_millis()),
                task.completed_at.map(|t| t.timestamp_millis()),
            ],
        )?;

        if rows == 0 {
            return Err(anyhow!("Task not found: {}", task.id));
        }
        Ok(())
    }

    fn delete_task(&self, room_id: &str, task_id: &str) -> Result<bool> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "DELETE FROM tasks WHERE room_id = ?1 AND id = ?2",
            params![room_id, task_id],
        )?;
        Ok(rows > 0)
    }

    fn list_tasks(&self, room_id: &str) -> Result<Vec<Task>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE room_id = ?1
                ORDER BY created_at ASC, rowid ASC"
        ))?;
        let tasks = stmt
            .query_map(params![room_id], row_to_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    fn count_tasks_with_status(&self, room_id: &str, status: TaskStatus) -> Result<u64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE room_id = ?1 AND status = ?2",
            params![room_id, status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    fn test_db() -> (TempDir, Database) {
        let tmp = TempDir::new().unwrap();
        let db = Database::new(Some(tmp.path().join("test.db"))).unwrap();
        (tmp, db)
    }

    fn sample_task(room_id: &str, id: &str) -> Task {
        Task {
            id: id.to_string(),
            room_id: room_id.to_string(),
            title: format!("Task {id}"),
            description: None,
            status: TaskStatus::Pending,
            priority: TaskPriority::Normal,
            progress: 0,
            current_step: None,
            result: None,
            error: None,
            depends_on: Vec::new(),
            session_id: None,
            created_at: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn create_and_get_round_trip() {
        let (_tmp, db) = test_db();
        let mut task = sample_task("r1", "t1");
        task.depends_on = vec!["t0".to_string()];
        task.result = Some(json!({"ok": true}));
        db.create_task(&task).unwrap();

        let loaded = db.get_task("r1", "t1").unwrap().unwrap();
        assert_eq!(loaded, task);
    }

    #[test]
    fn queries_are_room_scoped() {
        let (_tmp, db) = test_db();
        db.create_task(&sample_task("r1", "t1")).unwrap();
        db.create_task(&sample_task("r2", "t2")).unwrap();

        assert!(db.get_task("r1", "t2").unwrap().is_none());
        assert_eq!(db.list_tasks("r1").unwrap().len(), 1);
        assert!(!db.delete_task("r1", "t2").unwrap());
        assert!(db.get_task("r2", "t2").unwrap().is_some());
    }

    #[test]
    fn update_rejects_unknown_task() {
        let (_tmp, db) = test_db();
        let task = sample_task("r1", "ghost");
        let err = db.update_task(&task).unwrap_err();
        assert!(err.to_string().contains("Task not found: ghost"));
    }

    #[test]
    fn status_counts() {
        let (_tmp, db) = test_db();
        let mut a = sample_task("r1", "a");
        a.status = TaskStatus::Pending;
        let mut b = sample_task("r1", "b");
        b.status = TaskStatus::Completed;
        db.create_task(&a).unwrap();
        db.create_task(&b).unwrap();

        assert_eq!(db.count_tasks_with_status("r1", TaskStatus::Pending).unwrap(), 1);
        assert_eq!(db.count_tasks_with_status("r2", TaskStatus::Pending).unwrap(), 0);
    }
}
