use super::connection::Database;

pub fn initialize_schema(db: &Database) -> anyhow::Result<()> {
    let conn = db.get_conn()?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            workspace_path TEXT NOT NULL,
            status TEXT NOT NULL,  -- 'active', 'pending_worktree_choice', or 'archived'
            title TEXT,
            config TEXT NOT NULL DEFAULT '{}',
            metadata TEXT NOT NULL DEFAULT '{}',
            worktree_path TEXT,
            main_repo_path TEXT,
            branch TEXT,
            room_id TEXT,
            created_by TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_room ON sessions(room_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS messages (
            uuid TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            message_type TEXT NOT NULL,  -- 'user', 'assistant', 'system', ...
            content TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,  -- epoch milliseconds
            FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_messages_session_time
            ON messages(session_id, created_at)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_messages_session_type
            ON messages(session_id, message_type)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            room_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            priority TEXT NOT NULL DEFAULT 'normal',
            progress INTEGER NOT NULL DEFAULT 0,
            current_step TEXT,
            result TEXT,
            error TEXT,
            depends_on TEXT NOT NULL DEFAULT '[]',
            session_id TEXT,
            created_at INTEGER NOT NULL,  -- epoch milliseconds
            started_at INTEGER,
            completed_at INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tasks_room_status ON tasks(room_id, status)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS room_agent_states (
            room_id TEXT PRIMARY KEY,
            lifecycle_state TEXT NOT NULL DEFAULT 'idle',
            current_goal_id TEXT,
            current_task_id TEXT,
            active_session_pair_ids TEXT NOT NULL DEFAULT '[]',
            error_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            pending_actions TEXT NOT NULL DEFAULT '[]',
            last_activity_at INTEGER,
            updated_at INTEGER NOT NULL
        )",
        [],
    )?;

    apply_sessions_migrations(&conn)?;
    apply_tasks_migrations(&conn)?;

    Ok(())
}

/// Databases created by earlier releases predate some columns. ALTER TABLE
/// ADD COLUMN fails when the column already exists, so each statement is fired
/// blindly and the error ignored.
fn apply_sessions_migrations(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    let _ = conn.execute("ALTER TABLE sessions ADD COLUMN room_id TEXT", []);
    let _ = conn.execute("ALTER TABLE sessions ADD COLUMN created_by TEXT", []);
    let _ = conn.execute("ALTER TABLE sessions ADD COLUMN main_repo_path TEXT", []);
    Ok(())
}

fn apply_tasks_migrations(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    let _ = conn.execute("ALTER TABLE tasks ADD COLUMN current_step TEXT", []);
    let _ = conn.execute("ALTER TABLE tasks ADD COLUMN session_id TEXT", []);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn schema_initialization_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let db = Database::new(Some(tmp.path().join("test.db"))).unwrap();

        // Database::new already ran it once
        initialize_schema(&db).unwrap();
        initialize_schema(&db).unwrap();

        let conn = db.get_conn().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'sessions'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn migrations_backfill_missing_columns() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("old.db");

        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute(
                "CREATE TABLE sessions (
                    id TEXT PRIMARY KEY,
                    workspace_path TEXT NOT NULL,
                    status TEXT NOT NULL,
                    title TEXT,
                    config TEXT NOT NULL DEFAULT '{}',
                    metadata TEXT NOT NULL DEFAULT '{}',
                    worktree_path TEXT,
                    branch TEXT,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                )",
                [],
            )
            .unwrap();
        }

        let db = Database::new(Some(path)).unwrap();
        let conn = db.get_conn().unwrap();
        conn.execute(
            "INSERT INTO sessions (id, workspace_path, status, created_at, updated_at, room_id)
                VALUES ('s1', '/tmp/w', 'active', 0, 0, 'r1')",
            [],
        )
        .unwrap();

        let room: Option<String> = conn
            .query_row("SELECT room_id FROM sessions WHERE id = 's1'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(room.as_deref(), Some("r1"));
    }
}
