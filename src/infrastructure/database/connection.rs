use anyhow::{Context, Result};
use r2d2::{Pool, PooledConnection};
use rusqlite::Connection;
use std::path::PathBuf;
use std::time::Duration;

use super::db_schema::initialize_schema;

const POOL_MAX_SIZE: u32 = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// r2d2 adapter for rusqlite. Every pooled connection gets WAL mode and
/// foreign keys so behavior does not depend on which connection serves a
/// request.
#[derive(Debug)]
pub struct ConnectionManager {
    db_path: PathBuf,
}

impl r2d2::ManageConnection for ConnectionManager {
    type Connection = Connection;
    type Error = rusqlite::Error;

    fn connect(&self) -> Result<Connection, rusqlite::Error> {
        let conn = Connection::open(&self.db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    fn is_valid(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.query_row("SELECT 1", [], |_row| Ok(()))
    }

    fn has_broken(&self, _conn: &mut Connection) -> bool {
        false
    }
}

#[derive(Clone)]
pub struct Database {
    pool: Pool<ConnectionManager>,
    pub db_path: PathBuf,
}

impl Database {
    /// Opens (or creates) the daemon database. `None` resolves to the
    /// platform-local data directory.
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let db_path = match db_path {
            Some(path) => path,
            None => default_db_path()?,
        };

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let manager = ConnectionManager {
            db_path: db_path.clone(),
        };
        let pool = Pool::builder()
            .max_size(POOL_MAX_SIZE)
            .build(manager)
            .context("Failed to build sqlite connection pool")?;

        let db = Self { pool, db_path };

        initialize_schema(&db)?;
        log::info!("Database ready at {}", db.db_path.display());

        Ok(db)
    }

    pub fn get_conn(&self) -> Result<PooledConnection<ConnectionManager>> {
        self.pool
            .get()
            .context("Failed to acquire database connection")
    }
}

fn default_db_path() -> Result<PathBuf> {
    let base = dirs::data_local_dir().context("Could not determine local data directory")?;
    Ok(base.join("leitwerk").join("leitwerk.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_database_with_schema() {
        let tmp = TempDir::new().unwrap();
        let db = Database::new(Some(tmp.path().join("test.db"))).unwrap();

        let conn = db.get_conn().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('sessions', 'messages', 'tasks', 'room_agent_states')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 4);
    }

    #[test]
    fn creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("a").join("b").join("test.db");
        let db = Database::new(Some(nested.clone())).unwrap();
        assert_eq!(db.db_path, nested);
        assert!(nested.exists());
    }

    #[test]
    fn pool_hands_out_multiple_connections() {
        let tmp = TempDir::new().unwrap();
        let db = Database::new(Some(tmp.path().join("test.db"))).unwrap();

        let a = db.get_conn().unwrap();
        let b = db.get_conn().unwrap();
        a.execute("CREATE TABLE IF NOT EXISTS probe (x INTEGER)", [])
            .unwrap();
        b.execute("INSERT INTO probe (x) VALUES (1)", []).unwrap();
    }
}
