//! SQLite backend.
//!
//! Stores every document as one row of a key-value table. Each write is a
//! single upsert statement, which SQLite commits atomically.

use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;

use super::StateStore;
use crate::error::{ModwatchError, Result};

/// Key-value JSON store on top of a SQLite database file.
pub struct SqliteStore {
    db_path: String,
}

impl SqliteStore {
    /// Open the database at `db_path`, creating the file and schema if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or initialized.
    pub async fn open(db_path: &str) -> Result<Self> {
        let path = db_path.to_string();
        tokio::task::spawn_blocking(move || init_db_sync(&path))
            .await
            .map_err(|e| ModwatchError::Storage(format!("Task join error: {}", e)))??;
        Ok(Self {
            db_path: db_path.to_string(),
        })
    }

    fn connect(db_path: &str) -> Result<Connection> {
        let conn = Connection::open(db_path)
            .map_err(|e| ModwatchError::Storage(format!("Failed to connect to database: {}", e)))?;
        // Another task may hold the write lock briefly
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }
}

fn init_db_sync(path: &str) -> Result<()> {
    // Create parent directory if it doesn't exist
    if let Some(parent) = Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = SqliteStore::connect(path)?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS state (
            key TEXT NOT NULL PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        [],
    )?;
    Ok(())
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn read_raw(&self, key: &str) -> Result<Option<String>> {
        let db_path = self.db_path.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = SqliteStore::connect(&db_path)?;
            let mut stmt = conn.prepare("SELECT value FROM state WHERE key = ?1")?;
            let mut rows = stmt.query(rusqlite::params![key])?;

            if let Some(row) = rows.next()? {
                Ok(Some(row.get(0)?))
            } else {
                Ok(None)
            }
        })
        .await
        .map_err(|e| ModwatchError::Storage(format!("Task join error: {}", e)))?
    }

    async fn write_raw(&self, key: &str, value: String) -> Result<()> {
        let db_path = self.db_path.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = SqliteStore::connect(&db_path)?;
            conn.execute(
                "INSERT INTO state (key, value, updated_at)
                 VALUES (?1, ?2, strftime('%s', 'now'))
                 ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = strftime('%s', 'now')",
                rusqlite::params![key, value],
            )?;
            Ok::<_, ModwatchError>(())
        })
        .await
        .map_err(|e| ModwatchError::Storage(format!("Task join error: {}", e)))??;
        Ok(())
    }
}
