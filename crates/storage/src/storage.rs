//! SQLite storage handle shared across services.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Result, StorageError};
use crate::migrations;

pub struct Storage {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

pub(crate) fn lock_conn(mutex: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    mutex.lock().map_err(|e: PoisonError<_>| {
        StorageError::Migration(format!("database lock poisoned: {e}"))
    })
}

impl Storage {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    /// Private temporary database, used by tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        migrations::run_migrations(&conn)
            .map_err(|e| StorageError::Migration(e.to_string()))?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn stats(&self) -> Result<StorageStats> {
        let conn = lock_conn(&self.conn)?;
        let count = |sql: &str| -> Result<u64> {
            Ok(conn.query_row(sql, [], |row| row.get::<_, i64>(0))? as u64)
        };
        Ok(StorageStats {
            project_count: count("SELECT COUNT(*) FROM projects")?,
            prompt_count: count("SELECT COUNT(*) FROM prompts WHERE deleted_at IS NULL")?,
            version_count: count("SELECT COUNT(*) FROM prompt_versions")?,
            scene_count: count("SELECT COUNT(*) FROM scenes")?,
            ref_count: count("SELECT COUNT(*) FROM prompt_refs")?,
            call_log_count: count("SELECT COUNT(*) FROM call_logs")?,
        })
    }
}

/// Row counts across the six tables.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StorageStats {
    pub project_count: u64,
    pub prompt_count: u64,
    pub version_count: u64,
    pub scene_count: u64,
    pub ref_count: u64,
    pub call_log_count: u64,
}

// Row-decoding helpers shared by the per-entity modules.

pub(crate) fn parse_uuid(raw: &str, context: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| StorageError::corrupt(format!("{context}: uuid"), e))
}

pub(crate) fn parse_ts(raw: &str, context: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::corrupt(format!("{context}: timestamp"), e))
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(raw: &str, context: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| StorageError::corrupt(format!("{context}: json"), e))
}
