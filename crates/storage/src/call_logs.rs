//! Durable side of the call-log sink.

use rusqlite::params;

use prompthub_core::CallLogRecord;

use crate::error::Result;
use crate::storage::{lock_conn, Storage};

impl Storage {
    pub fn insert_call_log(&self, record: &CallLogRecord) -> Result<()> {
        let conn = lock_conn(&self.conn)?;
        conn.execute(
            r#"INSERT INTO call_logs
               (id, prompt_id, scene_id, version, caller_system, input_variables,
                rendered_content, token_count, response_time_ms, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            params![
                record.id.to_string(),
                record.prompt_id.map(|u| u.to_string()),
                record.scene_id.map(|u| u.to_string()),
                record.version,
                record.caller_system,
                record.input_variables.to_string(),
                record.rendered_content,
                record.token_count as i64,
                record.response_time_ms as i64,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn call_log_count(&self) -> Result<u64> {
        let conn = lock_conn(&self.conn)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM call_logs", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Call-log rows for one scene, newest first. Used by tests and
    /// impact queries; not part of the public API surface.
    pub fn call_logs_for_scene(&self, scene_id: uuid::Uuid) -> Result<u64> {
        let conn = lock_conn(&self.conn)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM call_logs WHERE scene_id = ?1",
            params![scene_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
