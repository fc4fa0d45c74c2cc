//! Append-only version rows and the atomic publish.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use prompthub_core::{PromptVersion, Semver, VariableDecl, VersionStatus};

use crate::error::{Result, StorageError};
use crate::storage::{lock_conn, parse_json, parse_ts, parse_uuid, Storage};

const VERSION_COLS: &str =
    "id, prompt_id, version, content, variable_spec, changelog, status, created_at";

struct VersionRow {
    id: String,
    prompt_id: String,
    version: String,
    content: String,
    variable_spec: String,
    changelog: Option<String>,
    status: String,
    created_at: String,
}

fn read_version_row(row: &Row<'_>) -> rusqlite::Result<VersionRow> {
    Ok(VersionRow {
        id: row.get(0)?,
        prompt_id: row.get(1)?,
        version: row.get(2)?,
        content: row.get(3)?,
        variable_spec: row.get(4)?,
        changelog: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl VersionRow {
    fn into_version(self) -> Result<PromptVersion> {
        Ok(PromptVersion {
            id: parse_uuid(&self.id, "prompt_versions.id")?,
            prompt_id: parse_uuid(&self.prompt_id, "prompt_versions.prompt_id")?,
            version: self
                .version
                .parse()
                .map_err(|e| StorageError::corrupt("prompt_versions.version", e))?,
            content: self.content,
            variable_spec: parse_json(&self.variable_spec, "prompt_versions.variable_spec")?,
            changelog: self.changelog,
            status: self
                .status
                .parse()
                .map_err(|e| StorageError::corrupt("prompt_versions.status", e))?,
            created_at: parse_ts(&self.created_at, "prompt_versions.created_at")?,
        })
    }
}

impl Storage {
    /// Inserts the new published version and moves `current_version` in one
    /// transaction: both land or neither does.
    pub fn publish_version(
        &self,
        prompt_id: Uuid,
        version: Semver,
        content: &str,
        variable_spec: &[VariableDecl],
        changelog: Option<&str>,
    ) -> Result<PromptVersion> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let spec_json = serde_json::to_string(variable_spec)
            .map_err(|e| StorageError::corrupt("variable_spec", e))?;

        let mut conn = lock_conn(&self.conn)?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"INSERT INTO prompt_versions
               (id, prompt_id, version, content, variable_spec, changelog, status, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                id.to_string(),
                prompt_id.to_string(),
                version.to_string(),
                content,
                spec_json,
                changelog,
                VersionStatus::Published.as_str(),
                now.to_rfc3339(),
            ],
        )?;

        let changed = tx.execute(
            "UPDATE prompts SET current_version = ?1, current_version_sort = ?2, updated_at = ?3 \
             WHERE id = ?4 AND deleted_at IS NULL",
            params![
                version.to_string(),
                version.sort_key(),
                now.to_rfc3339(),
                prompt_id.to_string()
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound { entity: "prompt", id: prompt_id.to_string() });
        }

        tx.commit()?;
        drop(conn);
        self.get_version(prompt_id, version)
    }

    /// Newest first.
    pub fn list_versions(&self, prompt_id: Uuid) -> Result<Vec<PromptVersion>> {
        let conn = lock_conn(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {VERSION_COLS} FROM prompt_versions \
             WHERE prompt_id = ?1 ORDER BY created_at DESC, version DESC"
        ))?;
        let rows = stmt.query_map(params![prompt_id.to_string()], read_version_row)?;
        let mut versions = Vec::new();
        for row in rows {
            versions.push(row?.into_version()?);
        }
        Ok(versions)
    }

    pub fn get_version(&self, prompt_id: Uuid, version: Semver) -> Result<PromptVersion> {
        let conn = lock_conn(&self.conn)?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {VERSION_COLS} FROM prompt_versions \
                     WHERE prompt_id = ?1 AND version = ?2"
                ),
                params![prompt_id.to_string(), version.to_string()],
                read_version_row,
            )
            .optional()?;
        row.ok_or_else(|| StorageError::NotFound {
            entity: "version",
            id: format!("{prompt_id}@{version}"),
        })?
        .into_version()
    }
}
