//! Reference Index edges.
//!
//! Scene saves re-derive their edge set atomically inside the scene
//! transaction; explicit prompt-to-prompt refs are inserted one at a time.

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde_json::Value;
use uuid::Uuid;

use prompthub_core::{PromptRef, RefType, Semver};

use crate::error::{Result, StorageError};
use crate::storage::{lock_conn, parse_json, parse_ts, parse_uuid, Storage};

const REF_COLS: &str = "id, source_prompt_id, source_scene_id, source_step_id, \
     target_prompt_id, ref_type, override_config, pinned_version, created_at";

/// Input for edge insertion. Exactly one of `source_prompt_id` /
/// `source_scene_id` is expected to be set.
#[derive(Debug, Clone)]
pub struct NewRef {
    pub source_prompt_id: Option<Uuid>,
    pub source_scene_id: Option<Uuid>,
    pub source_step_id: Option<String>,
    pub target_prompt_id: Uuid,
    pub ref_type: RefType,
    pub override_config: BTreeMap<String, Value>,
    pub pinned_version: Option<Semver>,
}

struct RefRow {
    id: String,
    source_prompt_id: Option<String>,
    source_scene_id: Option<String>,
    source_step_id: Option<String>,
    target_prompt_id: String,
    ref_type: String,
    override_config: String,
    pinned_version: Option<String>,
    created_at: String,
}

fn read_ref_row(row: &Row<'_>) -> rusqlite::Result<RefRow> {
    Ok(RefRow {
        id: row.get(0)?,
        source_prompt_id: row.get(1)?,
        source_scene_id: row.get(2)?,
        source_step_id: row.get(3)?,
        target_prompt_id: row.get(4)?,
        ref_type: row.get(5)?,
        override_config: row.get(6)?,
        pinned_version: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl RefRow {
    fn into_ref(self) -> Result<PromptRef> {
        Ok(PromptRef {
            id: parse_uuid(&self.id, "prompt_refs.id")?,
            source_prompt_id: self
                .source_prompt_id
                .as_deref()
                .map(|s| parse_uuid(s, "prompt_refs.source_prompt_id"))
                .transpose()?,
            source_scene_id: self
                .source_scene_id
                .as_deref()
                .map(|s| parse_uuid(s, "prompt_refs.source_scene_id"))
                .transpose()?,
            source_step_id: self.source_step_id,
            target_prompt_id: parse_uuid(&self.target_prompt_id, "prompt_refs.target_prompt_id")?,
            ref_type: self
                .ref_type
                .parse()
                .map_err(|e| StorageError::corrupt("prompt_refs.ref_type", e))?,
            override_config: parse_json(&self.override_config, "prompt_refs.override_config")?,
            pinned_version: self
                .pinned_version
                .as_deref()
                .map(|s| {
                    s.parse::<Semver>()
                        .map_err(|e| StorageError::corrupt("prompt_refs.pinned_version", e))
                })
                .transpose()?,
            created_at: parse_ts(&self.created_at, "prompt_refs.created_at")?,
        })
    }
}

pub(crate) fn insert_ref_tx(conn: &Connection, new: &NewRef) -> Result<Uuid> {
    let id = Uuid::new_v4();
    conn.execute(
        r#"INSERT INTO prompt_refs
           (id, source_prompt_id, source_scene_id, source_step_id, target_prompt_id,
            ref_type, override_config, pinned_version, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
        params![
            id.to_string(),
            new.source_prompt_id.map(|u| u.to_string()),
            new.source_scene_id.map(|u| u.to_string()),
            new.source_step_id,
            new.target_prompt_id.to_string(),
            new.ref_type.as_str(),
            serde_json::to_string(&new.override_config)
                .map_err(|e| StorageError::corrupt("override_config", e))?,
            new.pinned_version.map(|v| v.to_string()),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(id)
}

fn collect_refs(
    conn: &Connection,
    sql: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<PromptRef>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(args.iter().copied()), read_ref_row)?;
    let mut refs = Vec::new();
    for row in rows {
        refs.push(row?.into_ref()?);
    }
    Ok(refs)
}

impl Storage {
    /// Explicit prompt-to-prompt reference.
    pub fn create_prompt_ref(&self, new: &NewRef) -> Result<PromptRef> {
        let id = {
            let conn = lock_conn(&self.conn)?;
            insert_ref_tx(&conn, new)?
        };
        self.get_ref(id)
    }

    pub fn get_ref(&self, id: Uuid) -> Result<PromptRef> {
        let conn = lock_conn(&self.conn)?;
        let refs = collect_refs(
            &conn,
            &format!("SELECT {REF_COLS} FROM prompt_refs WHERE id = ?1"),
            &[&id.to_string()],
        )?;
        refs.into_iter()
            .next()
            .ok_or_else(|| StorageError::NotFound { entity: "ref", id: id.to_string() })
    }

    pub fn delete_ref(&self, id: Uuid) -> Result<()> {
        let conn = lock_conn(&self.conn)?;
        let changed = conn.execute("DELETE FROM prompt_refs WHERE id = ?1", params![id.to_string()])?;
        if changed == 0 {
            return Err(StorageError::NotFound { entity: "ref", id: id.to_string() });
        }
        Ok(())
    }

    /// Outgoing prompt-to-prompt edges for a batch of prompts, one query.
    /// Drives the resolver's transitive closure expansion.
    pub fn out_edges_of_prompts(&self, prompt_ids: &[Uuid]) -> Result<Vec<PromptRef>> {
        if prompt_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = lock_conn(&self.conn)?;
        let placeholders = vec!["?"; prompt_ids.len()].join(", ");
        let id_strings: Vec<String> = prompt_ids.iter().map(Uuid::to_string).collect();
        let args: Vec<&dyn rusqlite::ToSql> =
            id_strings.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
        collect_refs(
            &conn,
            &format!(
                "SELECT {REF_COLS} FROM prompt_refs WHERE source_prompt_id IN ({placeholders})"
            ),
            &args,
        )
    }

    pub fn out_edges_of_prompt(&self, prompt_id: Uuid) -> Result<Vec<PromptRef>> {
        self.out_edges_of_prompts(&[prompt_id])
    }

    /// Incoming edges (who references this prompt); drives invalidation and
    /// impact analysis.
    pub fn in_edges_of_prompt(&self, prompt_id: Uuid) -> Result<Vec<PromptRef>> {
        let conn = lock_conn(&self.conn)?;
        collect_refs(
            &conn,
            &format!("SELECT {REF_COLS} FROM prompt_refs WHERE target_prompt_id = ?1"),
            &[&prompt_id.to_string()],
        )
    }

    /// Edges derived from a scene's pipeline, keyed by step on the way out.
    pub fn scene_edges(&self, scene_id: Uuid) -> Result<Vec<PromptRef>> {
        let conn = lock_conn(&self.conn)?;
        collect_refs(
            &conn,
            &format!("SELECT {REF_COLS} FROM prompt_refs WHERE source_scene_id = ?1"),
            &[&scene_id.to_string()],
        )
    }

    /// Distinct scene ids whose derived edges target this prompt.
    pub fn scenes_referencing(&self, prompt_id: Uuid) -> Result<Vec<Uuid>> {
        let conn = lock_conn(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT source_scene_id FROM prompt_refs \
             WHERE target_prompt_id = ?1 AND source_scene_id IS NOT NULL",
        )?;
        let rows = stmt.query_map(params![prompt_id.to_string()], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(parse_uuid(&row?, "prompt_refs.source_scene_id")?);
        }
        Ok(ids)
    }
}
