//! Project rows. The core treats projects as identity; this is the narrow
//! ProjectStore the rest of the system consumes.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use prompthub_core::Project;

use crate::error::{Result, StorageError};
use crate::pagination::{Page, PaginatedResult};
use crate::storage::{lock_conn, parse_ts, parse_uuid, Storage};

#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
}

fn read_project_row(row: &Row<'_>) -> rusqlite::Result<(String, String, String, Option<String>, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_project(
    (id, name, slug, description, created_at): (String, String, String, Option<String>, String),
) -> Result<Project> {
    Ok(Project {
        id: parse_uuid(&id, "projects.id")?,
        name,
        slug,
        description,
        created_at: parse_ts(&created_at, "projects.created_at")?,
    })
}

impl Storage {
    pub fn create_project(&self, new: &NewProject) -> Result<Project> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        {
            let conn = lock_conn(&self.conn)?;
            conn.execute(
                "INSERT INTO projects (id, name, slug, description, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id.to_string(), new.name, new.slug, new.description, now.to_rfc3339()],
            )?;
        }
        self.get_project(id)
    }

    pub fn get_project(&self, id: Uuid) -> Result<Project> {
        let conn = lock_conn(&self.conn)?;
        let row = conn
            .query_row(
                "SELECT id, name, slug, description, created_at FROM projects WHERE id = ?1",
                params![id.to_string()],
                read_project_row,
            )
            .optional()?;
        row.map(into_project)
            .transpose()?
            .ok_or_else(|| StorageError::NotFound { entity: "project", id: id.to_string() })
    }

    pub fn list_projects(&self, page: Page) -> Result<PaginatedResult<Project>> {
        let conn = lock_conn(&self.conn)?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))?;
        let mut stmt = conn.prepare(
            "SELECT id, name, slug, description, created_at FROM projects \
             ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![page.page_size, page.offset()], read_project_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(into_project(row?)?);
        }
        Ok(PaginatedResult { items, total: total as u64, page: page.page, page_size: page.page_size })
    }
}
