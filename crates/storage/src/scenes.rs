//! Scene rows. Pipelines are stored as JSON; each save atomically replaces
//! the scene's derived edge set in the Reference Index.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row, ToSql};
use uuid::Uuid;

use prompthub_core::{MergeStrategy, Pipeline, Scene};

use crate::error::{Result, StorageError};
use crate::pagination::{Page, PaginatedResult, SortKey, SortOrder};
use crate::refs::{insert_ref_tx, NewRef};
use crate::storage::{lock_conn, parse_json, parse_ts, parse_uuid, Storage};

const SCENE_COLS: &str = "id, project_id, name, slug, description, pipeline, \
     merge_strategy, separator, output_format, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct NewScene {
    pub project_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub pipeline: Pipeline,
    pub merge_strategy: MergeStrategy,
    pub separator: String,
    pub output_format: Option<String>,
}

/// Partial update; `pipeline` changes must arrive with their re-derived
/// edges.
#[derive(Debug, Clone, Default)]
pub struct ScenePatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub pipeline: Option<Pipeline>,
    pub merge_strategy: Option<MergeStrategy>,
    pub separator: Option<String>,
    pub output_format: Option<String>,
}

struct SceneRow {
    id: String,
    project_id: String,
    name: String,
    slug: String,
    description: Option<String>,
    pipeline: String,
    merge_strategy: String,
    separator: String,
    output_format: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_scene_row(row: &Row<'_>) -> rusqlite::Result<SceneRow> {
    Ok(SceneRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        slug: row.get(3)?,
        description: row.get(4)?,
        pipeline: row.get(5)?,
        merge_strategy: row.get(6)?,
        separator: row.get(7)?,
        output_format: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

impl SceneRow {
    fn into_scene(self) -> Result<Scene> {
        Ok(Scene {
            id: parse_uuid(&self.id, "scenes.id")?,
            project_id: parse_uuid(&self.project_id, "scenes.project_id")?,
            name: self.name,
            slug: self.slug,
            description: self.description,
            pipeline: parse_json(&self.pipeline, "scenes.pipeline")?,
            merge_strategy: self
                .merge_strategy
                .parse()
                .map_err(|e| StorageError::corrupt("scenes.merge_strategy", e))?,
            separator: self.separator,
            output_format: self.output_format,
            created_at: parse_ts(&self.created_at, "scenes.created_at")?,
            updated_at: parse_ts(&self.updated_at, "scenes.updated_at")?,
        })
    }
}

impl Storage {
    pub fn create_scene(&self, new: &NewScene, edges: &[NewRef]) -> Result<Scene> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let pipeline_json = serde_json::to_string(&new.pipeline)
            .map_err(|e| StorageError::corrupt("pipeline", e))?;

        let mut conn = lock_conn(&self.conn)?;
        let tx = conn.transaction()?;
        tx.execute(
            r#"INSERT INTO scenes
               (id, project_id, name, slug, description, pipeline, merge_strategy,
                separator, output_format, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
            params![
                id.to_string(),
                new.project_id.to_string(),
                new.name,
                new.slug,
                new.description,
                pipeline_json,
                new.merge_strategy.as_str(),
                new.separator,
                new.output_format,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;
        for edge in edges {
            let mut edge = edge.clone();
            edge.source_scene_id = Some(id);
            insert_ref_tx(&tx, &edge)?;
        }
        tx.commit()?;
        drop(conn);
        self.get_scene(id)
    }

    pub fn get_scene(&self, id: Uuid) -> Result<Scene> {
        let conn = lock_conn(&self.conn)?;
        let row = conn
            .query_row(
                &format!("SELECT {SCENE_COLS} FROM scenes WHERE id = ?1"),
                params![id.to_string()],
                read_scene_row,
            )
            .optional()?;
        row.ok_or_else(|| StorageError::NotFound { entity: "scene", id: id.to_string() })?
            .into_scene()
    }

    pub fn list_scenes(
        &self,
        project_id: Option<Uuid>,
        sort: SortKey,
        order: SortOrder,
        page: Page,
    ) -> Result<PaginatedResult<Scene>> {
        let conn = lock_conn(&self.conn)?;
        let (where_sql, args): (&str, Vec<String>) = match project_id {
            Some(project) => ("WHERE project_id = ?1", vec![project.to_string()]),
            None => ("", Vec::new()),
        };

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM scenes {where_sql}"),
            rusqlite::params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {SCENE_COLS} FROM scenes {where_sql} ORDER BY {} {} LIMIT {} OFFSET {}",
            sort.column(),
            order.sql(),
            page.page_size,
            page.offset(),
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), read_scene_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?.into_scene()?);
        }
        Ok(PaginatedResult { items, total: total as u64, page: page.page, page_size: page.page_size })
    }

    /// Applies the patch; when the pipeline changed, the scene's derived
    /// edges are swapped for `edges` in the same transaction.
    pub fn update_scene(
        &self,
        id: Uuid,
        patch: &ScenePatch,
        edges: Option<&[NewRef]>,
    ) -> Result<Scene> {
        self.get_scene(id)?;

        let mut sets: Vec<String> = Vec::new();
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();
        let mut push = |column: &str, value: Box<dyn ToSql>, sets: &mut Vec<String>,
                        args: &mut Vec<Box<dyn ToSql>>| {
            sets.push(format!("{column} = ?{}", args.len() + 1));
            args.push(value);
        };

        if let Some(name) = &patch.name {
            push("name", Box::new(name.clone()), &mut sets, &mut args);
        }
        if let Some(slug) = &patch.slug {
            push("slug", Box::new(slug.clone()), &mut sets, &mut args);
        }
        if let Some(description) = &patch.description {
            push("description", Box::new(description.clone()), &mut sets, &mut args);
        }
        if let Some(pipeline) = &patch.pipeline {
            let json = serde_json::to_string(pipeline)
                .map_err(|e| StorageError::corrupt("pipeline", e))?;
            push("pipeline", Box::new(json), &mut sets, &mut args);
        }
        if let Some(strategy) = patch.merge_strategy {
            push("merge_strategy", Box::new(strategy.as_str()), &mut sets, &mut args);
        }
        if let Some(separator) = &patch.separator {
            push("separator", Box::new(separator.clone()), &mut sets, &mut args);
        }
        if let Some(format) = &patch.output_format {
            push("output_format", Box::new(format.clone()), &mut sets, &mut args);
        }
        push("updated_at", Box::new(Utc::now().to_rfc3339()), &mut sets, &mut args);

        let sql = format!("UPDATE scenes SET {} WHERE id = ?{}", sets.join(", "), args.len() + 1);
        args.push(Box::new(id.to_string()));

        {
            let mut conn = lock_conn(&self.conn)?;
            let tx = conn.transaction()?;
            tx.execute(&sql, rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())))?;
            if let Some(edges) = edges {
                tx.execute(
                    "DELETE FROM prompt_refs WHERE source_scene_id = ?1",
                    params![id.to_string()],
                )?;
                for edge in edges {
                    let mut edge = edge.clone();
                    edge.source_scene_id = Some(id);
                    insert_ref_tx(&tx, &edge)?;
                }
            }
            tx.commit()?;
        }
        self.get_scene(id)
    }

    pub fn delete_scene(&self, id: Uuid) -> Result<()> {
        let mut conn = lock_conn(&self.conn)?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM prompt_refs WHERE source_scene_id = ?1", params![id.to_string()])?;
        let changed = tx.execute("DELETE FROM scenes WHERE id = ?1", params![id.to_string()])?;
        if changed == 0 {
            return Err(StorageError::NotFound { entity: "scene", id: id.to_string() });
        }
        tx.commit()?;
        Ok(())
    }
}
