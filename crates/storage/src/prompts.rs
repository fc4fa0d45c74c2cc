//! Prompt rows: CRUD, filtered listing, soft delete.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension, Row, ToSql};
use uuid::Uuid;

use prompthub_core::{
    Prompt, PromptFormat, Semver, TemplateEngineKind, VariableDecl, VersionStatus,
};

use crate::error::{Result, StorageError};
use crate::pagination::{Page, PaginatedResult, SortKey, SortOrder};
use crate::storage::{lock_conn, parse_json, parse_ts, parse_uuid, Storage};

pub(crate) const PROMPT_COLS: &str = "id, project_id, name, slug, description, format, \
     template_engine, variable_spec, tags, category, is_shared, current_version, \
     created_at, updated_at, deleted_at";

/// Input for prompt creation. The initial content becomes version 1.0.0.
#[derive(Debug, Clone)]
pub struct NewPrompt {
    pub project_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub content: String,
    pub format: PromptFormat,
    pub template_engine: TemplateEngineKind,
    pub variable_spec: Vec<VariableDecl>,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub is_shared: bool,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct PromptPatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub format: Option<PromptFormat>,
    pub template_engine: Option<TemplateEngineKind>,
    pub variable_spec: Option<Vec<VariableDecl>>,
    pub tags: Option<Vec<String>>,
    pub category: Option<String>,
    pub is_shared: Option<bool>,
}

/// List filters; all conjunctive.
#[derive(Debug, Clone, Default)]
pub struct PromptFilter {
    pub project_id: Option<Uuid>,
    pub slug: Option<String>,
    /// Overlap match: any shared tag qualifies.
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub is_shared: Option<bool>,
    /// Case-insensitive substring over name and description.
    pub search: Option<String>,
}

pub(crate) struct PromptRow {
    id: String,
    project_id: String,
    name: String,
    slug: String,
    description: Option<String>,
    format: String,
    template_engine: String,
    variable_spec: String,
    tags: String,
    category: Option<String>,
    is_shared: bool,
    current_version: String,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

pub(crate) fn read_prompt_row(row: &Row<'_>) -> rusqlite::Result<PromptRow> {
    Ok(PromptRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        slug: row.get(3)?,
        description: row.get(4)?,
        format: row.get(5)?,
        template_engine: row.get(6)?,
        variable_spec: row.get(7)?,
        tags: row.get(8)?,
        category: row.get(9)?,
        is_shared: row.get(10)?,
        current_version: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
        deleted_at: row.get(14)?,
    })
}

impl PromptRow {
    pub(crate) fn into_prompt(self) -> Result<Prompt> {
        Ok(Prompt {
            id: parse_uuid(&self.id, "prompts.id")?,
            project_id: parse_uuid(&self.project_id, "prompts.project_id")?,
            name: self.name,
            slug: self.slug,
            description: self.description,
            format: self
                .format
                .parse()
                .map_err(|e| StorageError::corrupt("prompts.format", e))?,
            template_engine: self
                .template_engine
                .parse()
                .map_err(|e| StorageError::corrupt("prompts.template_engine", e))?,
            variable_spec: parse_json(&self.variable_spec, "prompts.variable_spec")?,
            tags: parse_json(&self.tags, "prompts.tags")?,
            category: self.category,
            is_shared: self.is_shared,
            current_version: self
                .current_version
                .parse()
                .map_err(|e| StorageError::corrupt("prompts.current_version", e))?,
            created_at: parse_ts(&self.created_at, "prompts.created_at")?,
            updated_at: parse_ts(&self.updated_at, "prompts.updated_at")?,
            deleted_at: self
                .deleted_at
                .as_deref()
                .map(|s| parse_ts(s, "prompts.deleted_at"))
                .transpose()?,
        })
    }
}

impl Storage {
    pub fn create_prompt(&self, new: &NewPrompt) -> Result<Prompt> {
        let mut conn = lock_conn(&self.conn)?;
        let tx = conn.transaction()?;

        let id = Uuid::new_v4();
        let now = Utc::now();
        let version = Semver::INITIAL;
        let spec_json = serde_json::to_string(&new.variable_spec)
            .map_err(|e| StorageError::corrupt("variable_spec", e))?;

        tx.execute(
            r#"INSERT INTO prompts
               (id, project_id, name, slug, description, format, template_engine,
                variable_spec, tags, category, is_shared, current_version,
                current_version_sort, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"#,
            params![
                id.to_string(),
                new.project_id.to_string(),
                new.name,
                new.slug,
                new.description,
                new.format.as_str(),
                new.template_engine.as_str(),
                spec_json,
                serde_json::to_string(&new.tags)
                    .map_err(|e| StorageError::corrupt("tags", e))?,
                new.category,
                new.is_shared,
                version.to_string(),
                version.sort_key(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        tx.execute(
            r#"INSERT INTO prompt_versions
               (id, prompt_id, version, content, variable_spec, changelog, status, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                Uuid::new_v4().to_string(),
                id.to_string(),
                version.to_string(),
                new.content,
                spec_json,
                "Initial version",
                VersionStatus::Published.as_str(),
                now.to_rfc3339(),
            ],
        )?;

        tx.commit()?;
        drop(conn);
        self.get_prompt(id)
    }

    pub fn get_prompt(&self, id: Uuid) -> Result<Prompt> {
        let conn = lock_conn(&self.conn)?;
        let row = conn
            .query_row(
                &format!("SELECT {PROMPT_COLS} FROM prompts WHERE id = ?1 AND deleted_at IS NULL"),
                params![id.to_string()],
                read_prompt_row,
            )
            .optional()?;
        row.ok_or_else(|| StorageError::NotFound { entity: "prompt", id: id.to_string() })?
            .into_prompt()
    }

    pub fn get_prompt_by_slug(&self, project_id: Option<Uuid>, slug: &str) -> Result<Prompt> {
        let conn = lock_conn(&self.conn)?;
        let row = match project_id {
            Some(project) => conn
                .query_row(
                    &format!(
                        "SELECT {PROMPT_COLS} FROM prompts \
                         WHERE project_id = ?1 AND slug = ?2 AND deleted_at IS NULL"
                    ),
                    params![project.to_string(), slug],
                    read_prompt_row,
                )
                .optional()?,
            None => conn
                .query_row(
                    &format!(
                        "SELECT {PROMPT_COLS} FROM prompts \
                         WHERE slug = ?1 AND deleted_at IS NULL \
                         ORDER BY created_at LIMIT 1"
                    ),
                    params![slug],
                    read_prompt_row,
                )
                .optional()?,
        };
        row.ok_or_else(|| StorageError::NotFound { entity: "prompt", id: slug.to_owned() })?
            .into_prompt()
    }

    /// Batched read used by the resolver: one query per resolution.
    pub fn get_prompts_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Prompt>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = lock_conn(&self.conn)?;
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {PROMPT_COLS} FROM prompts \
             WHERE id IN ({placeholders}) AND deleted_at IS NULL"
        );
        let mut stmt = conn.prepare(&sql)?;
        let id_strings: Vec<String> = ids.iter().map(Uuid::to_string).collect();
        let rows = stmt.query_map(params_from_iter(id_strings.iter()), read_prompt_row)?;
        let mut prompts = Vec::with_capacity(ids.len());
        for row in rows {
            prompts.push(row?.into_prompt()?);
        }
        Ok(prompts)
    }

    pub fn list_prompts(
        &self,
        filter: &PromptFilter,
        sort: SortKey,
        order: SortOrder,
        page: Page,
    ) -> Result<PaginatedResult<Prompt>> {
        let mut clauses: Vec<String> = vec!["deleted_at IS NULL".to_owned()];
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(project) = filter.project_id {
            clauses.push(format!("project_id = ?{}", args.len() + 1));
            args.push(Box::new(project.to_string()));
        }
        if let Some(slug) = &filter.slug {
            clauses.push(format!("slug = ?{}", args.len() + 1));
            args.push(Box::new(slug.clone()));
        }
        if !filter.tags.is_empty() {
            let placeholders: Vec<String> = filter
                .tags
                .iter()
                .enumerate()
                .map(|(i, _)| format!("?{}", args.len() + 1 + i))
                .collect();
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM json_each(prompts.tags) \
                 WHERE json_each.value IN ({}))",
                placeholders.join(", ")
            ));
            for tag in &filter.tags {
                args.push(Box::new(tag.clone()));
            }
        }
        if let Some(category) = &filter.category {
            clauses.push(format!("category = ?{}", args.len() + 1));
            args.push(Box::new(category.clone()));
        }
        if let Some(shared) = filter.is_shared {
            clauses.push(format!("is_shared = ?{}", args.len() + 1));
            args.push(Box::new(shared));
        }
        if let Some(search) = &filter.search {
            let n = args.len() + 1;
            clauses.push(format!(
                "(LOWER(name) LIKE ?{n} OR LOWER(COALESCE(description, '')) LIKE ?{n})"
            ));
            args.push(Box::new(format!("%{}%", search.to_lowercase())));
        }

        let where_sql = clauses.join(" AND ");
        let conn = lock_conn(&self.conn)?;

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM prompts WHERE {where_sql}"),
            params_from_iter(args.iter().map(|a| a.as_ref())),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {PROMPT_COLS} FROM prompts WHERE {where_sql} \
             ORDER BY {} {} LIMIT {} OFFSET {}",
            sort.column(),
            order.sql(),
            page.page_size,
            page.offset(),
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter().map(|a| a.as_ref())), read_prompt_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?.into_prompt()?);
        }

        Ok(PaginatedResult { items, total: total as u64, page: page.page, page_size: page.page_size })
    }

    pub fn update_prompt(&self, id: Uuid, patch: &PromptPatch) -> Result<Prompt> {
        // Existence check first so a patch against a deleted prompt is a 404,
        // not a silent no-op.
        self.get_prompt(id)?;

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
        if let Some(format) = patch.format {
            push("format", Box::new(format.as_str()), &mut sets, &mut args);
        }
        if let Some(engine) = patch.template_engine {
            push("template_engine", Box::new(engine.as_str()), &mut sets, &mut args);
        }
        if let Some(spec) = &patch.variable_spec {
            let json = serde_json::to_string(spec)
                .map_err(|e| StorageError::corrupt("variable_spec", e))?;
            push("variable_spec", Box::new(json), &mut sets, &mut args);
        }
        if let Some(tags) = &patch.tags {
            let json =
                serde_json::to_string(tags).map_err(|e| StorageError::corrupt("tags", e))?;
            push("tags", Box::new(json), &mut sets, &mut args);
        }
        if let Some(category) = &patch.category {
            push("category", Box::new(category.clone()), &mut sets, &mut args);
        }
        if let Some(shared) = patch.is_shared {
            push("is_shared", Box::new(shared), &mut sets, &mut args);
        }

        push("updated_at", Box::new(Utc::now().to_rfc3339()), &mut sets, &mut args);

        let sql = format!(
            "UPDATE prompts SET {} WHERE id = ?{} AND deleted_at IS NULL",
            sets.join(", "),
            args.len() + 1
        );
        args.push(Box::new(id.to_string()));

        {
            let conn = lock_conn(&self.conn)?;
            conn.execute(&sql, params_from_iter(args.iter().map(|a| a.as_ref())))?;
        }
        self.get_prompt(id)
    }

    pub fn soft_delete_prompt(&self, id: Uuid) -> Result<()> {
        let conn = lock_conn(&self.conn)?;
        let now: DateTime<Utc> = Utc::now();
        let changed = conn.execute(
            "UPDATE prompts SET deleted_at = ?1, updated_at = ?1 \
             WHERE id = ?2 AND deleted_at IS NULL",
            params![now.to_rfc3339(), id.to_string()],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound { entity: "prompt", id: id.to_string() });
        }
        Ok(())
    }

    pub fn set_prompt_shared(&self, id: Uuid) -> Result<Prompt> {
        {
            let conn = lock_conn(&self.conn)?;
            let changed = conn.execute(
                "UPDATE prompts SET is_shared = 1, updated_at = ?1 \
                 WHERE id = ?2 AND deleted_at IS NULL",
                params![Utc::now().to_rfc3339(), id.to_string()],
            )?;
            if changed == 0 {
                return Err(StorageError::NotFound { entity: "prompt", id: id.to_string() });
            }
        }
        self.get_prompt(id)
    }
}
