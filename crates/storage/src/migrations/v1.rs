//! v1: the six base tables with their natural-key constraints.

pub const SQL: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    slug        TEXT NOT NULL UNIQUE,
    description TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS prompts (
    id                   TEXT PRIMARY KEY,
    project_id           TEXT NOT NULL REFERENCES projects(id),
    name                 TEXT NOT NULL,
    slug                 TEXT NOT NULL,
    description          TEXT,
    format               TEXT NOT NULL DEFAULT 'text',
    template_engine      TEXT NOT NULL DEFAULT 'jinja2',
    variable_spec        TEXT NOT NULL DEFAULT '[]',
    tags                 TEXT NOT NULL DEFAULT '[]',
    category             TEXT,
    is_shared            INTEGER NOT NULL DEFAULT 0,
    current_version      TEXT NOT NULL,
    current_version_sort TEXT NOT NULL,
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL,
    deleted_at           TEXT
);

-- Slug uniqueness applies to live prompts only; soft-deleted rows keep
-- their slug without blocking reuse.
CREATE UNIQUE INDEX IF NOT EXISTS uq_prompts_project_slug
    ON prompts(project_id, slug) WHERE deleted_at IS NULL;
CREATE INDEX IF NOT EXISTS ix_prompts_project ON prompts(project_id);

CREATE TABLE IF NOT EXISTS prompt_versions (
    id            TEXT PRIMARY KEY,
    prompt_id     TEXT NOT NULL REFERENCES prompts(id) ON DELETE CASCADE,
    version       TEXT NOT NULL,
    content       TEXT NOT NULL,
    variable_spec TEXT NOT NULL DEFAULT '[]',
    changelog     TEXT,
    status        TEXT NOT NULL DEFAULT 'draft',
    created_at    TEXT NOT NULL,
    UNIQUE (prompt_id, version)
);

CREATE TABLE IF NOT EXISTS scenes (
    id             TEXT PRIMARY KEY,
    project_id     TEXT NOT NULL REFERENCES projects(id),
    name           TEXT NOT NULL,
    slug           TEXT NOT NULL,
    description    TEXT,
    pipeline       TEXT NOT NULL,
    merge_strategy TEXT NOT NULL DEFAULT 'concat',
    separator      TEXT NOT NULL,
    output_format  TEXT,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    UNIQUE (project_id, slug)
);

CREATE TABLE IF NOT EXISTS prompt_refs (
    id               TEXT PRIMARY KEY,
    source_prompt_id TEXT REFERENCES prompts(id) ON DELETE CASCADE,
    source_scene_id  TEXT REFERENCES scenes(id) ON DELETE CASCADE,
    source_step_id   TEXT,
    target_prompt_id TEXT NOT NULL REFERENCES prompts(id) ON DELETE CASCADE,
    ref_type         TEXT NOT NULL,
    override_config  TEXT NOT NULL DEFAULT '{}',
    pinned_version   TEXT,
    created_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS ix_refs_source_prompt ON prompt_refs(source_prompt_id);
CREATE INDEX IF NOT EXISTS ix_refs_source_scene ON prompt_refs(source_scene_id);
CREATE INDEX IF NOT EXISTS ix_refs_target ON prompt_refs(target_prompt_id);

CREATE TABLE IF NOT EXISTS call_logs (
    id               TEXT PRIMARY KEY,
    prompt_id        TEXT,
    scene_id         TEXT,
    version          TEXT,
    caller_system    TEXT,
    input_variables  TEXT,
    rendered_content TEXT,
    token_count      INTEGER NOT NULL DEFAULT 0,
    response_time_ms INTEGER NOT NULL DEFAULT 0,
    created_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS ix_call_logs_created ON call_logs(created_at);
"#;
