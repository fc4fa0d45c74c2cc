//! Prompt lifecycle: CRUD, publish, share, fork, single-prompt render.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use prompthub_core::{
    estimate_tokens, validate_slug, validate_variable_spec, BumpKind, CallLogRecord, Prompt,
    PromptVersion, RefType, Semver,
};
use prompthub_storage::{
    NewPrompt, NewRef, Page, PaginatedResult, PromptFilter, PromptPatch, SortKey, SortOrder,
    Storage,
};

use crate::call_sink::CallLogSink;
use crate::error::{Result, ServiceError};
use crate::renderer;
use crate::resolve_cache::ResolveCache;
use crate::resolver::DependencyResolver;
use crate::{Caller, ServiceConfig};

/// Output of a single-prompt render.
#[derive(Debug, Clone, Serialize)]
pub struct RenderOutput {
    pub prompt_id: Uuid,
    pub version: String,
    pub rendered_content: String,
    pub token_estimate: u64,
}

/// Publish request payload; omitted content/spec carry forward from the
/// current version.
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    pub bump: Option<BumpKind>,
    pub content: Option<String>,
    pub variable_spec: Option<Vec<prompthub_core::VariableDecl>>,
    pub changelog: Option<String>,
}

pub struct PromptService {
    storage: Arc<Storage>,
    cache: Arc<ResolveCache>,
    sink: CallLogSink,
    config: ServiceConfig,
}

impl PromptService {
    #[must_use]
    pub const fn new(
        storage: Arc<Storage>,
        cache: Arc<ResolveCache>,
        sink: CallLogSink,
        config: ServiceConfig,
    ) -> Self {
        Self { storage, cache, sink, config }
    }

    pub fn create(&self, new: NewPrompt) -> Result<Prompt> {
        validate_slug(&new.slug)?;
        validate_variable_spec(&new.variable_spec)?;
        if new.template_engine == prompthub_core::TemplateEngineKind::None
            && !new.variable_spec.is_empty()
        {
            return Err(ServiceError::Validation(
                "a prompt with template engine 'none' must have an empty variable spec".to_owned(),
            ));
        }
        // Project existence up front so a bad id is a 404, not a FK error.
        self.storage.get_project(new.project_id)?;
        Ok(self.storage.create_prompt(&new)?)
    }

    pub fn get(&self, id: Uuid) -> Result<Prompt> {
        Ok(self.storage.get_prompt(id)?)
    }

    pub fn get_by_slug(&self, project_id: Option<Uuid>, slug: &str) -> Result<Prompt> {
        Ok(self.storage.get_prompt_by_slug(project_id, slug)?)
    }

    pub fn list(
        &self,
        filter: &PromptFilter,
        sort_by: Option<&str>,
        order: SortOrder,
        page: u32,
        page_size: u32,
    ) -> Result<PaginatedResult<Prompt>> {
        let sort = parse_sort_key(sort_by.unwrap_or("created_at"))?;
        let page = Page::new(page, self.clamp_page_size(page_size));
        Ok(self.storage.list_prompts(filter, sort, order, page)?)
    }

    pub fn update(&self, id: Uuid, patch: PromptPatch) -> Result<Prompt> {
        if let Some(slug) = &patch.slug {
            validate_slug(slug)?;
        }
        if let Some(spec) = &patch.variable_spec {
            validate_variable_spec(spec)?;
        }
        let prompt = self.storage.update_prompt(id, &patch)?;
        self.cache.invalidate_prompt(id);
        Ok(prompt)
    }

    pub fn delete(&self, id: Uuid) -> Result<()> {
        self.storage.soft_delete_prompt(id)?;
        self.cache.invalidate_prompt(id);
        Ok(())
    }

    pub fn share(&self, id: Uuid) -> Result<Prompt> {
        let prompt = self.storage.set_prompt_shared(id)?;
        self.cache.invalidate_prompt(id);
        Ok(prompt)
    }

    /// Bumps the current version and publishes a new immutable snapshot.
    pub fn publish(&self, id: Uuid, request: PublishRequest) -> Result<PromptVersion> {
        let prompt = self.storage.get_prompt(id)?;
        let bump = request.bump.unwrap_or(BumpKind::Patch);
        let next = prompt.current_version.bump(bump);

        let current = self.storage.get_version(id, prompt.current_version)?;
        let content = request.content.unwrap_or(current.content);
        let variable_spec = match request.variable_spec {
            Some(spec) => {
                validate_variable_spec(&spec)?;
                spec
            },
            None => current.variable_spec,
        };

        let version = self.storage.publish_version(
            id,
            next,
            &content,
            &variable_spec,
            request.changelog.as_deref(),
        )?;
        self.cache.invalidate_prompt(id);
        Ok(version)
    }

    pub fn list_versions(&self, id: Uuid) -> Result<Vec<PromptVersion>> {
        self.storage.get_prompt(id)?;
        Ok(self.storage.list_versions(id)?)
    }

    pub fn get_version(&self, id: Uuid, version: &str) -> Result<PromptVersion> {
        self.storage.get_prompt(id)?;
        let version: Semver = version
            .parse()
            .map_err(|_| ServiceError::Validation(format!("invalid version '{version}'")))?;
        Ok(self.storage.get_version(id, version)?)
    }

    /// Renders the prompt's current version with the supplied variables and
    /// logs the call.
    pub fn render(
        &self,
        id: Uuid,
        variables: BTreeMap<String, Value>,
        caller: &Caller,
    ) -> Result<RenderOutput> {
        let started = Instant::now();
        let prompt = self.storage.get_prompt(id)?;
        let version = self.storage.get_version(id, prompt.current_version)?;

        let rendered = renderer::render(
            &version.content,
            prompt.template_engine,
            &version.variable_spec,
            &variables,
        )?;
        let token_estimate = estimate_tokens(&rendered);

        self.sink.record(CallLogRecord {
            id: Uuid::new_v4(),
            prompt_id: Some(prompt.id),
            scene_id: None,
            version: Some(version.version.to_string()),
            caller_system: Some(caller.system.clone()),
            input_variables: Value::Object(variables.into_iter().collect()),
            rendered_content: rendered.clone(),
            token_count: token_estimate,
            response_time_ms: started.elapsed().as_millis() as u64,
            created_at: Utc::now(),
        });

        Ok(RenderOutput {
            prompt_id: prompt.id,
            version: version.version.to_string(),
            rendered_content: rendered,
            token_estimate,
        })
    }

    /// Explicit prompt-to-prompt reference. Cross-project targets must be
    /// shared, and the edge must not close a cycle.
    pub fn create_ref(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        ref_type: RefType,
        override_config: BTreeMap<String, Value>,
        pinned_version: Option<Semver>,
    ) -> Result<prompthub_core::PromptRef> {
        let source = self.storage.get_prompt(source_id)?;
        let target = self.storage.get_prompt(target_id)?;
        if source.project_id != target.project_id && !target.is_shared {
            return Err(ServiceError::PermissionDenied(format!(
                "prompt '{}' is not shared and belongs to another project",
                target.name
            )));
        }
        DependencyResolver::new(Arc::clone(&self.storage))
            .ensure_edge_acyclic(source_id, target_id)?;

        let created = self.storage.create_prompt_ref(&NewRef {
            source_prompt_id: Some(source_id),
            source_scene_id: None,
            source_step_id: None,
            target_prompt_id: target_id,
            ref_type,
            override_config,
            pinned_version,
        })?;
        // The source's resolution graph changed shape.
        self.cache.invalidate_prompt(source_id);
        Ok(created)
    }

    pub fn delete_ref(&self, ref_id: Uuid) -> Result<()> {
        let existing = self.storage.get_ref(ref_id)?;
        self.storage.delete_ref(ref_id)?;
        if let Some(source) = existing.source_prompt_id {
            self.cache.invalidate_prompt(source);
        }
        Ok(())
    }

    /// Outgoing and incoming reference edges for a prompt.
    pub fn refs_for_prompt(
        &self,
        id: Uuid,
    ) -> Result<(Vec<prompthub_core::PromptRef>, Vec<prompthub_core::PromptRef>)> {
        self.storage.get_prompt(id)?;
        let outgoing = self.storage.out_edges_of_prompt(id)?;
        let incoming = self.storage.in_edges_of_prompt(id)?;
        Ok((outgoing, incoming))
    }

    /// Scenes whose pipelines reference this prompt; impact analysis for
    /// version bumps.
    pub fn impacted_scenes(&self, id: Uuid) -> Result<Vec<Uuid>> {
        self.storage.get_prompt(id)?;
        Ok(self.storage.scenes_referencing(id)?)
    }

    /// Copies a shared prompt into another project. Fork is a copy, not a
    /// link: the fork starts over at 1.0.0, unshared, with an `includes`
    /// ref back to the source for provenance.
    pub fn fork(
        &self,
        source_id: Uuid,
        target_project_id: Uuid,
        slug_override: Option<String>,
    ) -> Result<Prompt> {
        let source = self.storage.get_prompt(source_id)?;
        if !source.is_shared {
            return Err(ServiceError::PermissionDenied(format!(
                "prompt '{}' is not shared",
                source.name
            )));
        }
        self.storage.get_project(target_project_id)?;

        let slug = slug_override.unwrap_or_else(|| format!("{}-fork", source.slug));
        validate_slug(&slug)?;
        let current = self.storage.get_version(source_id, source.current_version)?;

        let forked = self.storage.create_prompt(&NewPrompt {
            project_id: target_project_id,
            name: format!("{} (fork)", source.name),
            slug,
            description: source.description.clone(),
            content: current.content,
            format: source.format,
            template_engine: source.template_engine,
            variable_spec: current.variable_spec,
            tags: source.tags.clone(),
            category: source.category.clone(),
            is_shared: false,
        })?;

        self.storage.create_prompt_ref(&NewRef {
            source_prompt_id: Some(forked.id),
            source_scene_id: None,
            source_step_id: None,
            target_prompt_id: source.id,
            ref_type: RefType::Includes,
            override_config: BTreeMap::new(),
            pinned_version: Some(source.current_version),
        })?;

        Ok(forked)
    }

    fn clamp_page_size(&self, requested: u32) -> u32 {
        if requested == 0 {
            self.config.default_page_size
        } else {
            requested.min(self.config.max_page_size)
        }
    }
}

pub(crate) fn parse_sort_key(raw: &str) -> Result<SortKey> {
    match raw {
        "created_at" => Ok(SortKey::CreatedAt),
        "updated_at" => Ok(SortKey::UpdatedAt),
        "name" => Ok(SortKey::Name),
        "slug" => Ok(SortKey::Slug),
        "current_version" => Ok(SortKey::CurrentVersion),
        other => Err(ServiceError::Validation(format!(
            "sort_by must be one of created_at, updated_at, name, slug, current_version; \
             got '{other}'"
        ))),
    }
}
