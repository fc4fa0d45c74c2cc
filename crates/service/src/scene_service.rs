//! Scene lifecycle. Saves validate the pipeline (prompts exist, cross-project
//! targets are shared, the reference closure is acyclic) and re-derive the
//! scene's Reference Index edges atomically with the row write.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use prompthub_core::{validate_slug, Pipeline, RefType, Scene};
use prompthub_storage::{
    NewRef, NewScene, Page, PaginatedResult, ScenePatch, SortKey, SortOrder, Storage,
};

use crate::error::{Result, ServiceError};
use crate::prompt_service::parse_sort_key;
use crate::resolve_cache::ResolveCache;
use crate::resolver::DependencyResolver;
use crate::ServiceConfig;

/// Node of the dependency graph returned for visualization.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyNode {
    pub id: Uuid,
    pub name: String,
    pub project_id: Uuid,
    pub version: String,
    pub is_shared: bool,
    pub hidden: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyEdge {
    pub source: Uuid,
    pub target: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub ref_type: RefType,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyGraph {
    pub nodes: Vec<DependencyNode>,
    pub edges: Vec<DependencyEdge>,
}

pub struct SceneService {
    storage: Arc<Storage>,
    resolver: DependencyResolver,
    cache: Arc<ResolveCache>,
    config: ServiceConfig,
}

impl SceneService {
    #[must_use]
    pub fn new(storage: Arc<Storage>, cache: Arc<ResolveCache>, config: ServiceConfig) -> Self {
        Self {
            resolver: DependencyResolver::new(Arc::clone(&storage)),
            storage,
            cache,
            config,
        }
    }

    pub fn create(&self, new: NewScene) -> Result<Scene> {
        validate_slug(&new.slug)?;
        new.pipeline.validate()?;
        self.storage.get_project(new.project_id)?;
        self.validate_pipeline(&new.pipeline, new.project_id)?;
        let edges = derive_edges(&new.pipeline);
        Ok(self.storage.create_scene(&new, &edges)?)
    }

    pub fn get(&self, id: Uuid) -> Result<Scene> {
        Ok(self.storage.get_scene(id)?)
    }

    pub fn list(
        &self,
        project_id: Option<Uuid>,
        sort_by: Option<&str>,
        order: SortOrder,
        page: u32,
        page_size: u32,
    ) -> Result<PaginatedResult<Scene>> {
        let sort = parse_sort_key(sort_by.unwrap_or("created_at"))?;
        if sort == SortKey::CurrentVersion {
            return Err(ServiceError::Validation(
                "scenes cannot be sorted by current_version".to_owned(),
            ));
        }
        let size = if page_size == 0 {
            self.config.default_page_size
        } else {
            page_size.min(self.config.max_page_size)
        };
        Ok(self.storage.list_scenes(project_id, sort, order, Page::new(page, size))?)
    }

    pub fn update(&self, id: Uuid, patch: ScenePatch) -> Result<Scene> {
        if let Some(slug) = &patch.slug {
            validate_slug(slug)?;
        }
        let existing = self.storage.get_scene(id)?;
        let edges = match &patch.pipeline {
            Some(pipeline) => {
                pipeline.validate()?;
                self.validate_pipeline(pipeline, existing.project_id)?;
                Some(derive_edges(pipeline))
            },
            None => None,
        };
        let scene = self.storage.update_scene(id, &patch, edges.as_deref())?;
        self.cache.invalidate_scene(id);
        Ok(scene)
    }

    pub fn delete(&self, id: Uuid) -> Result<()> {
        self.storage.delete_scene(id)?;
        self.cache.invalidate_scene(id);
        Ok(())
    }

    /// The scene's DAG for visualization: one node per visited prompt, an
    /// edge per pipeline step, plus prompt-to-prompt refs inside the plan.
    pub fn dependency_graph(&self, scene_id: Uuid) -> Result<DependencyGraph> {
        let scene = self.storage.get_scene(scene_id)?;
        let plan = self.resolver.plan(&scene)?;

        let nodes = plan
            .ordered
            .iter()
            .filter_map(|node| {
                plan.prompts.get(&node.prompt_id).map(|meta| DependencyNode {
                    id: meta.id,
                    name: meta.name.clone(),
                    project_id: meta.project_id,
                    version: node.version.to_string(),
                    is_shared: meta.is_shared,
                    hidden: node.hidden,
                })
            })
            .collect();

        let mut edges: Vec<DependencyEdge> = scene
            .pipeline
            .steps
            .iter()
            .map(|step| DependencyEdge {
                source: scene.id,
                target: step.prompt_ref.prompt_id,
                step_id: Some(step.id.clone()),
                ref_type: RefType::Composes,
            })
            .collect();

        let plan_ids: Vec<Uuid> = plan.prompts.keys().copied().collect();
        for edge in self.storage.out_edges_of_prompts(&plan_ids)? {
            if let Some(source) = edge.source_prompt_id {
                edges.push(DependencyEdge {
                    source,
                    target: edge.target_prompt_id,
                    step_id: None,
                    ref_type: edge.ref_type,
                });
            }
        }

        Ok(DependencyGraph { nodes, edges })
    }

    /// Prompts must exist, cross-project targets must be shared, and the
    /// reference closure must stay acyclic.
    fn validate_pipeline(&self, pipeline: &Pipeline, project_id: Uuid) -> Result<()> {
        let mut prompt_ids: Vec<Uuid> = Vec::new();
        for step in &pipeline.steps {
            if !prompt_ids.contains(&step.prompt_ref.prompt_id) {
                prompt_ids.push(step.prompt_ref.prompt_id);
            }
        }
        if prompt_ids.is_empty() {
            return Ok(());
        }

        let found = self.storage.get_prompts_by_ids(&prompt_ids)?;
        if found.len() < prompt_ids.len() {
            let known: Vec<Uuid> = found.iter().map(|p| p.id).collect();
            let missing = prompt_ids
                .iter()
                .find(|id| !known.contains(id))
                .copied()
                .unwrap_or_default();
            return Err(ServiceError::NotFound { entity: "prompt", id: missing.to_string() });
        }
        for prompt in &found {
            if prompt.project_id != project_id && !prompt.is_shared {
                return Err(ServiceError::PermissionDenied(format!(
                    "prompt '{}' is not shared and belongs to another project",
                    prompt.name
                )));
            }
        }

        self.resolver.ensure_acyclic(&prompt_ids)
    }
}

/// One `composes` edge per pipeline step, carrying the step's
/// `override_config` and version pin onto the Reference Index.
fn derive_edges(pipeline: &Pipeline) -> Vec<NewRef> {
    pipeline
        .steps
        .iter()
        .map(|step| NewRef {
            source_prompt_id: None,
            source_scene_id: None, // storage stamps the scene id in the save transaction
            source_step_id: Some(step.id.clone()),
            target_prompt_id: step.prompt_ref.prompt_id,
            ref_type: RefType::Composes,
            override_config: step
                .override_config
                .clone()
                .unwrap_or_else(BTreeMap::new),
            pinned_version: step.prompt_ref.version.pinned(),
        })
        .collect()
}
