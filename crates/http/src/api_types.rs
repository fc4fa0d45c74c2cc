//! Request bodies and query types (Deserialize).

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use prompthub_core::{
    BumpKind, MergeStrategy, Pipeline, PromptFormat, TemplateEngineKind, VariableDecl,
};
use prompthub_storage::SortOrder;

fn default_format() -> PromptFormat {
    PromptFormat::Text
}

fn default_engine() -> TemplateEngineKind {
    TemplateEngineKind::Jinja2
}

fn default_separator() -> String {
    "\n\n".to_owned()
}

fn default_merge_strategy() -> MergeStrategy {
    MergeStrategy::Concat
}

const fn default_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct CreatePromptRequest {
    pub project_id: Uuid,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    pub content: String,
    #[serde(default = "default_format")]
    pub format: PromptFormat,
    #[serde(default = "default_engine")]
    pub template_engine: TemplateEngineKind,
    #[serde(default)]
    pub variable_spec: Vec<VariableDecl>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub is_shared: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePromptRequest {
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

#[derive(Debug, Default, Deserialize)]
pub struct PublishBody {
    pub bump: Option<BumpKind>,
    pub content: Option<String>,
    pub variable_spec: Option<Vec<VariableDecl>>,
    pub changelog: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RenderBody {
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSceneRequest {
    pub project_id: Uuid,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    pub pipeline: Pipeline,
    #[serde(default = "default_merge_strategy")]
    pub merge_strategy: MergeStrategy,
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default)]
    pub output_format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSceneRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub pipeline: Option<Pipeline>,
    pub merge_strategy: Option<MergeStrategy>,
    pub separator: Option<String>,
    pub output_format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolveBody {
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    /// Per-call cache TTL override, seconds.
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForkBody {
    pub target_project_id: Uuid,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub order: Option<SortOrder>,
}

impl PaginationQuery {
    pub fn order(&self) -> SortOrder {
        self.order.unwrap_or(SortOrder::Desc)
    }
}

#[derive(Debug, Deserialize)]
pub struct PromptListQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub order: Option<SortOrder>,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub slug: Option<String>,
    /// Comma-separated tag list; overlap match.
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub is_shared: Option<bool>,
    #[serde(default)]
    pub search: Option<String>,
}

impl PromptListQuery {
    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn order(&self) -> SortOrder {
        self.order.unwrap_or(SortOrder::Desc)
    }
}

#[derive(Debug, Deserialize)]
pub struct SceneListQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub order: Option<SortOrder>,
    #[serde(default)]
    pub project_id: Option<Uuid>,
}

impl SceneListQuery {
    pub fn order(&self) -> SortOrder {
        self.order.unwrap_or(SortOrder::Desc)
    }
}
