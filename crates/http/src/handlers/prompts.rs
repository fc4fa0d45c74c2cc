//! Prompt endpoints.

use std::sync::Arc;

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use prompthub_core::{Prompt, PromptVersion};
use prompthub_service::{Caller, PublishRequest, RenderOutput};
use prompthub_storage::{NewPrompt, PromptFilter, PromptPatch};

use crate::api_error::ApiError;
use crate::api_types::{
    CreatePromptRequest, PromptListQuery, PublishBody, RenderBody, UpdatePromptRequest,
};
use crate::envelope::Envelope;
use crate::AppState;

pub async fn create_prompt(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreatePromptRequest>,
) -> Result<(StatusCode, Json<Envelope<Prompt>>), ApiError> {
    let prompt = state.prompts.create(NewPrompt {
        project_id: body.project_id,
        name: body.name,
        slug: body.slug,
        description: body.description,
        content: body.content,
        format: body.format,
        template_engine: body.template_engine,
        variable_spec: body.variable_spec,
        tags: body.tags,
        category: body.category,
        is_shared: body.is_shared,
    })?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(prompt))))
}

pub async fn list_prompts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PromptListQuery>,
) -> Result<Json<Envelope<Vec<Prompt>>>, ApiError> {
    let filter = PromptFilter {
        project_id: query.project_id,
        slug: query.slug.clone(),
        tags: query.tag_list(),
        category: query.category.clone(),
        is_shared: query.is_shared,
        search: query.search.clone(),
    };
    let result = state.prompts.list(
        &filter,
        query.sort_by.as_deref(),
        query.order(),
        query.page,
        query.page_size,
    )?;
    Ok(Json(Envelope::paged(result)))
}

pub async fn get_prompt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Prompt>>, ApiError> {
    Ok(Json(Envelope::ok(state.prompts.get(id)?)))
}

pub async fn update_prompt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdatePromptRequest>,
) -> Result<Json<Envelope<Prompt>>, ApiError> {
    let patch = PromptPatch {
        name: body.name,
        slug: body.slug,
        description: body.description,
        format: body.format,
        template_engine: body.template_engine,
        variable_spec: body.variable_spec,
        tags: body.tags,
        category: body.category,
        is_shared: body.is_shared,
    };
    Ok(Json(Envelope::ok(state.prompts.update(id, patch)?)))
}

pub async fn delete_prompt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    state.prompts.delete(id)?;
    Ok(Json(Envelope::ok(serde_json::json!({ "deleted": true }))))
}

pub async fn list_versions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Vec<PromptVersion>>>, ApiError> {
    Ok(Json(Envelope::ok(state.prompts.list_versions(id)?)))
}

pub async fn get_version(
    State(state): State<Arc<AppState>>,
    Path((id, version)): Path<(Uuid, String)>,
) -> Result<Json<Envelope<PromptVersion>>, ApiError> {
    Ok(Json(Envelope::ok(state.prompts.get_version(id, &version)?)))
}

pub async fn publish_prompt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<PublishBody>,
) -> Result<(StatusCode, Json<Envelope<PromptVersion>>), ApiError> {
    let version = state.prompts.publish(
        id,
        PublishRequest {
            bump: body.bump,
            content: body.content,
            variable_spec: body.variable_spec,
            changelog: body.changelog,
        },
    )?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(version))))
}

pub async fn render_prompt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<RenderBody>,
) -> Result<Json<Envelope<RenderOutput>>, ApiError> {
    Ok(Json(Envelope::ok(state.prompts.render(id, body.variables, &caller)?)))
}

pub async fn share_prompt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Prompt>>, ApiError> {
    Ok(Json(Envelope::ok(state.prompts.share(id)?)))
}
