//! Scene endpoints, including the core resolve.

use std::sync::Arc;

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use prompthub_core::Scene;
use prompthub_service::{Caller, DependencyGraph, SceneResolveResult};
use prompthub_storage::{NewScene, ScenePatch};

use crate::api_error::ApiError;
use crate::api_types::{CreateSceneRequest, ResolveBody, SceneListQuery, UpdateSceneRequest};
use crate::envelope::Envelope;
use crate::AppState;

pub async fn create_scene(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateSceneRequest>,
) -> Result<(StatusCode, Json<Envelope<Scene>>), ApiError> {
    let scene = state.scenes.create(NewScene {
        project_id: body.project_id,
        name: body.name,
        slug: body.slug,
        description: body.description,
        pipeline: body.pipeline,
        merge_strategy: body.merge_strategy,
        separator: body.separator,
        output_format: body.output_format,
    })?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(scene))))
}

pub async fn list_scenes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SceneListQuery>,
) -> Result<Json<Envelope<Vec<Scene>>>, ApiError> {
    let result = state.scenes.list(
        query.project_id,
        query.sort_by.as_deref(),
        query.order(),
        query.page,
        query.page_size,
    )?;
    Ok(Json(Envelope::paged(result)))
}

pub async fn get_scene(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Scene>>, ApiError> {
    Ok(Json(Envelope::ok(state.scenes.get(id)?)))
}

pub async fn update_scene(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateSceneRequest>,
) -> Result<Json<Envelope<Scene>>, ApiError> {
    let patch = ScenePatch {
        name: body.name,
        slug: body.slug,
        description: body.description,
        pipeline: body.pipeline,
        merge_strategy: body.merge_strategy,
        separator: body.separator,
        output_format: body.output_format,
    };
    Ok(Json(Envelope::ok(state.scenes.update(id, patch)?)))
}

pub async fn delete_scene(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    state.scenes.delete(id)?;
    Ok(Json(Envelope::ok(serde_json::json!({ "deleted": true }))))
}

/// The canonical request: expand a scene into its final rendered text.
pub async fn resolve_scene(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<ResolveBody>,
) -> Result<Json<Envelope<SceneResolveResult>>, ApiError> {
    let result = state
        .engine
        .resolve(id, body.variables, &caller, body.cache_ttl_secs)
        .await?;
    Ok(Json(Envelope::ok(result)))
}

pub async fn scene_dependencies(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<DependencyGraph>>, ApiError> {
    Ok(Json(Envelope::ok(state.scenes.dependency_graph(id)?)))
}
