//! Project endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use prompthub_core::{Project, Prompt};
use prompthub_storage::NewProject;

use crate::api_error::ApiError;
use crate::api_types::{CreateProjectRequest, PaginationQuery};
use crate::envelope::Envelope;
use crate::AppState;

pub async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Envelope<Project>>), ApiError> {
    let project = state.projects.create(NewProject {
        name: body.name,
        slug: body.slug,
        description: body.description,
    })?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(project))))
}

pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<Envelope<Vec<Project>>>, ApiError> {
    Ok(Json(Envelope::paged(state.projects.list(query.page, query.page_size)?)))
}

pub async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Project>>, ApiError> {
    Ok(Json(Envelope::ok(state.projects.get(id)?)))
}

pub async fn project_prompts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<Envelope<Vec<Prompt>>>, ApiError> {
    Ok(Json(Envelope::paged(state.projects.prompts_in_project(
        id,
        query.page,
        query.page_size,
    )?)))
}
