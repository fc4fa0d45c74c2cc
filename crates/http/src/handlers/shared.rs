//! Shared prompt repository: browse and fork.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use prompthub_core::Prompt;
use prompthub_storage::PromptFilter;

use crate::api_error::ApiError;
use crate::api_types::{ForkBody, PromptListQuery};
use crate::envelope::Envelope;
use crate::AppState;

pub async fn list_shared(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PromptListQuery>,
) -> Result<Json<Envelope<Vec<Prompt>>>, ApiError> {
    let filter = PromptFilter {
        project_id: query.project_id,
        slug: query.slug.clone(),
        tags: query.tag_list(),
        category: query.category.clone(),
        is_shared: Some(true),
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

pub async fn fork_shared(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ForkBody>,
) -> Result<(StatusCode, Json<Envelope<Prompt>>), ApiError> {
    let forked = state.prompts.fork(id, body.target_project_id, body.slug)?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(forked))))
}
