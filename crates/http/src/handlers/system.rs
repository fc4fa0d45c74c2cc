//! Liveness and observability endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use prompthub_storage::StorageStats;

use crate::api_error::ApiError;
use crate::envelope::Envelope;
use crate::AppState;

pub async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub storage: StorageStats,
    pub cache_entries: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub call_logs_dropped: u64,
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Envelope<StatsResponse>>, ApiError> {
    let storage = state.storage.stats().map_err(prompthub_service::ServiceError::from)?;
    Ok(Json(Envelope::ok(StatsResponse {
        storage,
        cache_entries: state.cache.len(),
        cache_hits: state.cache.hits(),
        cache_misses: state.cache.misses(),
        call_logs_dropped: state.sink.dropped_count(),
    })))
}
