//! HTTP API server (axum).
//!
//! All business endpoints live under `/api/v1` behind the bearer-key
//! middleware; `/health` and `/stats` stay open for probes and scrapers.
//! Responses use the `{ code, message, data, meta? }` envelope; failures
//! map through [`api_error::ApiError`] with stable wire codes.

mod api_error;
mod api_types;
mod auth;
mod envelope;
mod handlers;

use std::collections::HashMap;
use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use prompthub_service::{
    Caller, CallLogSink, ProjectService, PromptService, ResolveCache, SceneEngine, SceneService,
};
use prompthub_storage::Storage;

pub use api_error::ApiError;
pub use envelope::{Envelope, PageMeta};

pub struct AppState {
    pub storage: Arc<Storage>,
    pub cache: Arc<ResolveCache>,
    pub sink: CallLogSink,
    pub prompts: PromptService,
    pub scenes: SceneService,
    pub projects: ProjectService,
    pub engine: SceneEngine,
    /// API key -> caller identity, loaded at startup.
    pub api_keys: HashMap<String, Caller>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route(
            "/prompts",
            post(handlers::prompts::create_prompt).get(handlers::prompts::list_prompts),
        )
        .route(
            "/prompts/:id",
            get(handlers::prompts::get_prompt)
                .put(handlers::prompts::update_prompt)
                .delete(handlers::prompts::delete_prompt),
        )
        .route("/prompts/:id/versions", get(handlers::prompts::list_versions))
        .route("/prompts/:id/versions/:version", get(handlers::prompts::get_version))
        .route("/prompts/:id/publish", post(handlers::prompts::publish_prompt))
        .route("/prompts/:id/render", post(handlers::prompts::render_prompt))
        .route("/prompts/:id/share", post(handlers::prompts::share_prompt))
        .route(
            "/scenes",
            post(handlers::scenes::create_scene).get(handlers::scenes::list_scenes),
        )
        .route(
            "/scenes/:id",
            get(handlers::scenes::get_scene)
                .put(handlers::scenes::update_scene)
                .delete(handlers::scenes::delete_scene),
        )
        .route("/scenes/:id/resolve", post(handlers::scenes::resolve_scene))
        .route("/scenes/:id/dependencies", get(handlers::scenes::scene_dependencies))
        .route(
            "/projects",
            post(handlers::projects::create_project).get(handlers::projects::list_projects),
        )
        .route("/projects/:id", get(handlers::projects::get_project))
        .route("/projects/:id/prompts", get(handlers::projects::project_prompts))
        .route("/shared/prompts", get(handlers::shared::list_shared))
        .route("/shared/prompts/:id/fork", post(handlers::shared::fork_shared))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), auth::require_api_key));

    Router::new()
        .route("/health", get(handlers::system::health))
        .route("/stats", get(handlers::system::stats))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Parses `PROMPTHUB_API_KEYS` ("key:system,key2:system2"). Keys without a
/// system name get "unknown".
#[must_use]
pub fn parse_api_keys(raw: &str) -> HashMap<String, Caller> {
    raw.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            let (key, system) = entry.split_once(':').unwrap_or((entry, "unknown"));
            Some((
                key.to_owned(),
                Caller { system: system.to_owned(), project_id: None },
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::parse_api_keys;

    #[test]
    fn parses_key_system_pairs() {
        let keys = parse_api_keys("abc:audio, def:video ,bare");
        assert_eq!(keys.len(), 3);
        assert_eq!(keys["abc"].system, "audio");
        assert_eq!(keys["def"].system, "video");
        assert_eq!(keys["bare"].system, "unknown");
    }

    #[test]
    fn empty_input_yields_no_keys() {
        assert!(parse_api_keys("").is_empty());
        assert!(parse_api_keys(" , ").is_empty());
    }
}
