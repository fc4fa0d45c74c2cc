//! Bearer-token authentication middleware.
//!
//! Maps `Authorization: Bearer <api_key>` to a [`Caller`] identity injected
//! as a request extension. Missing or unknown keys answer with wire code
//! 40100 before any handler runs.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api_error::ApiError;
use crate::AppState;

pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let bearer = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match bearer.and_then(|key| state.api_keys.get(key)) {
        Some(caller) => {
            request.extensions_mut().insert(caller.clone());
            next.run(request).await
        },
        None => ApiError::authentication("missing or unknown API key").into_response(),
    }
}
