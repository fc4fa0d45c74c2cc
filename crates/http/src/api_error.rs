//! Typed API error for HTTP handlers.
//!
//! `ServiceError` is mapped exactly once here: business errors surface with
//! their stable wire code, internal errors are logged with a correlation id
//! and return a static message with no detail leakage.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use prompthub_service::ServiceError;

/// Error envelope: `{ code, message, detail? }` with a matching HTTP status.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: u32,
    pub message: String,
    pub detail: Option<String>,
}

impl ApiError {
    pub fn authentication(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: 40100,
            message: "authentication failed".to_owned(),
            detail: Some(detail.into()),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = StatusCode::from_u16(err.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = err.code();
        if err.is_business() {
            Self { status, code, message: summary(&err).to_owned(), detail: Some(err.to_string()) }
        } else {
            let correlation_id = Uuid::new_v4();
            tracing::error!(%correlation_id, error = %err, "internal server error");
            Self {
                status,
                code,
                message: "internal server error".to_owned(),
                detail: Some(format!("correlation id {correlation_id}")),
            }
        }
    }
}

fn summary(err: &ServiceError) -> &'static str {
    match err {
        ServiceError::Authentication(_) => "authentication failed",
        ServiceError::PermissionDenied(_) => "permission denied",
        ServiceError::NotFound { .. } => "not found",
        ServiceError::Conflict(_) => "conflict",
        ServiceError::CircularDependency { .. } => "circular dependency detected",
        ServiceError::Validation(_) => "validation error",
        ServiceError::TemplateRender { .. } => "template render error",
        ServiceError::DeadlineExceeded => "deadline exceeded",
        _ => "internal server error",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({
            "code": self.code,
            "message": self.message,
        });
        if let Some(detail) = self.detail {
            body["detail"] = serde_json::Value::String(detail);
        }
        (self.status, Json(body)).into_response()
    }
}
