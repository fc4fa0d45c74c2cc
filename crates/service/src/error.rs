//! Typed error enum for the service layer.
//!
//! Every business failure carries a stable wire code; the HTTP crate maps
//! these once at the boundary. Internal layers raise the typed error
//! directly and never log-and-swallow.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use prompthub_storage::StorageError;

/// Renderer failure classification, surfaced in error details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderErrorKind {
    UndefinedVariable,
    TypeMismatch,
    EnumViolation,
    SyntaxError,
    SandboxViolation,
    MissingRequired,
}

impl RenderErrorKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::UndefinedVariable => "undefined_variable",
            Self::TypeMismatch => "type_mismatch",
            Self::EnumViolation => "enum_violation",
            Self::SyntaxError => "syntax_error",
            Self::SandboxViolation => "sandbox_violation",
            Self::MissingRequired => "missing_required",
        }
    }
}

impl fmt::Display for RenderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn cycle_path(path: &[Uuid]) -> String {
    path.iter().map(Uuid::to_string).collect::<Vec<_>>().join(" -> ")
}

/// Service-layer error with a stable numeric wire code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceError {
    /// Missing or unknown API key.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Cross-project reference to a non-shared prompt.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {entity} '{id}'")]
    NotFound { entity: &'static str, id: String },

    /// Duplicate slug or version.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Cycle detected in the reference graph.
    #[error("circular dependency: {}", cycle_path(.path))]
    CircularDependency { path: Vec<Uuid> },

    /// Bad request body, variable spec, or query parameter.
    #[error("validation error: {0}")]
    Validation(String),

    /// Any renderer failure.
    #[error("template render error ({kind}): {detail}")]
    TemplateRender { kind: RenderErrorKind, detail: String },

    /// The request deadline passed mid-resolve.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Storage failure that is not a not-found/conflict condition.
    #[error("storage: {0}")]
    Storage(#[source] StorageError),

    /// Unexpected failure; logged with a correlation id at the boundary.
    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Stable wire code; the numeric values are the API contract.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match *self {
            Self::Authentication(_) => 40100,
            Self::PermissionDenied(_) => 40300,
            Self::NotFound { .. } => 40400,
            Self::Conflict(_) => 40900,
            Self::CircularDependency { .. } => 40901,
            Self::Validation(_) => 42200,
            Self::TemplateRender { .. } => 42201,
            Self::DeadlineExceeded => 50400,
            Self::Storage(_) | Self::Internal(_) => 50000,
        }
    }

    /// HTTP status the wire code maps onto.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match *self {
            Self::Authentication(_) => 401,
            Self::PermissionDenied(_) => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict(_) | Self::CircularDependency { .. } => 409,
            Self::Validation(_) | Self::TemplateRender { .. } => 422,
            Self::DeadlineExceeded => 504,
            Self::Storage(_) | Self::Internal(_) => 500,
        }
    }

    /// Whether the error is an expected business outcome (as opposed to an
    /// internal failure that warrants a correlation id).
    #[must_use]
    pub const fn is_business(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::Internal(_))
    }
}

/// Not-found and duplicate conditions become their business variants at the
/// conversion boundary; everything else stays an internal storage failure.
impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, id } => Self::NotFound { entity, id },
            StorageError::Duplicate(msg) => Self::Conflict(msg),
            other => Self::Storage(other),
        }
    }
}

impl From<prompthub_core::CoreError> for ServiceError {
    fn from(err: prompthub_core::CoreError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Result alias for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
