use thiserror::Error;

/// Errors raised by domain-type parsing and validation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// A string did not parse as a `MAJOR.MINOR.PATCH` version.
    #[error("invalid version '{0}': expected MAJOR.MINOR.PATCH")]
    InvalidVersion(String),

    /// A string did not match a known enum variant.
    #[error("invalid {what}: '{value}'")]
    InvalidVariant { what: &'static str, value: String },

    /// A slug is empty or contains characters outside `[a-z0-9_-]`.
    #[error("invalid slug '{0}': must be non-empty, lowercase, URL-safe")]
    InvalidSlug(String),

    /// A variable declaration list failed validation.
    #[error("invalid variable spec: {0}")]
    InvalidVariableSpec(String),
}

/// Result alias for domain operations.
pub type Result<T> = std::result::Result<T, CoreError>;
