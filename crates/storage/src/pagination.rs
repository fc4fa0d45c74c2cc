//! Pagination and sorting shared across list queries.

use serde::{Deserialize, Serialize};

/// 1-based page request. Callers are expected to have clamped `page_size`
/// to the configured maximum before this reaches storage.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: u32,
    pub page_size: u32,
}

impl Page {
    #[must_use]
    pub const fn new(page: u32, page_size: u32) -> Self {
        Self { page: if page == 0 { 1 } else { page }, page_size }
    }

    #[must_use]
    pub const fn offset(&self) -> u32 {
        (self.page - 1) * self.page_size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub(crate) const fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Allowed sort keys for prompt and scene listings. Mapping to column names
/// here keeps user input out of SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    CreatedAt,
    UpdatedAt,
    Name,
    Slug,
    /// Natural semver order via the zero-padded sort column.
    CurrentVersion,
}

impl SortKey {
    pub(crate) const fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::Name => "name",
            Self::Slug => "slug",
            Self::CurrentVersion => "current_version_sort",
        }
    }
}

/// Generic paginated result.
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}
