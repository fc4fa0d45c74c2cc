//! Response envelope: `{ code, message, data, meta? }` on success.

use serde::Serialize;

use prompthub_storage::PaginatedResult;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PageMeta {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub code: u32,
    pub message: &'static str,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self { code: 0, message: "success", data, meta: None }
    }
}

impl<T: Serialize> Envelope<Vec<T>> {
    pub fn paged(result: PaginatedResult<T>) -> Self {
        Self {
            code: 0,
            message: "success",
            data: result.items,
            meta: Some(PageMeta {
                page: result.page,
                page_size: result.page_size,
                total: result.total,
            }),
        }
    }
}
