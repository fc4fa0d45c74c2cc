//! Project identity. The core only needs projects to exist and to scope
//! prompt and scene slugs.

use std::sync::Arc;

use uuid::Uuid;

use prompthub_core::{validate_slug, Project, Prompt};
use prompthub_storage::{
    NewProject, Page, PaginatedResult, PromptFilter, SortKey, SortOrder, Storage,
};

use crate::error::Result;
use crate::ServiceConfig;

pub struct ProjectService {
    storage: Arc<Storage>,
    config: ServiceConfig,
}

impl ProjectService {
    #[must_use]
    pub const fn new(storage: Arc<Storage>, config: ServiceConfig) -> Self {
        Self { storage, config }
    }

    pub fn create(&self, new: NewProject) -> Result<Project> {
        validate_slug(&new.slug)?;
        Ok(self.storage.create_project(&new)?)
    }

    pub fn get(&self, id: Uuid) -> Result<Project> {
        Ok(self.storage.get_project(id)?)
    }

    pub fn list(&self, page: u32, page_size: u32) -> Result<PaginatedResult<Project>> {
        let size = if page_size == 0 {
            self.config.default_page_size
        } else {
            page_size.min(self.config.max_page_size)
        };
        Ok(self.storage.list_projects(Page::new(page, size))?)
    }

    /// Prompts owned by a project, newest first.
    pub fn prompts_in_project(
        &self,
        project_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> Result<PaginatedResult<Prompt>> {
        self.storage.get_project(project_id)?;
        let size = if page_size == 0 {
            self.config.default_page_size
        } else {
            page_size.min(self.config.max_page_size)
        };
        let filter = PromptFilter { project_id: Some(project_id), ..PromptFilter::default() };
        Ok(self.storage.list_prompts(
            &filter,
            SortKey::CreatedAt,
            SortOrder::Desc,
            Page::new(page, size),
        )?)
    }
}
