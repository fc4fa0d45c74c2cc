//! The PromptHub scene composition engine and its supporting services.
//!
//! Request flow for `resolve(scene, variables)`: scene engine → resolve
//! cache lookup → on miss: dependency resolver → (prompt store + reference
//! index) → template renderer per step → merge → call log sink (async) →
//! cache store → response.

mod call_sink;
mod error;
mod project_service;
mod prompt_service;
mod renderer;
mod resolve_cache;
mod resolver;
mod scene_engine;
mod scene_service;

use uuid::Uuid;

pub use call_sink::CallLogSink;
pub use error::{RenderErrorKind, Result, ServiceError};
pub use project_service::ProjectService;
pub use prompt_service::{PromptService, PublishRequest, RenderOutput};
pub use renderer::{render, validate_variables};
pub use resolve_cache::ResolveCache;
pub use resolver::{DependencyResolver, PlanNode, PlannedStep, PromptMeta, ScenePlan};
pub use scene_engine::{evaluate_condition, SceneEngine, SceneResolveResult, StepResult};
pub use scene_service::{DependencyEdge, DependencyGraph, DependencyNode, SceneService};

/// Authenticated caller identity produced by the API-key middleware.
#[derive(Debug, Clone)]
pub struct Caller {
    /// Caller system name attached to call logs.
    pub system: String,
    /// Project scope for cross-project cache keying, when known.
    pub project_id: Option<Uuid>,
}

/// Knobs shared by the services; built from the environment by the binary.
#[derive(Debug, Clone, Copy)]
pub struct ServiceConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub cache_ttl_secs: u64,
    pub request_timeout_secs: u64,
    pub call_log_capacity: usize,
    pub call_log_max_content: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
            cache_ttl_secs: 300,
            request_timeout_secs: 30,
            call_log_capacity: 1024,
            call_log_max_content: 4096,
        }
    }
}

impl ServiceConfig {
    /// Reads the `PROMPTHUB_*` environment knobs. Unset knobs fall back to
    /// their defaults silently; set-but-unparseable values fall back with a
    /// warning, and knob combinations that would break list pagination or
    /// the call-log queue are repaired before the config is handed out.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_page_size: knob("DEFAULT_PAGE_SIZE", defaults.default_page_size),
            max_page_size: knob("MAX_PAGE_SIZE", defaults.max_page_size),
            cache_ttl_secs: knob("CACHE_TTL_SECS", defaults.cache_ttl_secs),
            request_timeout_secs: knob("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            call_log_capacity: knob("CALL_LOG_CAPACITY", defaults.call_log_capacity),
            call_log_max_content: knob("CALL_LOG_MAX_CONTENT", defaults.call_log_max_content),
        }
        .sanitized()
    }

    /// Cross-knob repairs. A zero page size would make every list endpoint
    /// return nothing, a page cap below the default would make the default
    /// unreachable, and a zero-capacity sink would drop every call log.
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.default_page_size == 0 {
            tracing::warn!(
                fallback = defaults.default_page_size,
                "PROMPTHUB_DEFAULT_PAGE_SIZE must be positive"
            );
            self.default_page_size = defaults.default_page_size;
        }
        if self.max_page_size < self.default_page_size {
            tracing::warn!(
                raised_to = self.default_page_size,
                "PROMPTHUB_MAX_PAGE_SIZE is below the default page size"
            );
            self.max_page_size = self.default_page_size;
        }
        if self.request_timeout_secs == 0 {
            tracing::warn!(
                fallback = defaults.request_timeout_secs,
                "PROMPTHUB_REQUEST_TIMEOUT_SECS of zero would abandon every resolve"
            );
            self.request_timeout_secs = defaults.request_timeout_secs;
        }
        if self.call_log_capacity == 0 {
            tracing::warn!(
                fallback = defaults.call_log_capacity,
                "PROMPTHUB_CALL_LOG_CAPACITY must be positive"
            );
            self.call_log_capacity = defaults.call_log_capacity;
        }
        self
    }
}

/// One `PROMPTHUB_<suffix>` knob. Values are trimmed before parsing so
/// `PROMPTHUB_CACHE_TTL_SECS="300 "` from a compose file still works.
fn knob<T: std::str::FromStr + std::fmt::Display>(suffix: &str, default: T) -> T {
    let var = format!("PROMPTHUB_{suffix}");
    match std::env::var(&var) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(%var, raw = %raw, fallback = %default, "unparseable knob");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod config_tests {
    use super::{knob, ServiceConfig};

    #[test]
    fn knob_parses_and_trims() {
        std::env::set_var("PROMPTHUB_TEST_KNOB_TRIM_71301", " 42 ");
        let parsed: u32 = knob("TEST_KNOB_TRIM_71301", 7);
        assert_eq!(parsed, 42);
        std::env::remove_var("PROMPTHUB_TEST_KNOB_TRIM_71301");
    }

    #[test]
    fn knob_falls_back_on_garbage_and_absence() {
        std::env::set_var("PROMPTHUB_TEST_KNOB_BAD_71302", "banana");
        let parsed: u32 = knob("TEST_KNOB_BAD_71302", 7);
        assert_eq!(parsed, 7);
        std::env::remove_var("PROMPTHUB_TEST_KNOB_BAD_71302");

        let parsed: u32 = knob("TEST_KNOB_MISSING_71303", 7);
        assert_eq!(parsed, 7);
    }

    #[test]
    fn sanitized_repairs_broken_pagination() {
        let config = ServiceConfig {
            default_page_size: 0,
            max_page_size: 5,
            ..ServiceConfig::default()
        }
        .sanitized();
        assert_eq!(config.default_page_size, ServiceConfig::default().default_page_size);
        assert_eq!(config.max_page_size, config.default_page_size);
    }

    #[test]
    fn sanitized_repairs_zero_timeout_and_capacity() {
        let config = ServiceConfig {
            request_timeout_secs: 0,
            call_log_capacity: 0,
            ..ServiceConfig::default()
        }
        .sanitized();
        assert_eq!(config.request_timeout_secs, ServiceConfig::default().request_timeout_secs);
        assert_eq!(config.call_log_capacity, ServiceConfig::default().call_log_capacity);
    }

    #[test]
    fn sanitized_keeps_valid_configs_untouched() {
        let config = ServiceConfig::default().sanitized();
        let defaults = ServiceConfig::default();
        assert_eq!(config.max_page_size, defaults.max_page_size);
        assert_eq!(config.cache_ttl_secs, defaults.cache_ttl_secs);
    }
}
