//! Domain types for PromptHub, a centralized management plane for versioned,
//! composable LLM prompts.
//!
//! This crate is pure data: artifacts (projects, prompts, versions, scenes,
//! reference edges, call logs), strict semver handling, variable declaration
//! validation, and the canonical resolve fingerprint. Persistence lives in
//! `prompthub-storage`; the composition engine in `prompthub-service`.

mod call_log;
mod error;
mod fingerprint;
mod project;
mod prompt;
mod refs;
mod scene;
mod version;

pub use call_log::{estimate_tokens, CallLogRecord};
pub use error::{CoreError, Result};
pub use fingerprint::{canonical_json, resolve_fingerprint};
pub use project::Project;
pub use prompt::{
    validate_slug, validate_variable_spec, Prompt, PromptFormat, TemplateEngineKind, VariableDecl,
    VariableType,
};
pub use refs::{PromptRef, RefType};
pub use scene::{
    ConditionOperator, MergeStrategy, Pipeline, Scene, Step, StepCondition, StepPromptRef,
    VersionReq, PRIOR_OUTPUT_VAR,
};
pub use version::{BumpKind, PromptVersion, Semver, VersionStatus};
