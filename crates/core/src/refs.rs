//! Reference Index edges between prompts and scene steps.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CoreError;
use crate::version::Semver;

/// Relationship carried by a reference edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum RefType {
    Extends,
    Includes,
    Composes,
}

impl RefType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Extends => "extends",
            Self::Includes => "includes",
            Self::Composes => "composes",
        }
    }
}

impl FromStr for RefType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "extends" => Ok(Self::Extends),
            "includes" => Ok(Self::Includes),
            "composes" => Ok(Self::Composes),
            _ => Err(CoreError::InvalidVariant { what: "ref type", value: s.to_owned() }),
        }
    }
}

/// A directed edge `source -> target`. The source is either another prompt
/// (explicit ref) or a scene step (derived from the pipeline on save).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRef {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_prompt_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_scene_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_step_id: Option<String>,
    pub target_prompt_id: Uuid,
    pub ref_type: RefType,
    /// Variables bound into the target at reference time.
    #[serde(default)]
    pub override_config: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned_version: Option<Semver>,
    pub created_at: DateTime<Utc>,
}
