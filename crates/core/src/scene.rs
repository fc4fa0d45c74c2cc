//! Scenes: ordered pipelines of prompt steps yielding one rendered text.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CoreError;
use crate::version::Semver;

/// Variable name the chain strategy injects with the previous step's output.
pub const PRIOR_OUTPUT_VAR: &str = "prior_output";

/// How a scene combines its rendered step outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum MergeStrategy {
    /// Join outputs with the scene separator, in pipeline order.
    Concat,
    /// Feed each output into the next step as `prior_output`.
    Chain,
    /// Pick the output with the highest embedded score.
    SelectBest,
}

impl MergeStrategy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Concat => "concat",
            Self::Chain => "chain",
            Self::SelectBest => "select_best",
        }
    }
}

impl FromStr for MergeStrategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "concat" => Ok(Self::Concat),
            "chain" => Ok(Self::Chain),
            "select_best" => Ok(Self::SelectBest),
            _ => Err(CoreError::InvalidVariant { what: "merge strategy", value: s.to_owned() }),
        }
    }
}

/// Version requirement of a step's prompt reference: a concrete pin or the
/// live `latest` binding. Serialized as `"1.2.3"` or `null`/`"latest"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionReq {
    #[default]
    Latest,
    Exact(Semver),
}

impl VersionReq {
    #[must_use]
    pub const fn pinned(&self) -> Option<Semver> {
        match *self {
            Self::Latest => None,
            Self::Exact(v) => Some(v),
        }
    }
}

impl Serialize for VersionReq {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Latest => serializer.serialize_none(),
            Self::Exact(v) => serializer.collect_str(v),
        }
    }
}

impl<'de> Deserialize<'de> for VersionReq {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref() {
            None | Some("latest") => Ok(Self::Latest),
            Some(s) => s.parse().map(Self::Exact).map_err(serde::de::Error::custom),
        }
    }
}

/// A step's pointer at a prompt, optionally version-pinned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepPromptRef {
    pub prompt_id: Uuid,
    #[serde(default)]
    pub version: VersionReq,
}

/// Comparison operator of a step condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ConditionOperator {
    Eq,
    Neq,
    In,
    NotIn,
    Gt,
    Gte,
    Lt,
    Lte,
    Exists,
    NotExists,
}

/// A three-term predicate over the step's merged variable scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCondition {
    pub variable: String,
    pub operator: ConditionOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// One pipeline step. `variables` are the step-level static overrides;
/// `override_config` is persisted onto the derived reference edge and merged
/// at the ref-override precedence layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub prompt_ref: StepPromptRef,
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<StepCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_config: Option<BTreeMap<String, Value>>,
    /// Name the chain strategy stores this step's output under; defaults to
    /// the step id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
}

/// The ordered step list persisted as a scene's pipeline JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pipeline {
    pub steps: Vec<Step>,
}

impl Pipeline {
    /// Step ids must be unique within a scene.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut seen = std::collections::BTreeSet::new();
        for step in &self.steps {
            if step.id.is_empty() {
                return Err(CoreError::InvalidVariableSpec("step id is empty".to_owned()));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(CoreError::InvalidVariableSpec(format!(
                    "duplicate step id '{}'",
                    step.id
                )));
            }
        }
        Ok(())
    }
}

/// A named pipeline with merge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    /// Unique within the project.
    pub slug: String,
    pub description: Option<String>,
    pub pipeline: Pipeline,
    pub merge_strategy: MergeStrategy,
    pub separator: String,
    pub output_format: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn version_req_accepts_null_latest_and_pins() {
        let latest: VersionReq = serde_json::from_value(json!(null)).unwrap();
        assert_eq!(latest, VersionReq::Latest);
        let word: VersionReq = serde_json::from_value(json!("latest")).unwrap();
        assert_eq!(word, VersionReq::Latest);
        let pinned: VersionReq = serde_json::from_value(json!("1.0.0")).unwrap();
        assert_eq!(pinned.pinned().unwrap().to_string(), "1.0.0");
        assert!(serde_json::from_value::<VersionReq>(json!("not-a-version")).is_err());
    }

    #[test]
    fn pipeline_rejects_duplicate_step_ids() {
        let step = |id: &str| Step {
            id: id.to_owned(),
            prompt_ref: StepPromptRef { prompt_id: Uuid::new_v4(), version: VersionReq::Latest },
            variables: BTreeMap::new(),
            condition: None,
            override_config: None,
            output_key: None,
        };
        let pipeline = Pipeline { steps: vec![step("a"), step("a")] };
        assert!(pipeline.validate().is_err());
        let pipeline = Pipeline { steps: vec![step("a"), step("b")] };
        assert!(pipeline.validate().is_ok());
    }

    #[test]
    fn pipeline_json_shape() {
        let raw = json!({
            "steps": [{
                "id": "s1",
                "prompt_ref": { "prompt_id": Uuid::new_v4(), "version": null },
                "variables": { "tone": "warm" },
                "condition": { "variable": "need_img", "operator": "eq", "value": true }
            }]
        });
        let pipeline: Pipeline = serde_json::from_value(raw).unwrap();
        assert_eq!(pipeline.steps.len(), 1);
        assert_eq!(pipeline.steps[0].variables["tone"], json!("warm"));
        assert!(pipeline.steps[0].condition.is_some());
    }
}
