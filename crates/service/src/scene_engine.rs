//! Scene execution: condition evaluation, variable merge, per-step render,
//! and output merge.
//!
//! Variable precedence per step, lowest to highest: prompt defaults, step
//! static `variables`, ref-level `override_config`, caller variables. The
//! chain strategy's `prior_output` is machine-generated and injected above
//! all of them.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use prompthub_core::{
    estimate_tokens, resolve_fingerprint, CallLogRecord, ConditionOperator, MergeStrategy, Scene,
    StepCondition, PRIOR_OUTPUT_VAR,
};
use prompthub_storage::Storage;

use crate::call_sink::CallLogSink;
use crate::error::{Result, ServiceError};
use crate::renderer;
use crate::resolve_cache::ResolveCache;
use crate::resolver::{DependencyResolver, ScenePlan};
use crate::Caller;

/// Outcome of one pipeline step.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub step_id: String,
    pub prompt_id: Uuid,
    pub prompt_name: String,
    pub version: String,
    pub rendered_content: String,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    pub token_estimate: u64,
}

/// The assembled resolve result returned to callers (and cached).
#[derive(Debug, Clone, Serialize)]
pub struct SceneResolveResult {
    pub scene_id: Uuid,
    pub scene_name: String,
    pub merge_strategy: MergeStrategy,
    pub final_content: String,
    pub steps: Vec<StepResult>,
    pub total_token_estimate: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

pub struct SceneEngine {
    storage: Arc<Storage>,
    resolver: DependencyResolver,
    cache: Arc<ResolveCache>,
    sink: CallLogSink,
    default_ttl: Duration,
    request_timeout: Duration,
}

impl SceneEngine {
    #[must_use]
    pub fn new(
        storage: Arc<Storage>,
        cache: Arc<ResolveCache>,
        sink: CallLogSink,
        default_ttl: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            resolver: DependencyResolver::new(Arc::clone(&storage)),
            storage,
            cache,
            sink,
            default_ttl,
            request_timeout,
        }
    }

    /// Resolves a scene into its final rendered text.
    ///
    /// Plan-level failures (missing prompt/version, cross-project denial,
    /// cycles) abort before any rendering and leave no call log. Render
    /// failures mid-pipeline abort the resolve but are logged as attempted
    /// calls. A deadline hit abandons the computation with no call log.
    pub async fn resolve(
        &self,
        scene_id: Uuid,
        variables: BTreeMap<String, Value>,
        caller: &Caller,
        ttl_override_secs: Option<u64>,
    ) -> Result<SceneResolveResult> {
        let started = Instant::now();
        let deadline = started + self.request_timeout;

        let scene = self.storage.get_scene(scene_id)?;
        let plan = self.resolver.plan(&scene)?;

        let variables_value = Value::Object(
            variables.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        );
        let fingerprint = resolve_fingerprint(
            scene.id,
            &variables_value,
            caller.project_id,
            &plan.version_tuple,
        );
        let prompt_ids: HashSet<Uuid> =
            plan.version_tuple.iter().map(|(id, _)| *id).collect();
        let ttl = ttl_override_secs.map_or(self.default_ttl, Duration::from_secs);

        self.cache
            .get_or_compute(&fingerprint, scene.id, prompt_ids, ttl, || {
                self.execute(&scene, &plan, &variables, &variables_value, caller, deadline, started)
            })
            .await
    }

    #[allow(clippy::too_many_arguments)]
    fn execute(
        &self,
        scene: &Scene,
        plan: &ScenePlan,
        variables: &BTreeMap<String, Value>,
        variables_value: &Value,
        caller: &Caller,
        deadline: Instant,
        started: Instant,
    ) -> Result<SceneResolveResult> {
        let mut steps: Vec<StepResult> = Vec::with_capacity(plan.steps.len());
        let mut scores: Vec<Option<f64>> = Vec::with_capacity(plan.steps.len());
        let mut chain_context: BTreeMap<String, Value> = BTreeMap::new();
        let mut warnings: Vec<String> = Vec::new();

        for planned in &plan.steps {
            if Instant::now() >= deadline {
                return Err(ServiceError::DeadlineExceeded);
            }

            // Merge scope, lowest to highest precedence.
            let mut scope: BTreeMap<String, Value> = BTreeMap::new();
            for decl in &planned.variable_spec {
                if let Some(default) = &decl.default {
                    scope.insert(decl.name.clone(), default.clone());
                }
            }
            for (name, value) in &planned.step.variables {
                scope.insert(name.clone(), value.clone());
            }
            for (name, value) in &planned.ref_override {
                scope.insert(name.clone(), value.clone());
            }
            for (name, value) in variables {
                scope.insert(name.clone(), value.clone());
            }
            for (name, value) in &chain_context {
                scope.insert(name.clone(), value.clone());
            }

            if let Some(condition) = &planned.step.condition {
                if !evaluate_condition(condition, &scope) {
                    steps.push(StepResult {
                        step_id: planned.step.id.clone(),
                        prompt_id: planned.prompt.id,
                        prompt_name: planned.prompt.name.clone(),
                        version: planned.version.to_string(),
                        rendered_content: String::new(),
                        skipped: true,
                        skip_reason: Some("condition false".to_owned()),
                        token_estimate: 0,
                    });
                    scores.push(None);
                    continue;
                }
            }

            // Score markers are static metadata: strip them before the
            // template engine sees them, and again after rendering in case
            // the template produced one.
            let (content, static_score) = extract_score(&planned.content);
            let rendered = renderer::render(
                &content,
                planned.prompt.engine,
                &planned.variable_spec,
                &scope,
            )
            .map_err(|err| {
                self.log_call(scene, variables_value, caller, "", 0, started);
                err
            })?;
            let (rendered, rendered_score) = extract_score(&rendered);

            if scene.merge_strategy == MergeStrategy::Chain {
                chain_context
                    .insert(PRIOR_OUTPUT_VAR.to_owned(), Value::String(rendered.clone()));
                let key = planned
                    .step
                    .output_key
                    .clone()
                    .unwrap_or_else(|| planned.step.id.clone());
                chain_context.insert(key, Value::String(rendered.clone()));
            }

            scores.push(rendered_score.or(static_score));
            steps.push(StepResult {
                step_id: planned.step.id.clone(),
                prompt_id: planned.prompt.id,
                prompt_name: planned.prompt.name.clone(),
                version: planned.version.to_string(),
                token_estimate: estimate_tokens(&rendered),
                rendered_content: rendered,
                skipped: false,
                skip_reason: None,
            });
        }

        let final_content =
            merge_outputs(scene, &steps, &scores, &mut warnings);
        let total_token_estimate = estimate_tokens(&final_content);

        self.log_call(scene, variables_value, caller, &final_content, total_token_estimate, started);

        Ok(SceneResolveResult {
            scene_id: scene.id,
            scene_name: scene.name.clone(),
            merge_strategy: scene.merge_strategy,
            final_content,
            steps,
            total_token_estimate,
            warnings,
        })
    }

    fn log_call(
        &self,
        scene: &Scene,
        variables_value: &Value,
        caller: &Caller,
        final_content: &str,
        token_count: u64,
        started: Instant,
    ) {
        self.sink.record(CallLogRecord {
            id: Uuid::new_v4(),
            prompt_id: None,
            scene_id: Some(scene.id),
            version: None,
            caller_system: Some(caller.system.clone()),
            input_variables: variables_value.clone(),
            rendered_content: final_content.to_owned(),
            token_count,
            response_time_ms: started.elapsed().as_millis() as u64,
            created_at: Utc::now(),
        });
    }
}

fn merge_outputs(
    scene: &Scene,
    steps: &[StepResult],
    scores: &[Option<f64>],
    warnings: &mut Vec<String>,
) -> String {
    let live: Vec<(usize, &StepResult)> =
        steps.iter().enumerate().filter(|(_, s)| !s.skipped).collect();

    match scene.merge_strategy {
        MergeStrategy::Concat => live
            .iter()
            .map(|(_, s)| s.rendered_content.as_str())
            .collect::<Vec<_>>()
            .join(&scene.separator),
        MergeStrategy::Chain => live
            .last()
            .map(|(_, s)| s.rendered_content.clone())
            .unwrap_or_default(),
        MergeStrategy::SelectBest => {
            let mut best: Option<(f64, &StepResult)> = None;
            for (index, step) in &live {
                if let Some(score) = scores.get(*index).copied().flatten() {
                    let better = best.map_or(true, |(current, _)| score > current);
                    if better {
                        best = Some((score, step));
                    }
                }
            }
            match best {
                Some((_, step)) => step.rendered_content.clone(),
                None => {
                    let warning =
                        "select_best: no step emitted a score, falling back to the last output";
                    tracing::warn!(scene_id = %scene.id, "{warning}");
                    warnings.push(warning.to_owned());
                    live.last().map(|(_, s)| s.rendered_content.clone()).unwrap_or_default()
                },
            }
        },
        _ => unreachable!("unknown MergeStrategy variant"),
    }
}

/// `{{!score=0.87}}` metadata markers: extracted and stripped from content.
fn score_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{!score=\s*(-?[0-9]+(?:\.[0-9]+)?)\s*\}\}")
            .expect("score regex is valid")
    })
}

fn extract_score(content: &str) -> (String, Option<f64>) {
    let mut score: Option<f64> = None;
    let cleaned = score_regex().replace_all(content, |captures: &regex::Captures<'_>| {
        if score.is_none() {
            score = captures[1].parse().ok();
        }
        String::new()
    });
    (cleaned.into_owned(), score)
}

/// Evaluates a condition against the step's merged scope. A missing or null
/// variable does not exist; numeric comparisons require two numbers, string
/// comparisons two strings, anything else is false.
pub fn evaluate_condition(condition: &StepCondition, scope: &BTreeMap<String, Value>) -> bool {
    let value = scope.get(&condition.variable);
    let exists = value.is_some_and(|v| !v.is_null());
    let expected = condition.value.as_ref();

    match condition.operator {
        ConditionOperator::Exists => exists,
        ConditionOperator::NotExists => !exists,
        ConditionOperator::Eq => value == expected,
        ConditionOperator::Neq => value != expected,
        ConditionOperator::In => match expected {
            Some(Value::Array(items)) => {
                value.is_some_and(|v| items.contains(v))
            },
            _ => false,
        },
        ConditionOperator::NotIn => match expected {
            Some(Value::Array(items)) => {
                !value.is_some_and(|v| items.contains(v))
            },
            _ => true,
        },
        ConditionOperator::Gt => compare(value, expected).is_some_and(|o| o.is_gt()),
        ConditionOperator::Gte => compare(value, expected).is_some_and(|o| o.is_ge()),
        ConditionOperator::Lt => compare(value, expected).is_some_and(|o| o.is_lt()),
        ConditionOperator::Lte => compare(value, expected).is_some_and(|o| o.is_le()),
        _ => unreachable!("unknown ConditionOperator variant"),
    }
}

fn compare(left: Option<&Value>, right: Option<&Value>) -> Option<std::cmp::Ordering> {
    let left = left?;
    let right = right?;
    if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
        return a.partial_cmp(&b);
    }
    if let (Some(a), Some(b)) = (left.as_str(), right.as_str()) {
        return Some(a.cmp(b));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect()
    }

    fn cond(variable: &str, operator: ConditionOperator, value: Option<Value>) -> StepCondition {
        StepCondition { variable: variable.to_owned(), operator, value }
    }

    #[test]
    fn eq_and_neq() {
        let s = scope(&[("need_img", json!(true))]);
        assert!(evaluate_condition(&cond("need_img", ConditionOperator::Eq, Some(json!(true))), &s));
        assert!(!evaluate_condition(&cond("need_img", ConditionOperator::Eq, Some(json!(false))), &s));
        assert!(evaluate_condition(&cond("need_img", ConditionOperator::Neq, Some(json!(false))), &s));
    }

    #[test]
    fn in_and_not_in() {
        let s = scope(&[("lang", json!("en"))]);
        assert!(evaluate_condition(
            &cond("lang", ConditionOperator::In, Some(json!(["en", "fr"]))),
            &s
        ));
        assert!(!evaluate_condition(
            &cond("lang", ConditionOperator::In, Some(json!(["de"]))),
            &s
        ));
        assert!(evaluate_condition(
            &cond("lang", ConditionOperator::NotIn, Some(json!(["de"]))),
            &s
        ));
        // Non-list operand: `in` is false, `not_in` vacuously true.
        assert!(!evaluate_condition(&cond("lang", ConditionOperator::In, Some(json!("en"))), &s));
        assert!(evaluate_condition(&cond("lang", ConditionOperator::NotIn, Some(json!("en"))), &s));
    }

    #[test]
    fn numeric_comparisons() {
        let s = scope(&[("count", json!(5))]);
        assert!(evaluate_condition(&cond("count", ConditionOperator::Gt, Some(json!(3))), &s));
        assert!(evaluate_condition(&cond("count", ConditionOperator::Gte, Some(json!(5))), &s));
        assert!(evaluate_condition(&cond("count", ConditionOperator::Lt, Some(json!(6))), &s));
        assert!(!evaluate_condition(&cond("count", ConditionOperator::Lte, Some(json!(4))), &s));
        // Mixed types compare as false.
        assert!(!evaluate_condition(&cond("count", ConditionOperator::Gt, Some(json!("3"))), &s));
    }

    #[test]
    fn exists_and_not_exists() {
        let s = scope(&[("present", json!("x")), ("nothing", Value::Null)]);
        assert!(evaluate_condition(&cond("present", ConditionOperator::Exists, None), &s));
        assert!(!evaluate_condition(&cond("absent", ConditionOperator::Exists, None), &s));
        assert!(!evaluate_condition(&cond("nothing", ConditionOperator::Exists, None), &s));
        assert!(evaluate_condition(&cond("absent", ConditionOperator::NotExists, None), &s));
    }

    #[test]
    fn score_extraction_strips_marker() {
        let (content, score) = extract_score("variant A {{!score=0.87}}tail");
        assert_eq!(content, "variant A tail");
        assert_eq!(score, Some(0.87));

        let (content, score) = extract_score("no marker here");
        assert_eq!(content, "no marker here");
        assert_eq!(score, None);
    }
}
