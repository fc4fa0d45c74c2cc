//! Dependency resolution: expands a scene into a topologically ordered plan
//! of concrete versions.
//!
//! The resolver is pure with respect to store state: given the same
//! prompt/version/ref rows and the same scene, it returns the same plan.
//! Prompt reads are batched, one query per expansion level, so a resolution
//! touches the store a bounded number of times.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use prompthub_core::{
    Prompt, Scene, Semver, Step, TemplateEngineKind, VariableDecl, VersionReq,
};
use prompthub_storage::Storage;

use crate::error::{Result, ServiceError};

/// Prompt fields the engine needs per step.
#[derive(Debug, Clone)]
pub struct PromptMeta {
    pub id: Uuid,
    pub name: String,
    pub project_id: Uuid,
    pub engine: TemplateEngineKind,
    pub is_shared: bool,
}

impl From<&Prompt> for PromptMeta {
    fn from(prompt: &Prompt) -> Self {
        Self {
            id: prompt.id,
            name: prompt.name.clone(),
            project_id: prompt.project_id,
            engine: prompt.template_engine,
            is_shared: prompt.is_shared,
        }
    }
}

/// One pipeline step annotated with the concrete version it will render.
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub pipeline_index: usize,
    pub step: Step,
    pub prompt: PromptMeta,
    pub version: Semver,
    pub content: String,
    pub variable_spec: Vec<VariableDecl>,
    /// Variables bound on the reference edge targeting this prompt.
    pub ref_override: BTreeMap<String, Value>,
}

/// A node the resolver visited, in topological order (dependencies first).
#[derive(Debug, Clone)]
pub struct PlanNode {
    pub prompt_id: Uuid,
    pub version: Semver,
    /// True for prerequisite nodes pulled in through the Reference Index
    /// that are not themselves pipeline steps.
    pub hidden: bool,
}

/// The resolver's output for one scene.
#[derive(Debug, Clone)]
pub struct ScenePlan {
    /// All visited nodes, dependencies first. Ties in readiness break by
    /// first pipeline step index, then prompt id.
    pub ordered: Vec<PlanNode>,
    /// Pipeline steps in pipeline order with concrete versions.
    pub steps: Vec<PlannedStep>,
    /// Every `(prompt_id, concrete_version)` visited; the cache fingerprint
    /// input that makes `latest` coherent across publishes.
    pub version_tuple: Vec<(Uuid, Semver)>,
    /// Metadata for every visited prompt, keyed by id.
    pub prompts: BTreeMap<Uuid, PromptMeta>,
}

pub struct DependencyResolver {
    storage: Arc<Storage>,
}

impl DependencyResolver {
    #[must_use]
    pub const fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Builds the plan for a scene. Fails with `NotFound` for missing
    /// prompts/versions, `PermissionDenied` for cross-project references to
    /// non-shared prompts (before any rendering), and
    /// `CircularDependency` when the reference closure contains a cycle.
    pub fn plan(&self, scene: &Scene) -> Result<ScenePlan> {
        let steps = &scene.pipeline.steps;

        // Seed the work queue with the pipeline steps.
        let mut step_prompt_ids: Vec<Uuid> = Vec::new();
        for step in steps {
            if !step_prompt_ids.contains(&step.prompt_ref.prompt_id) {
                step_prompt_ids.push(step.prompt_ref.prompt_id);
            }
        }

        let mut prompts: BTreeMap<Uuid, Prompt> = BTreeMap::new();
        self.load_prompts(&step_prompt_ids, &mut prompts)?;

        for prompt in prompts.values() {
            check_cross_project(prompt, scene.project_id)?;
        }

        // Edge-level data derived from this scene's pipeline on save.
        let mut step_edges: BTreeMap<String, (BTreeMap<String, Value>, Option<Semver>)> =
            BTreeMap::new();
        for edge in self.storage.scene_edges(scene.id)? {
            if let Some(step_id) = edge.source_step_id.clone() {
                step_edges.insert(step_id, (edge.override_config, edge.pinned_version));
            }
        }

        // Expand the reference closure; prerequisite nodes are hidden.
        let mut graph: BTreeMap<Uuid, BTreeSet<Uuid>> = BTreeMap::new();
        let mut hidden_versions: BTreeMap<Uuid, Semver> = BTreeMap::new();
        let mut frontier: Vec<Uuid> = step_prompt_ids.clone();
        let mut expanded: BTreeSet<Uuid> = BTreeSet::new();
        while !frontier.is_empty() {
            let batch: Vec<Uuid> =
                frontier.drain(..).filter(|id| expanded.insert(*id)).collect();
            if batch.is_empty() {
                break;
            }
            let edges = self.storage.out_edges_of_prompts(&batch)?;
            let mut discovered: Vec<Uuid> = Vec::new();
            for edge in edges {
                let source = match edge.source_prompt_id {
                    Some(id) => id,
                    None => continue,
                };
                let target = edge.target_prompt_id;
                graph.entry(source).or_default().insert(target);
                graph.entry(target).or_default();
                if !prompts.contains_key(&target) && !discovered.contains(&target) {
                    discovered.push(target);
                }
                if !step_prompt_ids.contains(&target) {
                    // A pinned edge wins over the live current_version;
                    // resolved below once the target prompt is loaded.
                    if let Some(pin) = edge.pinned_version {
                        hidden_versions.insert(target, pin);
                    }
                }
            }
            if !discovered.is_empty() {
                self.load_prompts(&discovered, &mut prompts)?;
                for id in &discovered {
                    if let Some(prompt) = prompts.get(id) {
                        check_cross_project(prompt, scene.project_id)?;
                    }
                }
                frontier.extend(discovered);
            }
        }
        for id in &step_prompt_ids {
            graph.entry(*id).or_default();
        }

        detect_cycle(&graph)?;

        // Stable topological order: Kahn's algorithm, ties broken by first
        // pipeline step index then prompt id.
        let step_rank: BTreeMap<Uuid, usize> = step_prompt_ids
            .iter()
            .enumerate()
            .map(|(index, id)| (*id, index))
            .collect();
        let order = kahn_order(&graph, &step_rank);

        // Concrete versions per step, version rows memoized per
        // (prompt, version).
        let mut version_cache: BTreeMap<(Uuid, Semver), (String, Vec<VariableDecl>)> =
            BTreeMap::new();
        let mut planned: Vec<PlannedStep> = Vec::with_capacity(steps.len());
        let mut version_tuple: Vec<(Uuid, Semver)> = Vec::new();

        for (index, step) in steps.iter().enumerate() {
            let prompt = prompts
                .get(&step.prompt_ref.prompt_id)
                .expect("step prompts were loaded above");
            let (ref_override, edge_pin) = step_edges
                .get(&step.id)
                .cloned()
                .unwrap_or_else(|| (step.override_config.clone().unwrap_or_default(), None));

            let version = match step.prompt_ref.version {
                VersionReq::Exact(pin) => pin,
                VersionReq::Latest => edge_pin.unwrap_or(prompt.current_version),
            };

            let (content, variable_spec) =
                self.load_version(&mut version_cache, prompt, version)?;

            version_tuple.push((prompt.id, version));
            planned.push(PlannedStep {
                pipeline_index: index,
                step: step.clone(),
                prompt: PromptMeta::from(prompt),
                version,
                content,
                variable_spec,
                ref_override,
            });
        }

        // Hidden prerequisites join the version tuple so a publish anywhere
        // upstream changes the fingerprint.
        let mut ordered: Vec<PlanNode> = Vec::with_capacity(order.len());
        for prompt_id in order {
            let hidden = !step_rank.contains_key(&prompt_id);
            let version = if hidden {
                let prompt = prompts
                    .get(&prompt_id)
                    .expect("closure prompts were loaded above");
                let version =
                    hidden_versions.get(&prompt_id).copied().unwrap_or(prompt.current_version);
                version_tuple.push((prompt_id, version));
                version
            } else {
                planned
                    .iter()
                    .find(|p| p.prompt.id == prompt_id)
                    .map(|p| p.version)
                    .unwrap_or(Semver::INITIAL)
            };
            ordered.push(PlanNode { prompt_id, version, hidden });
        }

        version_tuple.sort();
        version_tuple.dedup();

        Ok(ScenePlan {
            ordered,
            steps: planned,
            version_tuple,
            prompts: prompts.iter().map(|(id, p)| (*id, PromptMeta::from(p))).collect(),
        })
    }

    /// Cycle pre-check used at scene save: expands the closure from the
    /// given seeds and fails on any cycle.
    pub fn ensure_acyclic(&self, seeds: &[Uuid]) -> Result<()> {
        let graph = self.expand_ref_graph(seeds)?;
        detect_cycle(&graph)
    }

    /// Pre-check for explicit ref creation: fails if `source -> target`
    /// would close a cycle over the existing reference graph.
    pub fn ensure_edge_acyclic(&self, source: Uuid, target: Uuid) -> Result<()> {
        let mut graph = self.expand_ref_graph(&[source, target])?;
        graph.entry(source).or_default().insert(target);
        graph.entry(target).or_default();
        detect_cycle(&graph)
    }

    fn expand_ref_graph(&self, seeds: &[Uuid]) -> Result<BTreeMap<Uuid, BTreeSet<Uuid>>> {
        let mut graph: BTreeMap<Uuid, BTreeSet<Uuid>> = BTreeMap::new();
        let mut frontier: Vec<Uuid> = seeds.to_vec();
        let mut expanded: BTreeSet<Uuid> = BTreeSet::new();
        while !frontier.is_empty() {
            let batch: Vec<Uuid> =
                frontier.drain(..).filter(|id| expanded.insert(*id)).collect();
            if batch.is_empty() {
                break;
            }
            for edge in self.storage.out_edges_of_prompts(&batch)? {
                let Some(source) = edge.source_prompt_id else { continue };
                graph.entry(source).or_default().insert(edge.target_prompt_id);
                graph.entry(edge.target_prompt_id).or_default();
                frontier.push(edge.target_prompt_id);
            }
        }
        Ok(graph)
    }

    fn load_prompts(&self, ids: &[Uuid], into: &mut BTreeMap<Uuid, Prompt>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let loaded = self.storage.get_prompts_by_ids(ids)?;
        let mut found: BTreeSet<Uuid> = BTreeSet::new();
        for prompt in loaded {
            found.insert(prompt.id);
            into.insert(prompt.id, prompt);
        }
        if let Some(missing) = ids.iter().find(|id| !found.contains(id)) {
            return Err(ServiceError::NotFound { entity: "prompt", id: missing.to_string() });
        }
        Ok(())
    }

    fn load_version(
        &self,
        cache: &mut BTreeMap<(Uuid, Semver), (String, Vec<VariableDecl>)>,
        prompt: &Prompt,
        version: Semver,
    ) -> Result<(String, Vec<VariableDecl>)> {
        if let Some(found) = cache.get(&(prompt.id, version)) {
            return Ok(found.clone());
        }
        let row = self.storage.get_version(prompt.id, version).map_err(|err| {
            match ServiceError::from(err) {
                ServiceError::NotFound { .. } => ServiceError::NotFound {
                    entity: "version",
                    id: format!("{}@{version}", prompt.slug),
                },
                other => other,
            }
        })?;
        let entry = (row.content, row.variable_spec);
        cache.insert((prompt.id, version), entry.clone());
        Ok(entry)
    }
}

fn check_cross_project(prompt: &Prompt, scene_project_id: Uuid) -> Result<()> {
    if prompt.project_id != scene_project_id && !prompt.is_shared {
        return Err(ServiceError::PermissionDenied(format!(
            "prompt '{}' is not shared and belongs to another project",
            prompt.name
        )));
    }
    Ok(())
}

/// DFS with a visiting set; a back edge yields the cycle path.
fn detect_cycle(graph: &BTreeMap<Uuid, BTreeSet<Uuid>>) -> Result<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        node: Uuid,
        graph: &BTreeMap<Uuid, BTreeSet<Uuid>>,
        marks: &mut BTreeMap<Uuid, Mark>,
        path: &mut Vec<Uuid>,
    ) -> Result<()> {
        match marks.get(&node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|id| *id == node).unwrap_or(0);
                let mut cycle: Vec<Uuid> = path[start..].to_vec();
                cycle.push(node);
                return Err(ServiceError::CircularDependency { path: cycle });
            },
            None => {},
        }
        marks.insert(node, Mark::Visiting);
        path.push(node);
        if let Some(deps) = graph.get(&node) {
            for dep in deps {
                visit(*dep, graph, marks, path)?;
            }
        }
        path.pop();
        marks.insert(node, Mark::Done);
        Ok(())
    }

    let mut marks = BTreeMap::new();
    let mut path = Vec::new();
    for node in graph.keys() {
        visit(*node, graph, &mut marks, &mut path)?;
    }
    Ok(())
}

/// Kahn's algorithm over `node -> deps`, dependencies first. When several
/// nodes are ready, the lowest `(step rank, prompt id)` wins, keeping the
/// output stable across runs.
fn kahn_order(
    graph: &BTreeMap<Uuid, BTreeSet<Uuid>>,
    step_rank: &BTreeMap<Uuid, usize>,
) -> Vec<Uuid> {
    let mut in_degree: BTreeMap<Uuid, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<Uuid, Vec<Uuid>> = BTreeMap::new();
    for (node, deps) in graph {
        in_degree.entry(*node).or_insert(0);
        for dep in deps {
            in_degree.entry(*dep).or_insert(0);
            *in_degree.entry(*node).or_insert(0) += 1;
            dependents.entry(*dep).or_default().push(*node);
        }
    }

    let rank = |id: &Uuid| (step_rank.get(id).copied().unwrap_or(usize::MAX), *id);
    let mut ready: Vec<Uuid> =
        in_degree.iter().filter(|(_, d)| **d == 0).map(|(id, _)| *id).collect();
    let mut order: Vec<Uuid> = Vec::with_capacity(in_degree.len());

    while !ready.is_empty() {
        ready.sort_by_key(rank);
        let next = ready.remove(0);
        order.push(next);
        if let Some(nodes) = dependents.get(&next) {
            for node in nodes {
                let degree = in_degree.get_mut(node).expect("all nodes have a degree");
                *degree -= 1;
                if *degree == 0 {
                    ready.push(*node);
                }
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuid(n: u8) -> Uuid {
        Uuid::from_bytes([n; 16])
    }

    #[test]
    fn detect_cycle_reports_path() {
        let a = uuid(1);
        let b = uuid(2);
        let mut graph: BTreeMap<Uuid, BTreeSet<Uuid>> = BTreeMap::new();
        graph.entry(a).or_default().insert(b);
        graph.entry(b).or_default().insert(a);

        let err = detect_cycle(&graph).unwrap_err();
        match err {
            ServiceError::CircularDependency { path } => {
                assert!(path.len() >= 3);
                assert_eq!(path.first(), path.last());
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn acyclic_graph_passes() {
        let a = uuid(1);
        let b = uuid(2);
        let c = uuid(3);
        let mut graph: BTreeMap<Uuid, BTreeSet<Uuid>> = BTreeMap::new();
        graph.entry(a).or_default().insert(b);
        graph.entry(a).or_default().insert(c);
        graph.entry(b).or_default().insert(c);
        graph.entry(c).or_default();
        assert!(detect_cycle(&graph).is_ok());
    }

    #[test]
    fn kahn_puts_dependencies_first_with_stable_ties() {
        let a = uuid(1);
        let b = uuid(2);
        let c = uuid(3);
        // a depends on c; b independent.
        let mut graph: BTreeMap<Uuid, BTreeSet<Uuid>> = BTreeMap::new();
        graph.entry(a).or_default().insert(c);
        graph.entry(b).or_default();
        graph.entry(c).or_default();

        let mut rank = BTreeMap::new();
        rank.insert(a, 0);
        rank.insert(b, 1);

        let order = kahn_order(&graph, &rank);
        let pos = |id: Uuid| order.iter().position(|x| *x == id).unwrap();
        assert!(pos(c) < pos(a));
        // b is a ranked step, c is hidden: b sorts before c among ready nodes.
        assert!(pos(b) < pos(c));
        assert_eq!(order.len(), 3);
    }
}
