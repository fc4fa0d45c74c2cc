//! End-to-end resolve flows over a real (in-memory) store: merge
//! strategies, precedence, conditions, pinning, cycles, cross-project
//! gating, cache coherence, and call-log behavior.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use uuid::Uuid;

use prompthub_core::{
    MergeStrategy, Pipeline, Project, Prompt, PromptFormat, RefType, Step, StepCondition,
    StepPromptRef, TemplateEngineKind, VariableDecl, VariableType, VersionReq,
};
use prompthub_service::{
    Caller, CallLogSink, ProjectService, PromptService, PublishRequest, ResolveCache, SceneEngine,
    SceneService, ServiceConfig, ServiceError,
};
use prompthub_storage::{NewProject, NewPrompt, NewRef, NewScene, Storage};

struct Hub {
    storage: Arc<Storage>,
    cache: Arc<ResolveCache>,
    sink: CallLogSink,
    prompts: PromptService,
    scenes: SceneService,
    projects: ProjectService,
    engine: SceneEngine,
}

fn hub() -> Hub {
    hub_with_timeout(Duration::from_secs(30))
}

fn hub_with_timeout(timeout: Duration) -> Hub {
    let storage = Arc::new(Storage::in_memory().unwrap());
    let cache = Arc::new(ResolveCache::new());
    let sink = CallLogSink::start(Arc::clone(&storage), 1024, 4096);
    let config = ServiceConfig::default();
    Hub {
        prompts: PromptService::new(
            Arc::clone(&storage),
            Arc::clone(&cache),
            sink.clone(),
            config,
        ),
        scenes: SceneService::new(Arc::clone(&storage), Arc::clone(&cache), config),
        projects: ProjectService::new(Arc::clone(&storage), config),
        engine: SceneEngine::new(
            Arc::clone(&storage),
            Arc::clone(&cache),
            sink.clone(),
            Duration::from_secs(300),
            timeout,
        ),
        storage,
        cache,
        sink,
    }
}

fn caller() -> Caller {
    Caller { system: "tests".to_owned(), project_id: None }
}

fn project(hub: &Hub, slug: &str) -> Project {
    hub.projects
        .create(NewProject { name: slug.to_owned(), slug: slug.to_owned(), description: None })
        .unwrap()
}

fn string_var(name: &str, required: bool, default: Option<&str>) -> VariableDecl {
    VariableDecl {
        name: name.to_owned(),
        var_type: VariableType::String,
        required,
        default: default.map(|d| json!(d)),
        enum_values: None,
        description: None,
    }
}

fn create_prompt(
    hub: &Hub,
    project_id: Uuid,
    slug: &str,
    content: &str,
    spec: Vec<VariableDecl>,
) -> Prompt {
    hub.prompts
        .create(NewPrompt {
            project_id,
            name: slug.to_owned(),
            slug: slug.to_owned(),
            description: None,
            content: content.to_owned(),
            format: PromptFormat::Text,
            template_engine: TemplateEngineKind::Jinja2,
            variable_spec: spec,
            tags: Vec::new(),
            category: None,
            is_shared: false,
        })
        .unwrap()
}

fn step(id: &str, prompt_id: Uuid) -> Step {
    Step {
        id: id.to_owned(),
        prompt_ref: StepPromptRef { prompt_id, version: VersionReq::Latest },
        variables: BTreeMap::new(),
        condition: None,
        override_config: None,
        output_key: None,
    }
}

fn create_scene(
    hub: &Hub,
    project_id: Uuid,
    slug: &str,
    steps: Vec<Step>,
    strategy: MergeStrategy,
) -> prompthub_core::Scene {
    hub.scenes
        .create(NewScene {
            project_id,
            name: slug.to_owned(),
            slug: slug.to_owned(),
            description: None,
            pipeline: Pipeline { steps },
            merge_strategy: strategy,
            separator: "\n\n".to_owned(),
            output_format: None,
        })
        .unwrap()
}

fn vars(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect()
}

#[tokio::test]
async fn single_step_concat_renders_greeting() {
    let hub = hub();
    let project = project(&hub, "audio");
    let greet = create_prompt(
        &hub,
        project.id,
        "greet",
        "Hello, {{ name }}!",
        vec![string_var("name", true, None)],
    );
    let scene = create_scene(
        &hub,
        project.id,
        "hello",
        vec![step("s", greet.id)],
        MergeStrategy::Concat,
    );

    let result = hub
        .engine
        .resolve(scene.id, vars(&[("name", json!("Ada"))]), &caller(), None)
        .await
        .unwrap();

    assert_eq!(result.final_content, "Hello, Ada!");
    assert_eq!(result.steps.len(), 1);
    assert!(!result.steps[0].skipped);
    assert_eq!(result.steps[0].version, "1.0.0");
}

#[tokio::test]
async fn condition_false_skips_step() {
    let hub = hub();
    let project = project(&hub, "audio");
    let a = create_prompt(&hub, project.id, "a", "x", Vec::new());
    let b = create_prompt(&hub, project.id, "b", "y", Vec::new());

    let mut second = step("s2", b.id);
    second.condition = Some(StepCondition {
        variable: "need_img".to_owned(),
        operator: prompthub_core::ConditionOperator::Eq,
        value: Some(json!(true)),
    });
    let scene = create_scene(
        &hub,
        project.id,
        "maybe-image",
        vec![step("s1", a.id), second],
        MergeStrategy::Concat,
    );

    let result = hub
        .engine
        .resolve(scene.id, vars(&[("need_img", json!(false))]), &caller(), None)
        .await
        .unwrap();

    assert_eq!(result.final_content, "x");
    assert_eq!(result.steps.len(), 2);
    assert!(result.steps[1].skipped);
    assert_eq!(result.steps[1].skip_reason.as_deref(), Some("condition false"));
}

#[tokio::test]
async fn chain_merge_threads_prior_output() {
    let hub = hub();
    let project = project(&hub, "audio");
    let a = create_prompt(
        &hub,
        project.id,
        "raw",
        "raw: {{ text }}",
        vec![string_var("text", true, None)],
    );
    let b = create_prompt(&hub, project.id, "upper", "upper: {{ prior_output }}", Vec::new());
    let scene = create_scene(
        &hub,
        project.id,
        "chain-s",
        vec![step("s1", a.id), step("s2", b.id)],
        MergeStrategy::Chain,
    );

    let result = hub
        .engine
        .resolve(scene.id, vars(&[("text", json!("hi"))]), &caller(), None)
        .await
        .unwrap();

    assert_eq!(result.final_content, "upper: raw: hi");
}

#[tokio::test]
async fn cycle_in_ref_closure_aborts_without_call_log() {
    let hub = hub();
    let project = project(&hub, "audio");
    let a = create_prompt(&hub, project.id, "a", "a", Vec::new());
    let b = create_prompt(&hub, project.id, "b", "b", Vec::new());
    let scene = create_scene(
        &hub,
        project.id,
        "cyclic",
        vec![step("s1", a.id)],
        MergeStrategy::Concat,
    );

    // Refs are inserted behind the service's back: the save-time pre-check
    // cannot see them, so the resolver must.
    let edge = |source: Uuid, target: Uuid| NewRef {
        source_prompt_id: Some(source),
        source_scene_id: None,
        source_step_id: None,
        target_prompt_id: target,
        ref_type: RefType::Extends,
        override_config: BTreeMap::new(),
        pinned_version: None,
    };
    hub.storage.create_prompt_ref(&edge(a.id, b.id)).unwrap();
    hub.storage.create_prompt_ref(&edge(b.id, a.id)).unwrap();

    let err = hub
        .engine
        .resolve(scene.id, BTreeMap::new(), &caller(), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), 40901);
    assert_eq!(err.http_status(), 409);

    hub.sink.flush(100).await;
    assert_eq!(hub.storage.call_logs_for_scene(scene.id).unwrap(), 0);
}

#[tokio::test]
async fn version_pin_survives_publish() {
    let hub = hub();
    let project = project(&hub, "audio");
    let greet = create_prompt(
        &hub,
        project.id,
        "greet",
        "Hello, {{ name }}!",
        vec![string_var("name", true, None)],
    );

    let mut pinned = step("s", greet.id);
    pinned.prompt_ref.version = VersionReq::Exact("1.0.0".parse().unwrap());
    let scene = create_scene(
        &hub,
        project.id,
        "pinned",
        vec![pinned],
        MergeStrategy::Concat,
    );

    hub.prompts
        .publish(
            greet.id,
            PublishRequest {
                bump: Some(prompthub_core::BumpKind::Major),
                content: Some("Howdy, {{ name }}!".to_owned()),
                variable_spec: None,
                changelog: Some("rewrite".to_owned()),
            },
        )
        .unwrap();

    let result = hub
        .engine
        .resolve(scene.id, vars(&[("name", json!("Ada"))]), &caller(), None)
        .await
        .unwrap();
    assert_eq!(result.final_content, "Hello, Ada!");
    assert_eq!(result.steps[0].version, "1.0.0");
}

#[tokio::test]
async fn precedence_caller_beats_ref_beats_step_beats_default() {
    let hub = hub();
    let project = project(&hub, "audio");
    let styled = create_prompt(
        &hub,
        project.id,
        "styled",
        "style={{ style }}",
        vec![string_var("style", false, Some("plain"))],
    );

    let mut s = step("s", styled.id);
    s.variables.insert("style".to_owned(), json!("serif"));
    s.override_config =
        Some([("style".to_owned(), json!("fancy"))].into_iter().collect());
    let scene =
        create_scene(&hub, project.id, "styling", vec![s], MergeStrategy::Concat);

    // All four layers set: the caller wins.
    let result = hub
        .engine
        .resolve(scene.id, vars(&[("style", json!("bold"))]), &caller(), None)
        .await
        .unwrap();
    assert_eq!(result.final_content, "style=bold");

    // Caller absent: the ref override wins over the step static.
    let result = hub
        .engine
        .resolve(scene.id, BTreeMap::new(), &caller(), None)
        .await
        .unwrap();
    assert_eq!(result.final_content, "style=fancy");
}

#[tokio::test]
async fn defaults_apply_when_nothing_higher_wins() {
    let hub = hub();
    let project = project(&hub, "audio");
    let styled = create_prompt(
        &hub,
        project.id,
        "styled",
        "style={{ style }}",
        vec![string_var("style", false, Some("plain"))],
    );
    let scene = create_scene(
        &hub,
        project.id,
        "styling",
        vec![step("s", styled.id)],
        MergeStrategy::Concat,
    );

    let result = hub
        .engine
        .resolve(scene.id, BTreeMap::new(), &caller(), None)
        .await
        .unwrap();
    assert_eq!(result.final_content, "style=plain");
}

#[tokio::test]
async fn publish_recomputes_latest_resolves() {
    let hub = hub();
    let project = project(&hub, "audio");
    let greet = create_prompt(
        &hub,
        project.id,
        "greet",
        "Hello, {{ name }}!",
        vec![string_var("name", true, None)],
    );
    let scene = create_scene(
        &hub,
        project.id,
        "hello",
        vec![step("s", greet.id)],
        MergeStrategy::Concat,
    );
    let input = vars(&[("name", json!("Ada"))]);

    let first = hub.engine.resolve(scene.id, input.clone(), &caller(), None).await.unwrap();
    assert_eq!(first.final_content, "Hello, Ada!");

    hub.prompts
        .publish(
            greet.id,
            PublishRequest {
                bump: Some(prompthub_core::BumpKind::Minor),
                content: Some("Hi, {{ name }}!".to_owned()),
                variable_spec: None,
                changelog: None,
            },
        )
        .unwrap();

    let second = hub.engine.resolve(scene.id, input, &caller(), None).await.unwrap();
    assert_eq!(second.final_content, "Hi, Ada!");
    assert_eq!(second.steps[0].version, "1.1.0");
}

#[tokio::test]
async fn repeat_resolve_hits_cache_and_logs_once() {
    let hub = hub();
    let project = project(&hub, "audio");
    let greet = create_prompt(
        &hub,
        project.id,
        "greet",
        "Hello, {{ name }}!",
        vec![string_var("name", true, None)],
    );
    let scene = create_scene(
        &hub,
        project.id,
        "hello",
        vec![step("s", greet.id)],
        MergeStrategy::Concat,
    );
    let input = vars(&[("name", json!("Ada"))]);

    let first = hub.engine.resolve(scene.id, input.clone(), &caller(), None).await.unwrap();
    let second = hub.engine.resolve(scene.id, input, &caller(), None).await.unwrap();
    assert_eq!(first.final_content, second.final_content);
    assert_eq!(hub.cache.hits(), 1);
    assert_eq!(hub.cache.misses(), 1);

    hub.sink.flush(100).await;
    assert_eq!(hub.storage.call_logs_for_scene(scene.id).unwrap(), 1);
}

#[tokio::test]
async fn cross_project_non_shared_is_denied_before_render() {
    let hub = hub();
    let ours = project(&hub, "audio");
    let theirs = project(&hub, "video");
    let private = create_prompt(&hub, theirs.id, "private", "secret", Vec::new());

    // The service refuses to save such a scene.
    let err = hub
        .scenes
        .create(NewScene {
            project_id: ours.id,
            name: "leak".to_owned(),
            slug: "leak".to_owned(),
            description: None,
            pipeline: Pipeline { steps: vec![step("s", private.id)] },
            merge_strategy: MergeStrategy::Concat,
            separator: String::new(),
            output_format: None,
        })
        .unwrap_err();
    assert_eq!(err.code(), 40300);

    // A scene saved before the target was unshared still fails at resolve.
    let scene = hub
        .storage
        .create_scene(
            &NewScene {
                project_id: ours.id,
                name: "leak".to_owned(),
                slug: "leak".to_owned(),
                description: None,
                pipeline: Pipeline { steps: vec![step("s", private.id)] },
                merge_strategy: MergeStrategy::Concat,
                separator: String::new(),
                output_format: None,
            },
            &[],
        )
        .unwrap();
    let err = hub
        .engine
        .resolve(scene.id, BTreeMap::new(), &caller(), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), 40300);
    assert_eq!(err.http_status(), 403);

    hub.sink.flush(100).await;
    assert_eq!(hub.storage.call_logs_for_scene(scene.id).unwrap(), 0);
}

#[tokio::test]
async fn shared_prompt_resolves_across_projects() {
    let hub = hub();
    let ours = project(&hub, "audio");
    let theirs = project(&hub, "video");
    let shared = create_prompt(&hub, theirs.id, "shared", "borrowed", Vec::new());
    hub.prompts.share(shared.id).unwrap();

    let scene = create_scene(
        &hub,
        ours.id,
        "borrow",
        vec![step("s", shared.id)],
        MergeStrategy::Concat,
    );
    let result = hub
        .engine
        .resolve(scene.id, BTreeMap::new(), &caller(), None)
        .await
        .unwrap();
    assert_eq!(result.final_content, "borrowed");
}

#[tokio::test]
async fn select_best_picks_highest_score_and_falls_back() {
    let hub = hub();
    let project = project(&hub, "audio");
    let low = create_prompt(&hub, project.id, "low", "meh {{!score=0.3}}", Vec::new());
    let high = create_prompt(&hub, project.id, "high", "great {{!score=0.9}}", Vec::new());
    let scene = create_scene(
        &hub,
        project.id,
        "best",
        vec![step("s1", low.id), step("s2", high.id)],
        MergeStrategy::SelectBest,
    );

    let result = hub
        .engine
        .resolve(scene.id, BTreeMap::new(), &caller(), None)
        .await
        .unwrap();
    assert_eq!(result.final_content, "great ");
    assert!(result.warnings.is_empty());

    // No scores anywhere: last output plus a warning.
    let a = create_prompt(&hub, project.id, "a", "first", Vec::new());
    let b = create_prompt(&hub, project.id, "b", "second", Vec::new());
    let unscored = create_scene(
        &hub,
        project.id,
        "unscored",
        vec![step("s1", a.id), step("s2", b.id)],
        MergeStrategy::SelectBest,
    );
    let result = hub
        .engine
        .resolve(unscored.id, BTreeMap::new(), &caller(), None)
        .await
        .unwrap();
    assert_eq!(result.final_content, "second");
    assert_eq!(result.warnings.len(), 1);
}

#[tokio::test]
async fn render_failure_aborts_whole_resolve() {
    let hub = hub();
    let project = project(&hub, "audio");
    let good = create_prompt(&hub, project.id, "good", "fine", Vec::new());
    let bad = create_prompt(
        &hub,
        project.id,
        "bad",
        "needs {{ name }}",
        vec![string_var("name", true, None)],
    );
    let scene = create_scene(
        &hub,
        project.id,
        "fragile",
        vec![step("s1", good.id), step("s2", bad.id)],
        MergeStrategy::Concat,
    );

    let err = hub
        .engine
        .resolve(scene.id, BTreeMap::new(), &caller(), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), 42201);

    // The attempted resolve is still logged.
    hub.sink.flush(100).await;
    assert_eq!(hub.storage.call_logs_for_scene(scene.id).unwrap(), 1);
}

#[tokio::test]
async fn zero_deadline_abandons_resolve() {
    let hub = hub_with_timeout(Duration::from_secs(0));
    let project = project(&hub, "audio");
    let prompt = create_prompt(&hub, project.id, "p", "x", Vec::new());
    let scene = create_scene(
        &hub,
        project.id,
        "slow",
        vec![step("s", prompt.id)],
        MergeStrategy::Concat,
    );

    let err = hub
        .engine
        .resolve(scene.id, BTreeMap::new(), &caller(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::DeadlineExceeded));

    hub.sink.flush(100).await;
    assert_eq!(hub.storage.call_logs_for_scene(scene.id).unwrap(), 0);
}

#[tokio::test]
async fn single_prompt_render_is_deterministic_and_logged() {
    let hub = hub();
    let project = project(&hub, "audio");
    let greet = create_prompt(
        &hub,
        project.id,
        "greet",
        "Hello, {{ name }}!",
        vec![string_var("name", true, None)],
    );

    let input = vars(&[("name", json!("Ada"))]);
    let first = hub.prompts.render(greet.id, input.clone(), &caller()).unwrap();
    let second = hub.prompts.render(greet.id, input, &caller()).unwrap();
    assert_eq!(first.rendered_content, "Hello, Ada!");
    assert_eq!(first.rendered_content, second.rendered_content);
    assert_eq!(first.version, "1.0.0");

    hub.sink.flush(100).await;
    assert_eq!(hub.storage.call_log_count().unwrap(), 2);
}

#[tokio::test]
async fn fork_copies_shared_prompt_into_project() {
    let hub = hub();
    let source_project = project(&hub, "video");
    let target_project = project(&hub, "audio");
    let shared = create_prompt(&hub, source_project.id, "style-guide", "be stylish", Vec::new());
    hub.prompts.share(shared.id).unwrap();

    let fork = hub.prompts.fork(shared.id, target_project.id, None).unwrap();
    assert_eq!(fork.project_id, target_project.id);
    assert_eq!(fork.slug, "style-guide-fork");
    assert!(!fork.is_shared);
    assert_eq!(fork.current_version.to_string(), "1.0.0");

    // Fork is a copy: publishing the source does not touch the fork.
    hub.prompts
        .publish(
            shared.id,
            PublishRequest {
                bump: Some(prompthub_core::BumpKind::Major),
                content: Some("be very stylish".to_owned()),
                variable_spec: None,
                changelog: None,
            },
        )
        .unwrap();
    let fork_version = hub.storage.get_version(fork.id, fork.current_version).unwrap();
    assert_eq!(fork_version.content, "be stylish");

    // Forking a non-shared prompt is denied.
    let private = create_prompt(&hub, source_project.id, "private", "x", Vec::new());
    let err = hub.prompts.fork(private.id, target_project.id, None).unwrap_err();
    assert_eq!(err.code(), 40300);
}

#[tokio::test]
async fn hidden_prerequisites_join_the_fingerprint() {
    let hub = hub();
    let project = project(&hub, "audio");
    let base = create_prompt(&hub, project.id, "base", "tone base", Vec::new());
    let top = create_prompt(&hub, project.id, "top", "top text", Vec::new());
    hub.storage
        .create_prompt_ref(&NewRef {
            source_prompt_id: Some(top.id),
            source_scene_id: None,
            source_step_id: None,
            target_prompt_id: base.id,
            ref_type: RefType::Extends,
            override_config: BTreeMap::new(),
            pinned_version: None,
        })
        .unwrap();
    let scene = create_scene(
        &hub,
        project.id,
        "layered",
        vec![step("s", top.id)],
        MergeStrategy::Concat,
    );

    hub.engine.resolve(scene.id, BTreeMap::new(), &caller(), None).await.unwrap();
    assert_eq!(hub.cache.misses(), 1);

    // Publishing the hidden prerequisite changes the plan tuple: the next
    // resolve recomputes even though the rendered step did not change.
    hub.prompts
        .publish(
            base.id,
            PublishRequest {
                bump: Some(prompthub_core::BumpKind::Patch),
                content: Some("tone base 2".to_owned()),
                variable_spec: None,
                changelog: None,
            },
        )
        .unwrap();
    hub.engine.resolve(scene.id, BTreeMap::new(), &caller(), None).await.unwrap();
    assert_eq!(hub.cache.misses(), 2);
}

#[tokio::test]
async fn explicit_ref_creation_gates_cycles_and_sharing() {
    let hub = hub();
    let ours = project(&hub, "audio");
    let theirs = project(&hub, "video");
    let a = create_prompt(&hub, ours.id, "a", "a", Vec::new());
    let b = create_prompt(&hub, ours.id, "b", "b", Vec::new());
    let private = create_prompt(&hub, theirs.id, "private", "p", Vec::new());

    hub.prompts
        .create_ref(a.id, b.id, RefType::Extends, BTreeMap::new(), None)
        .unwrap();

    // Closing the loop b -> a is rejected with the cycle code.
    let err = hub
        .prompts
        .create_ref(b.id, a.id, RefType::Extends, BTreeMap::new(), None)
        .unwrap_err();
    assert_eq!(err.code(), 40901);

    // Cross-project target must be shared.
    let err = hub
        .prompts
        .create_ref(a.id, private.id, RefType::Includes, BTreeMap::new(), None)
        .unwrap_err();
    assert_eq!(err.code(), 40300);

    let (outgoing, incoming) = hub.prompts.refs_for_prompt(a.id).unwrap();
    assert_eq!(outgoing.len(), 1);
    assert!(incoming.is_empty());
}

#[tokio::test]
async fn impacted_scenes_tracks_pipeline_references() {
    let hub = hub();
    let project = project(&hub, "audio");
    let prompt = create_prompt(&hub, project.id, "p", "x", Vec::new());
    let scene = create_scene(
        &hub,
        project.id,
        "uses-p",
        vec![step("s", prompt.id)],
        MergeStrategy::Concat,
    );

    assert_eq!(hub.prompts.impacted_scenes(prompt.id).unwrap(), vec![scene.id]);
}

#[tokio::test]
async fn get_by_slug_finds_project_scoped_prompt() {
    let hub = hub();
    let project = project(&hub, "audio");
    let greet = create_prompt(&hub, project.id, "greet", "hi", Vec::new());

    let found = hub.prompts.get_by_slug(Some(project.id), "greet").unwrap();
    assert_eq!(found.id, greet.id);
    let err = hub.prompts.get_by_slug(Some(project.id), "nope").unwrap_err();
    assert_eq!(err.code(), 40400);
}

#[tokio::test]
async fn dependency_graph_lists_nodes_and_edges() {
    let hub = hub();
    let project = project(&hub, "audio");
    let base = create_prompt(&hub, project.id, "base", "b", Vec::new());
    let top = create_prompt(&hub, project.id, "top", "t", Vec::new());
    hub.storage
        .create_prompt_ref(&NewRef {
            source_prompt_id: Some(top.id),
            source_scene_id: None,
            source_step_id: None,
            target_prompt_id: base.id,
            ref_type: RefType::Extends,
            override_config: BTreeMap::new(),
            pinned_version: None,
        })
        .unwrap();
    let scene = create_scene(
        &hub,
        project.id,
        "layered",
        vec![step("s", top.id)],
        MergeStrategy::Concat,
    );

    let graph = hub.scenes.dependency_graph(scene.id).unwrap();
    assert_eq!(graph.nodes.len(), 2);
    assert!(graph.nodes.iter().any(|n| n.id == base.id && n.hidden));
    assert!(graph.nodes.iter().any(|n| n.id == top.id && !n.hidden));
    // One scene->step edge plus one prompt->prompt ref.
    assert_eq!(graph.edges.len(), 2);
}
