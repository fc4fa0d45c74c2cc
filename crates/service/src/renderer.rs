//! Template rendering with validation.
//!
//! Three engines: the jinja2 dialect (full control flow, strict undefined,
//! data-only expressions), a logic-less `{{ var }}` substitution, and
//! verbatim passthrough. A validation pass runs before any substitution:
//! required variables must be present or defaulted, provided values must
//! match their declared types, enums must stay within their allowed values,
//! and every `{{ name }}` reference must be declared or provided.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use minijinja::{Environment, UndefinedBehavior};
use regex::Regex;
use serde_json::Value;

use prompthub_core::{TemplateEngineKind, VariableDecl};

use crate::error::{RenderErrorKind, Result, ServiceError};

fn render_err(kind: RenderErrorKind, detail: impl Into<String>) -> ServiceError {
    ServiceError::TemplateRender { kind, detail: detail.into() }
}

/// `{{ name }}` / `{{ obj.field }}` references. Metadata comments (`{{!`)
/// and block tags (`{%`) do not match.
fn var_ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)((?:\.[A-Za-z0-9_]+)*)\s*\}\}")
            .expect("var ref regex is valid")
    })
}

/// Merges declared defaults under the provided variables and validates the
/// result against the declarations.
pub fn validate_variables(
    spec: &[VariableDecl],
    provided: &BTreeMap<String, Value>,
) -> Result<BTreeMap<String, Value>> {
    let mut merged: BTreeMap<String, Value> = BTreeMap::new();
    for decl in spec {
        if let Some(default) = &decl.default {
            merged.insert(decl.name.clone(), default.clone());
        }
    }
    for (name, value) in provided {
        merged.insert(name.clone(), value.clone());
    }

    let mut missing: Vec<&str> = Vec::new();
    for decl in spec {
        if decl.required && !merged.contains_key(&decl.name) {
            missing.push(&decl.name);
        }
    }
    if !missing.is_empty() {
        return Err(render_err(
            RenderErrorKind::MissingRequired,
            format!("missing required variables: {}", missing.join(", ")),
        ));
    }

    for decl in spec {
        let Some(value) = provided.get(&decl.name) else { continue };
        if !decl.var_type.accepts(value) {
            return Err(render_err(
                RenderErrorKind::TypeMismatch,
                format!("variable '{}' is not a {}", decl.name, decl.var_type.as_str()),
            ));
        }
        if let Some(allowed) = &decl.enum_values {
            let as_str = value.as_str().unwrap_or_default();
            if !allowed.iter().any(|v| v == as_str) {
                return Err(render_err(
                    RenderErrorKind::EnumViolation,
                    format!(
                        "variable '{}' must be one of [{}], got '{as_str}'",
                        decl.name,
                        allowed.join(", ")
                    ),
                ));
            }
        }
    }

    Ok(merged)
}

/// Names bound inside the template itself (`{% for x in ... %}`,
/// `{% set x = ... %}`) plus the `loop` builtin. These are legal `{{ }}`
/// roots without a declaration.
fn template_bound_names(content: &str) -> std::collections::BTreeSet<String> {
    static FOR_RE: OnceLock<Regex> = OnceLock::new();
    static SET_RE: OnceLock<Regex> = OnceLock::new();
    let for_re = FOR_RE.get_or_init(|| {
        Regex::new(
            r"\{%-?\s*for\s+([A-Za-z_][A-Za-z0-9_]*)(?:\s*,\s*([A-Za-z_][A-Za-z0-9_]*))?\s+in",
        )
        .expect("for regex is valid")
    });
    let set_re = SET_RE.get_or_init(|| {
        Regex::new(r"\{%-?\s*set\s+([A-Za-z_][A-Za-z0-9_]*)").expect("set regex is valid")
    });

    let mut names = std::collections::BTreeSet::new();
    names.insert("loop".to_owned());
    for captures in for_re.captures_iter(content) {
        names.insert(captures[1].to_owned());
        if let Some(second) = captures.get(2) {
            names.insert(second.as_str().to_owned());
        }
    }
    for captures in set_re.captures_iter(content) {
        names.insert(captures[1].to_owned());
    }
    names
}

/// Every `{{ name }}` root must be declared, provided, or bound by the
/// template itself.
fn check_references(
    content: &str,
    engine: TemplateEngineKind,
    spec: &[VariableDecl],
    scope: &BTreeMap<String, Value>,
) -> Result<()> {
    let bound = match engine {
        TemplateEngineKind::Jinja2 => template_bound_names(content),
        _ => std::collections::BTreeSet::new(),
    };
    for captures in var_ref_regex().captures_iter(content) {
        let root = &captures[1];
        let declared = spec.iter().any(|d| d.name == root);
        if !declared && !scope.contains_key(root) && !bound.contains(root) {
            return Err(render_err(
                RenderErrorKind::UndefinedVariable,
                format!("template references undeclared variable '{root}'"),
            ));
        }
    }
    Ok(())
}

/// Renders `content` with the given engine after validating `provided`
/// against the declarations. Deterministic: same inputs, same bytes out.
pub fn render(
    content: &str,
    engine: TemplateEngineKind,
    spec: &[VariableDecl],
    provided: &BTreeMap<String, Value>,
) -> Result<String> {
    if engine == TemplateEngineKind::None {
        if !spec.is_empty() {
            return Err(ServiceError::Validation(
                "a prompt with template engine 'none' must have an empty variable spec".to_owned(),
            ));
        }
        return Ok(content.to_owned());
    }

    let scope = validate_variables(spec, provided)?;
    check_references(content, engine, spec, &scope)?;

    match engine {
        TemplateEngineKind::Simple => render_simple(content, spec, &scope),
        _ => render_jinja(content, &scope),
    }
}

/// The jinja2 dialect. The environment is rebuilt per render with strict
/// undefined behavior; minijinja exposes no file, process, or network
/// constructs, so only data expressions can run.
fn render_jinja(content: &str, scope: &BTreeMap<String, Value>) -> Result<String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);

    env.render_str(content, scope).map_err(|err| {
        let detail = err.to_string();
        match err.kind() {
            minijinja::ErrorKind::UndefinedError => {
                render_err(RenderErrorKind::UndefinedVariable, detail)
            },
            minijinja::ErrorKind::SyntaxError => render_err(RenderErrorKind::SyntaxError, detail),
            minijinja::ErrorKind::UnknownFunction
            | minijinja::ErrorKind::UnknownMethod
            | minijinja::ErrorKind::UnknownFilter
            | minijinja::ErrorKind::UnknownTest => {
                render_err(RenderErrorKind::SandboxViolation, detail)
            },
            _ => render_err(RenderErrorKind::SyntaxError, detail),
        }
    })
}

fn lookup_path<'a>(scope: &'a BTreeMap<String, Value>, root: &str, path: &str) -> Option<&'a Value> {
    let mut current = scope.get(root)?;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = current.get(segment)?;
    }
    Some(current)
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Logic-less substitution. Unknowns render as empty string only when the
/// root variable is declared optional; otherwise the render fails.
fn render_simple(
    content: &str,
    spec: &[VariableDecl],
    scope: &BTreeMap<String, Value>,
) -> Result<String> {
    let mut failure: Option<ServiceError> = None;
    let rendered = var_ref_regex().replace_all(content, |captures: &regex::Captures<'_>| {
        let root = &captures[1];
        let path = &captures[2];
        match lookup_path(scope, root, path) {
            Some(value) => value_to_text(value),
            None => {
                let optional = spec.iter().any(|d| d.name == root && !d.required);
                if !optional && failure.is_none() {
                    failure = Some(render_err(
                        RenderErrorKind::UndefinedVariable,
                        format!("variable '{root}{path}' has no value"),
                    ));
                }
                String::new()
            },
        }
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(rendered.into_owned()),
    }
}
