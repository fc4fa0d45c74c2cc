//! Prompt artifacts and their variable declarations.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CoreError;
use crate::version::Semver;

/// Output format a prompt's rendered content is intended for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum PromptFormat {
    Text,
    Json,
    Yaml,
    Chat,
}

impl PromptFormat {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Chat => "chat",
        }
    }
}

impl FromStr for PromptFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "yaml" => Ok(Self::Yaml),
            "chat" => Ok(Self::Chat),
            _ => Err(CoreError::InvalidVariant { what: "prompt format", value: s.to_owned() }),
        }
    }
}

/// Which substitution engine renders a prompt's template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum TemplateEngineKind {
    /// Full control-flow dialect: `{{ var }}`, `{% if %}`, `{% for %}`.
    Jinja2,
    /// Logic-less `{{ var }}` / `{{ obj.field }}` substitution.
    Simple,
    /// Content is returned verbatim; the variable spec must be empty.
    None,
}

impl TemplateEngineKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Jinja2 => "jinja2",
            Self::Simple => "simple",
            Self::None => "none",
        }
    }
}

impl FromStr for TemplateEngineKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jinja2" => Ok(Self::Jinja2),
            "simple" => Ok(Self::Simple),
            "none" => Ok(Self::None),
            _ => Err(CoreError::InvalidVariant { what: "template engine", value: s.to_owned() }),
        }
    }
}

/// Declared type of a template variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum VariableType {
    String,
    Integer,
    Number,
    Boolean,
    Enum,
    Object,
    Array,
}

impl VariableType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Enum => "enum",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    /// Whether a JSON value is compatible with this declared type.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match *self {
            Self::String | Self::Enum => value.is_string(),
            Self::Integer => value.as_i64().is_some() || value.as_u64().is_some(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

/// One entry of a prompt's ordered variable spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub var_type: VariableType,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Allowed values; present iff `var_type` is `enum`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

const fn default_true() -> bool {
    true
}

/// Validates a variable spec: enum declarations need values, non-enums must
/// not carry them, defaults must be type-compatible and within the enum set,
/// and names must be unique.
pub fn validate_variable_spec(spec: &[VariableDecl]) -> Result<(), CoreError> {
    let mut seen: BTreeMap<&str, ()> = BTreeMap::new();
    for decl in spec {
        if decl.name.is_empty() {
            return Err(CoreError::InvalidVariableSpec("variable name is empty".to_owned()));
        }
        if seen.insert(&decl.name, ()).is_some() {
            return Err(CoreError::InvalidVariableSpec(format!(
                "duplicate variable '{}'",
                decl.name
            )));
        }
        match (&decl.var_type, &decl.enum_values) {
            (VariableType::Enum, None) => {
                return Err(CoreError::InvalidVariableSpec(format!(
                    "enum variable '{}' has no enum_values",
                    decl.name
                )));
            },
            (VariableType::Enum, Some(values)) if values.is_empty() => {
                return Err(CoreError::InvalidVariableSpec(format!(
                    "enum variable '{}' has empty enum_values",
                    decl.name
                )));
            },
            (VariableType::Enum, Some(_)) => {},
            (_, Some(_)) => {
                return Err(CoreError::InvalidVariableSpec(format!(
                    "non-enum variable '{}' carries enum_values",
                    decl.name
                )));
            },
            (_, None) => {},
        }
        if let Some(default) = &decl.default {
            if !decl.var_type.accepts(default) {
                return Err(CoreError::InvalidVariableSpec(format!(
                    "default for '{}' is not a {}",
                    decl.name,
                    decl.var_type.as_str()
                )));
            }
            if let Some(values) = &decl.enum_values {
                let as_str = default.as_str().unwrap_or_default();
                if !values.iter().any(|v| v == as_str) {
                    return Err(CoreError::InvalidVariableSpec(format!(
                        "default for '{}' is outside its enum values",
                        decl.name
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Checks a slug is non-empty, lowercase, and URL-safe.
pub fn validate_slug(slug: &str) -> Result<(), CoreError> {
    let ok = !slug.is_empty()
        && slug.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
        && !slug.starts_with('-');
    if ok {
        Ok(())
    } else {
        Err(CoreError::InvalidSlug(slug.to_owned()))
    }
}

/// The logical prompt artifact. Template content lives on its versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    /// Unique within the project among non-deleted prompts.
    pub slug: String,
    pub description: Option<String>,
    pub format: PromptFormat,
    pub template_engine: TemplateEngineKind,
    pub variable_spec: Vec<VariableDecl>,
    pub tags: Vec<String>,
    pub category: Option<String>,
    /// Eligible for cross-project references when true.
    pub is_shared: bool,
    /// Always points at an existing published version.
    pub current_version: Semver,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decl(name: &str, var_type: VariableType) -> VariableDecl {
        VariableDecl {
            name: name.to_owned(),
            var_type,
            required: true,
            default: None,
            enum_values: None,
            description: None,
        }
    }

    #[test]
    fn enum_without_values_is_rejected() {
        let spec = vec![decl("style", VariableType::Enum)];
        assert!(validate_variable_spec(&spec).is_err());
    }

    #[test]
    fn default_outside_enum_is_rejected() {
        let mut d = decl("style", VariableType::Enum);
        d.enum_values = Some(vec!["plain".to_owned(), "fancy".to_owned()]);
        d.default = Some(json!("bold"));
        assert!(validate_variable_spec(&[d]).is_err());
    }

    #[test]
    fn type_incompatible_default_is_rejected() {
        let mut d = decl("count", VariableType::Integer);
        d.default = Some(json!("three"));
        assert!(validate_variable_spec(&[d]).is_err());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let spec = vec![decl("x", VariableType::String), decl("x", VariableType::Integer)];
        assert!(validate_variable_spec(&spec).is_err());
    }

    #[test]
    fn well_formed_spec_passes() {
        let mut style = decl("style", VariableType::Enum);
        style.required = false;
        style.enum_values = Some(vec!["plain".to_owned(), "fancy".to_owned()]);
        style.default = Some(json!("plain"));
        let spec = vec![decl("name", VariableType::String), style];
        assert!(validate_variable_spec(&spec).is_ok());
    }

    #[test]
    fn slug_charset() {
        assert!(validate_slug("greet-v2_x").is_ok());
        assert!(validate_slug("").is_err());
        assert!(validate_slug("Has Caps").is_err());
        assert!(validate_slug("spaced out").is_err());
    }
}
