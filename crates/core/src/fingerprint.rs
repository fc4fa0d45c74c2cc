//! Resolve-cache fingerprints.
//!
//! A fingerprint is a SHA-256 over everything that determines a resolve's
//! output: the scene, the caller's variables in canonical form, the caller's
//! project, and the concrete `(prompt_id, version)` tuple of every node the
//! resolver visited. A publish changes `current_version`, which changes the
//! plan tuple, which misses the cache — `latest` stays a live binding while
//! the cache stays coherent.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::version::Semver;

/// Re-serializes a JSON value with object keys sorted and no insignificant
/// whitespace. Scalars keep their natural form.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    fn normalize(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<(&String, &Value)> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut out = Map::new();
                for (k, v) in entries {
                    out.insert(k.clone(), normalize(v));
                }
                Value::Object(out)
            },
            Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
            other => other.clone(),
        }
    }
    // serde_json writes Map entries in insertion order, so the normalized
    // tree serializes with sorted keys.
    normalize(value).to_string()
}

/// Computes the hex fingerprint for one resolve.
#[must_use]
pub fn resolve_fingerprint(
    scene_id: Uuid,
    variables: &Value,
    caller_project_id: Option<Uuid>,
    plan_versions: &[(Uuid, Semver)],
) -> String {
    let mut tuple: Vec<(Uuid, Semver)> = plan_versions.to_vec();
    tuple.sort();
    tuple.dedup();

    let mut hasher = Sha256::new();
    hasher.update(scene_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical_json(variables).as_bytes());
    hasher.update([0u8]);
    if let Some(project) = caller_project_id {
        hasher.update(project.as_bytes());
    }
    hasher.update([0u8]);
    for (prompt_id, version) in &tuple {
        hasher.update(prompt_id.as_bytes());
        hasher.update(version.to_string().as_bytes());
        hasher.update([0u8]);
    }

    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_keys_recursively() {
        let v = json!({"b": 1, "a": {"z": true, "m": [1, {"y": 2, "x": 3}]}});
        assert_eq!(canonical_json(&v), r#"{"a":{"m":[1,{"x":3,"y":2}],"z":true},"b":1}"#);
    }

    #[test]
    fn key_order_does_not_change_fingerprint() {
        let scene = Uuid::new_v4();
        let a = json!({"name": "Ada", "style": "bold"});
        let b = json!({"style": "bold", "name": "Ada"});
        let plan = vec![(Uuid::new_v4(), "1.0.0".parse().unwrap())];
        assert_eq!(
            resolve_fingerprint(scene, &a, None, &plan),
            resolve_fingerprint(scene, &b, None, &plan),
        );
    }

    #[test]
    fn version_change_changes_fingerprint() {
        let scene = Uuid::new_v4();
        let prompt = Uuid::new_v4();
        let vars = json!({});
        let before = resolve_fingerprint(scene, &vars, None, &[(prompt, "1.0.0".parse().unwrap())]);
        let after = resolve_fingerprint(scene, &vars, None, &[(prompt, "1.1.0".parse().unwrap())]);
        assert_ne!(before, after);
    }

    #[test]
    fn caller_project_is_part_of_the_key() {
        let scene = Uuid::new_v4();
        let vars = json!({});
        let plan = vec![(Uuid::new_v4(), "1.0.0".parse().unwrap())];
        let anon = resolve_fingerprint(scene, &vars, None, &plan);
        let scoped = resolve_fingerprint(scene, &vars, Some(Uuid::new_v4()), &plan);
        assert_ne!(anon, scoped);
    }
}
