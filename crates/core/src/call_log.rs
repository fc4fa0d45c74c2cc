//! Resolved-call telemetry records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One resolved call, for a single prompt render or a scene resolve.
/// Treated as telemetry, not business state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLogRecord {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<Uuid>,
    /// Version actually resolved, when a single version applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub caller_system: Option<String>,
    pub input_variables: Value,
    /// May be truncated to the configured maximum before durable write.
    pub rendered_content: String,
    pub token_count: u64,
    pub response_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Uniform cheap token estimate: `ceil(chars / 4)`.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::estimate_tokens;

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
