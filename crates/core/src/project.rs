//! Projects own prompts and scenes; the core treats them as identity only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    /// Globally unique, URL-safe.
    pub slug: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}
