//! Semantic versions for prompt snapshots.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::prompt::VariableDecl;

/// A strict `MAJOR.MINOR.PATCH` version. Pre-release and build tags are
/// rejected at the parse boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Semver {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Semver {
    pub const INITIAL: Self = Self { major: 1, minor: 0, patch: 0 };

    /// Returns the next version for a bump, zeroing lower fields.
    #[must_use]
    pub const fn bump(self, kind: BumpKind) -> Self {
        match kind {
            BumpKind::Major => Self { major: self.major + 1, minor: 0, patch: 0 },
            BumpKind::Minor => Self { major: self.major, minor: self.minor + 1, patch: 0 },
            BumpKind::Patch => {
                Self { major: self.major, minor: self.minor, patch: self.patch + 1 }
            },
        }
    }

    /// Zero-padded form used for lexicographic-equals-semver sorting in SQL.
    #[must_use]
    pub fn sort_key(&self) -> String {
        format!("{:010}.{:010}.{:010}", self.major, self.minor, self.patch)
    }
}

impl fmt::Display for Semver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Semver {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let parse = |part: Option<&str>| -> Result<u64, CoreError> {
            let p = part.ok_or_else(|| CoreError::InvalidVersion(s.to_owned()))?;
            if p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()) {
                return Err(CoreError::InvalidVersion(s.to_owned()));
            }
            p.parse().map_err(|_| CoreError::InvalidVersion(s.to_owned()))
        };
        let major = parse(parts.next())?;
        let minor = parse(parts.next())?;
        let patch = parse(parts.next())?;
        if parts.next().is_some() {
            return Err(CoreError::InvalidVersion(s.to_owned()));
        }
        Ok(Self { major, minor, patch })
    }
}

impl Serialize for Semver {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Semver {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Which version field a publish increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpKind {
    Major,
    Minor,
    Patch,
}

/// Lifecycle status of a version row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum VersionStatus {
    /// Editable, not yet visible to resolvers.
    Draft,
    /// Frozen: content and variable spec are immutable.
    Published,
    /// Still resolvable when pinned, hidden from `latest`.
    Deprecated,
}

impl VersionStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Deprecated => "deprecated",
        }
    }
}

impl FromStr for VersionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "deprecated" => Ok(Self::Deprecated),
            _ => Err(CoreError::InvalidVariant { what: "version status", value: s.to_owned() }),
        }
    }
}

/// An immutable snapshot of a prompt's template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptVersion {
    pub id: Uuid,
    pub prompt_id: Uuid,
    pub version: Semver,
    /// Template text as published.
    pub content: String,
    pub variable_spec: Vec<VariableDecl>,
    pub changelog: Option<String>,
    pub status: VersionStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        let v: Semver = "1.2.3".parse().unwrap();
        assert_eq!(v.to_string(), "1.2.3");
    }

    #[test]
    fn rejects_prerelease_and_garbage() {
        assert!("1.2.3-beta.1".parse::<Semver>().is_err());
        assert!("1.2".parse::<Semver>().is_err());
        assert!("1.2.3.4".parse::<Semver>().is_err());
        assert!("a.b.c".parse::<Semver>().is_err());
        assert!("".parse::<Semver>().is_err());
    }

    #[test]
    fn bump_zeros_lower_fields() {
        let v: Semver = "1.2.3".parse().unwrap();
        assert_eq!(v.bump(BumpKind::Patch).to_string(), "1.2.4");
        assert_eq!(v.bump(BumpKind::Minor).to_string(), "1.3.0");
        assert_eq!(v.bump(BumpKind::Major).to_string(), "2.0.0");
    }

    #[test]
    fn ordering_is_numeric_not_lexicographic() {
        let a: Semver = "1.9.0".parse().unwrap();
        let b: Semver = "1.10.0".parse().unwrap();
        assert!(a < b);
        assert!(a.sort_key() < b.sort_key());
    }
}
