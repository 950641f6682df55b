//! Issue records and relationship edges as returned by an Issue Fetcher.

use crate::enums::RelationshipKind;
use crate::identifier::Identifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A directed, typed, peer-identified relationship between two issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub kind: RelationshipKind,
    pub peer: Identifier,
}

impl RelationshipEdge {
    pub fn new(kind: RelationshipKind, peer: Identifier) -> Self {
        Self { kind, peer }
    }
}

/// An issue record as produced by the Issue Fetcher.
///
/// The core treats the body as opaque except for the fields below; `summary`
/// is used only for commit messages and human-facing output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub identifier: Identifier,
    pub summary: String,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub relationships: Vec<RelationshipEdge>,
    /// Opaque additional payload, carried through unexamined.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl IssueRecord {
    pub fn project_key(&self) -> &str {
        self.identifier.project_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(summary: &str) -> IssueRecord {
        IssueRecord {
            identifier: Identifier::parse("PROJ-1").unwrap(),
            summary: summary.to_owned(),
            last_modified: DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            relationships: vec![],
            extra: Default::default(),
        }
    }

    #[test]
    fn project_key_delegates_to_identifier() {
        assert_eq!(record("x").project_key(), "PROJ");
    }
}
