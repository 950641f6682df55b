//! Issue identifier validation.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9]*(-[A-Z0-9]+)*-\d+$").expect("identifier regex"));

/// Error returned when a raw string does not satisfy the identifier grammar.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("invalid identifier: {0:?}")]
pub struct IdentifierError(pub String);

/// A validated, immutable issue identifier, e.g. `PROJ-123`.
///
/// Invariant: the project key is the substring preceding the final hyphen.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Validates `raw` against the identifier grammar and wraps it.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        if IDENTIFIER_RE.is_match(raw) {
            Ok(Self(raw.to_owned()))
        } else {
            Err(IdentifierError(raw.to_owned()))
        }
    }

    /// Returns `true` iff `raw` matches the identifier grammar.
    pub fn validate(raw: &str) -> bool {
        IDENTIFIER_RE.is_match(raw)
    }

    /// The project key: the substring preceding the final hyphen.
    pub fn project_key(&self) -> &str {
        match self.0.rfind('-') {
            Some(idx) => &self.0[..idx],
            None => &self.0,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identifier {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

/// Trims whitespace, drops empties, de-duplicates preserving first occurrence,
/// and validates each remaining element.
///
/// A single invalid element fails the whole normalization.
pub fn normalize_identifiers<I, S>(raw: I) -> Result<Vec<Identifier>, IdentifierError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in raw {
        let trimmed = item.as_ref().trim();
        if trimmed.is_empty() {
            continue;
        }
        let id = Identifier::parse(trimmed)?;
        if seen.insert(id.as_str().to_owned()) {
            out.push(id);
        }
    }
    Ok(out)
}
