//! Invocation identifier type.
//!
//! Ids written by the model in a marker line are opaque tokens (`id1`, `calc-2`).
//! Ids the parser has to invent, for fenced terminal blocks without a marker, use
//! the TypeID format: `inv_01h455vb4pex5vsknk084sn02q`.

use mti::prelude::*;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// A validated invocation identifier.
///
/// Any non-empty token without `/` or whitespace is accepted, so that ids the
/// model chooses survive verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InvocationId(String);

/// Error returned when attempting to create an invalid invocation ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidInvocationId {
    /// The id was empty after trimming
    Empty,
    /// The id contained a character that cannot appear in a marker id
    ForbiddenChar {
        /// The offending character
        found: char,
    },
}

impl fmt::Display for InvalidInvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "invocation id cannot be empty"),
            Self::ForbiddenChar { found } => {
                write!(f, "invocation id cannot contain {found:?}")
            }
        }
    }
}

impl std::error::Error for InvalidInvocationId {}

impl InvocationId {
    /// The TypeID prefix for generated invocation identifiers.
    pub const PREFIX: &'static str = "inv";

    /// Creates a fresh identifier with a UUIDv7 (time-sortable).
    #[must_use]
    pub fn generate() -> Self {
        Self(Self::PREFIX.create_type_id::<V7>().to_string())
    }

    /// Parses an invocation id, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInvocationId::Empty` for blank input and
    /// `InvalidInvocationId::ForbiddenChar` when the token contains `/` or
    /// interior whitespace.
    pub fn parse(s: &str) -> Result<Self, InvalidInvocationId> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(InvalidInvocationId::Empty);
        }

        if let Some(found) = trimmed.chars().find(|c| *c == '/' || c.is_whitespace()) {
            return Err(InvalidInvocationId::ForbiddenChar { found });
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this id looks like one produced by [`generate`](Self::generate).
    #[must_use]
    pub fn is_generated(&self) -> bool {
        self.0.starts_with("inv_") && MagicTypeId::from_str(&self.0).is_ok()
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for InvocationId {
    type Err = InvalidInvocationId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for InvocationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for InvocationId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Serialize for InvocationId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for InvocationId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_uses_typeid_prefix() {
        let id = InvocationId::generate();
        assert!(id.as_str().starts_with("inv_"));
        assert!(id.is_generated());
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(InvocationId::generate(), InvocationId::generate());
    }

    #[test]
    fn parse_accepts_opaque_tokens() {
        let id = InvocationId::parse("  calc-1 ").unwrap();
        assert_eq!(id.as_str(), "calc-1");
        assert!(!id.is_generated());
    }

    #[test]
    fn parse_rejects_empty() {
        assert_eq!(InvocationId::parse("   "), Err(InvalidInvocationId::Empty));
    }

    #[test]
    fn parse_rejects_slash_and_whitespace() {
        assert_eq!(
            InvocationId::parse("a/b"),
            Err(InvalidInvocationId::ForbiddenChar { found: '/' })
        );
        assert_eq!(
            InvocationId::parse("a b"),
            Err(InvalidInvocationId::ForbiddenChar { found: ' ' })
        );
    }

    #[test]
    fn borrow_allows_str_lookup() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(InvocationId::parse("id1").unwrap(), 1);
        assert_eq!(map.get("id1"), Some(&1));
    }

    #[test]
    fn serialization_is_a_plain_string() {
        let id = InvocationId::parse("id1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"id1\"");
        let back: InvocationId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
