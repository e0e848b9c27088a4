use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, stable identifier for a tag.
///
/// Assigned once when a tag is created (or first normalized) and never
/// reused. The value carries no meaning beyond identity; imported or legacy
/// ids are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(String);

impl TagId {
    /// Wraps an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the underlying identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_id_serializes_as_raw_string() {
        let id = TagId::new("tag-42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"tag-42\"");

        let deserialized: TagId = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, id);
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = TagId::generate();
        let b = TagId::generate();
        assert_ne!(a, b);
        assert!(!a.as_str().is_empty());
    }

    #[test]
    fn display_prints_raw_value() {
        assert_eq!(TagId::new("abc").to_string(), "abc");
    }
}
