use serde_json::Value;

use crate::models::{Tag, TagId};

use super::MAX_TAG_LEVEL;

/// Normalization and cleaning passes for tag trees.
///
/// `normalize` repairs raw, possibly legacy input; `clean` is the post-edit
/// pass that trims text and drops unnamed tags. Neither ever fails.
pub struct TagNormalizer;

impl TagNormalizer {
    /// Converts raw JSON tag data into a well-formed tag tree.
    ///
    /// # Normalization rules
    ///
    /// - Non-array input yields an empty list
    /// - Non-object nodes are dropped silently
    /// - Missing or empty ids are replaced with generated ones
    /// - Legacy flat tags (no `children` key) get an empty child list
    /// - Example entries are coerced to strings (`null` becomes `""`)
    /// - Children below level 3 are truncated
    ///
    /// Names and descriptions are not trimmed here; see [`TagNormalizer::clean`].
    ///
    /// # Examples
    ///
    /// ```
    /// use dtag::taxonomy::TagNormalizer;
    ///
    /// let raw = serde_json::json!([{"name": "Positive", "examples": [42, null]}, "junk"]);
    /// let tags = TagNormalizer::normalize(&raw);
    ///
    /// assert_eq!(tags.len(), 1);
    /// assert_eq!(tags[0].examples(), &["42", ""]);
    /// ```
    #[must_use]
    pub fn normalize(raw: &Value) -> Vec<Tag> {
        let Some(nodes) = raw.as_array() else {
            return Vec::new();
        };

        nodes
            .iter()
            .filter_map(|node| normalize_node(node, 1))
            .collect()
    }

    /// Trims and prunes an edited tag tree.
    ///
    /// # Cleaning rules
    ///
    /// - Trims names and descriptions
    /// - Drops tags whose trimmed name is empty, along with their children
    /// - Trims examples and drops the empty ones
    /// - Applies the same rules to children, down to level 3
    ///
    /// Every tag in the result has a non-empty trimmed name.
    #[must_use]
    pub fn clean(tags: &[Tag]) -> Vec<Tag> {
        clean_level(tags, 1)
    }
}

fn normalize_node(node: &Value, level: usize) -> Option<Tag> {
    let fields = node.as_object()?;

    let id = fields
        .get("id")
        .and_then(scalar_to_string)
        .filter(|id| !id.is_empty())
        .map(TagId::new)
        .unwrap_or_else(TagId::generate);
    let name = fields
        .get("name")
        .and_then(scalar_to_string)
        .unwrap_or_default();
    let description = fields
        .get("description")
        .and_then(scalar_to_string)
        .unwrap_or_default();
    let examples: Vec<String> = fields
        .get("examples")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(example_to_string).collect())
        .unwrap_or_default();

    let children = if level < MAX_TAG_LEVEL {
        fields
            .get("children")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|child| normalize_node(child, level + 1))
                    .collect()
            })
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    Some(
        Tag::with_id(id, name)
            .with_description(description)
            .with_examples(examples)
            .with_children(children),
    )
}

fn clean_level(tags: &[Tag], level: usize) -> Vec<Tag> {
    tags.iter()
        .filter_map(|tag| {
            let name = tag.name().trim();
            if name.is_empty() {
                return None;
            }

            let examples = tag
                .examples()
                .iter()
                .map(|example| example.trim())
                .filter(|example| !example.is_empty());

            let children = if level < MAX_TAG_LEVEL {
                clean_level(tag.children(), level + 1)
            } else {
                Vec::new()
            };

            Some(
                Tag::with_id(tag.id().clone(), name)
                    .with_description(tag.description().trim())
                    .with_examples(examples)
                    .with_children(children),
            )
        })
        .collect()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn example_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
