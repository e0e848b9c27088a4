use std::collections::HashMap;

use thiserror::Error;

use crate::engine::{AI_ERROR_COLUMN, AI_TAGS_COLUMN};
use crate::models::{FlatTag, Tag, TagId};

use super::{MAX_DESCRIPTION_CHARS, MAX_NAME_CHARS};

/// Flattens a tag tree depth-first, parents before their children.
///
/// Tags whose trimmed name is empty are skipped together with their subtree.
/// Top-level order is preserved.
///
/// # Examples
///
/// ```
/// use dtag::Tag;
/// use dtag::taxonomy::flatten;
///
/// let tags = vec![
///     Tag::new("Product").with_children(vec![Tag::new("Pricing"), Tag::new("Quality")]),
///     Tag::new("Support"),
/// ];
/// let names: Vec<_> = flatten(&tags).iter().map(|t| t.name()).collect();
///
/// assert_eq!(names, vec!["Product", "Pricing", "Quality", "Support"]);
/// ```
pub fn flatten(tags: &[Tag]) -> Vec<FlatTag<'_>> {
    let mut nodes = Vec::new();
    flatten_into(tags, &[], &[], &mut nodes);
    nodes
}

fn flatten_into<'a>(
    tags: &'a [Tag],
    parent_path: &[&'a str],
    parent_ids: &[&'a TagId],
    out: &mut Vec<FlatTag<'a>>,
) {
    for tag in tags {
        let name = tag.name().trim();
        if name.is_empty() {
            continue;
        }

        let mut path = parent_path.to_vec();
        path.push(name);
        let mut id_path = parent_ids.to_vec();
        id_path.push(tag.id());

        out.push(FlatTag::new(tag, path.clone(), id_path.clone()));
        flatten_into(tag.children(), &path, &id_path, out);
    }
}

/// Resolves a tag by following `path` from the top level down.
///
/// Returns `None` for an empty path or when any id along the way is missing.
pub fn find_by_id_path<'a>(tags: &'a [Tag], path: &[TagId]) -> Option<&'a Tag> {
    let (first, rest) = path.split_first()?;
    let mut current = tags.iter().find(|tag| tag.id() == first)?;

    for id in rest {
        current = current.children().iter().find(|tag| tag.id() == id)?;
    }

    Some(current)
}

/// Returns each name that appears more than once in the flattened set,
/// compared case-insensitively. Each duplicate is reported once, using the
/// casing of its first occurrence.
pub fn duplicate_names<'a>(flat: &[FlatTag<'a>]) -> Vec<&'a str> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for tag in flat {
        *counts.entry(tag.name().to_lowercase()).or_default() += 1;
    }

    let mut reported = Vec::new();
    let mut duplicates = Vec::new();
    for tag in flat {
        let key = tag.name().to_lowercase();
        if counts.get(&key).copied().unwrap_or(0) > 1 && !reported.contains(&key) {
            reported.push(key);
            duplicates.push(tag.name());
        }
    }
    duplicates
}

/// Returns the names that contain a comma. Replies are split on commas, so
/// such a tag can never be matched.
pub fn names_with_commas<'a>(flat: &[FlatTag<'a>]) -> Vec<&'a str> {
    flat.iter()
        .map(FlatTag::name)
        .filter(|name| name.contains(','))
        .collect()
}

/// Returns the top-level names that would overwrite an existing key of an
/// output row: `AI_Tags`, `AI_Error` or one of `columns`.
///
/// Compared case-insensitively. Nested tags get no column and are never
/// reported.
///
/// # Examples
///
/// ```
/// use dtag::Tag;
/// use dtag::taxonomy::{column_collisions, flatten};
///
/// let tags = vec![Tag::new("ai_tags"), Tag::new("Comment"), Tag::new("Positive")];
/// let flat = flatten(&tags);
///
/// assert_eq!(column_collisions(&flat, &["id", "comment"]), vec!["ai_tags", "Comment"]);
/// ```
pub fn column_collisions<'a, S: AsRef<str>>(flat: &[FlatTag<'a>], columns: &[S]) -> Vec<&'a str> {
    let mut taken = vec![AI_TAGS_COLUMN.to_lowercase(), AI_ERROR_COLUMN.to_lowercase()];
    taken.extend(columns.iter().map(|column| {
        let column: &str = column.as_ref();
        column.to_lowercase()
    }));

    flat.iter()
        .filter(|tag| tag.is_top_level())
        .map(FlatTag::name)
        .filter(|name| taken.contains(&name.to_lowercase()))
        .collect()
}

/// A problem that makes a tag set unsuitable for a classification run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagIssue {
    #[error("at least one tag is required")]
    Empty,

    #[error("tag name is too long (max 100 chars): {0}")]
    NameTooLong(String),

    #[error("description of tag '{0}' is too long (max 500 chars)")]
    DescriptionTooLong(String),

    #[error("tag name '{0}' is used more than once (names are case-insensitive)")]
    DuplicateName(String),

    #[error("tag name '{0}' contains a comma and could never be matched")]
    NameContainsComma(String),

    #[error("tag name '{0}' is reserved for an output column")]
    ReservedName(String),
}

/// Checks a cleaned tag set and returns every issue found.
///
/// An empty result means the set can be used as-is.
pub fn validate(tags: &[Tag]) -> Vec<TagIssue> {
    let flat = flatten(tags);
    if flat.is_empty() {
        return vec![TagIssue::Empty];
    }

    let mut issues = Vec::new();
    for tag in &flat {
        if tag.name().chars().count() > MAX_NAME_CHARS {
            issues.push(TagIssue::NameTooLong(tag.name().to_string()));
        }
        if tag.description().chars().count() > MAX_DESCRIPTION_CHARS {
            issues.push(TagIssue::DescriptionTooLong(tag.name().to_string()));
        }
    }

    issues.extend(
        duplicate_names(&flat)
            .into_iter()
            .map(|name| TagIssue::DuplicateName(name.to_string())),
    );
    issues.extend(
        names_with_commas(&flat)
            .into_iter()
            .map(|name| TagIssue::NameContainsComma(name.to_string())),
    );
    issues.extend(
        column_collisions::<&str>(&flat, &[])
            .into_iter()
            .map(|name| TagIssue::ReservedName(name.to_string())),
    );
    issues
}
