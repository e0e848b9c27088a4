use serde::{Deserialize, Serialize};

use super::TagId;

/// A classification label with optional description, examples and nested children.
///
/// Tags form a tree at most three levels deep. The `name` doubles as the token
/// the model is asked to answer with and, for top-level tags, as the output
/// column key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(default = "TagId::generate")]
    id: TagId,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    examples: Vec<String>,
    #[serde(default)]
    children: Vec<Tag>,
}

impl Tag {
    /// Creates a childless tag with a freshly generated id.
    ///
    /// # Examples
    ///
    /// ```
    /// use dtag::Tag;
    ///
    /// let tag = Tag::new("Positive").with_description("Praise or satisfaction");
    /// assert_eq!(tag.name(), "Positive");
    /// assert_eq!(tag.description(), "Praise or satisfaction");
    /// assert!(tag.children().is_empty());
    /// ```
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(TagId::generate(), name)
    }

    /// Creates a childless tag with the given id.
    pub fn with_id(id: TagId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            examples: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the examples.
    #[must_use]
    pub fn with_examples<I, S>(mut self, examples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.examples = examples.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the nested children.
    #[must_use]
    pub fn with_children(mut self, children: Vec<Tag>) -> Self {
        self.children = children;
        self
    }

    pub fn id(&self) -> &TagId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn examples(&self) -> &[String] {
        &self.examples
    }

    pub fn children(&self) -> &[Tag] {
        &self.children
    }

    /// Appends one example.
    pub fn add_example(&mut self, example: impl Into<String>) {
        self.examples.push(example.into());
    }
}

/// A tag projected into prompt-ready form.
///
/// Borrows from the tag tree it was flattened from and carries the resolved
/// ancestor path (names and ids) from the root down to the tag itself.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatTag<'a> {
    tag: &'a Tag,
    path: Vec<&'a str>,
    id_path: Vec<&'a TagId>,
}

impl<'a> FlatTag<'a> {
    pub(crate) fn new(tag: &'a Tag, path: Vec<&'a str>, id_path: Vec<&'a TagId>) -> Self {
        Self { tag, path, id_path }
    }

    /// Returns the tag this record was flattened from.
    pub fn tag(&self) -> &'a Tag {
        self.tag
    }

    pub fn id(&self) -> &'a TagId {
        self.tag.id()
    }

    /// Returns the trimmed tag name.
    pub fn name(&self) -> &'a str {
        self.path.last().copied().unwrap_or_default()
    }

    pub fn description(&self) -> &'a str {
        self.tag.description()
    }

    pub fn examples(&self) -> &'a [String] {
        self.tag.examples()
    }

    pub fn children(&self) -> &'a [Tag] {
        self.tag.children()
    }

    /// Depth in the tree, 1 for top-level tags.
    pub fn level(&self) -> usize {
        self.path.len()
    }

    pub fn is_top_level(&self) -> bool {
        self.level() == 1
    }

    /// Ancestor names followed by the tag's own name.
    pub fn path(&self) -> &[&'a str] {
        &self.path
    }

    /// Ancestor ids followed by the tag's own id.
    pub fn id_path(&self) -> &[&'a TagId] {
        &self.id_path
    }

    /// Returns the path joined as `"Parent > Child"`.
    pub fn path_label(&self) -> String {
        self.path.join(" > ")
    }

    /// Returns the path label of every ancestor, outermost first.
    pub fn ancestors(&self) -> Vec<String> {
        (1..self.path.len())
            .map(|end| self.path[..end].join(" > "))
            .collect()
    }

    pub fn parent_id(&self) -> Option<&'a TagId> {
        let len = self.id_path.len();
        if len > 1 {
            Some(self.id_path[len - 2])
        } else {
            None
        }
    }
}
