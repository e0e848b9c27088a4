//! Classification prompt rendering.
//!
//! The same prompt is sent to every provider. Tag definitions are rendered
//! once per job by [`PromptBuilder`]; only the comment changes per row.

use std::fmt::Write as _;

use crate::models::FlatTag;

/// Shown in place of an empty tag description.
pub const NO_DESCRIPTION: &str = "No description provided";

const PROMPT_TEMPLATE: &str = r#"You are a survey response classifier. Your task is to analyze a comment and determine which tags apply.

AVAILABLE TAGS:
{definitions}

IMPORTANT INSTRUCTIONS:
- Read the comment carefully
- Compare it against each tag's description and examples
- A comment can have MULTIPLE tags, ONE tag, or NO tags
- Return ONLY the tag names that apply, separated by commas
- Tag names must match EXACTLY as listed above (capitalization does not matter)
- If no tags apply, return an empty response or the single word None

COMMENT TO ANALYZE:
"{comment}"

YOUR RESPONSE (comma-separated tag names only):"#;

/// Renders classification prompts for a fixed tag set.
///
/// # Examples
///
/// ```
/// use dtag::Tag;
/// use dtag::prompt::PromptBuilder;
/// use dtag::taxonomy::flatten;
///
/// let tags = vec![Tag::new("Positive").with_examples(["Love it"])];
/// let builder = PromptBuilder::new(&flatten(&tags));
/// let prompt = builder.build("Great service!");
///
/// assert!(prompt.contains("1. \"Positive\""));
/// assert!(prompt.contains("Examples: \"Love it\""));
/// assert!(prompt.contains("\"Great service!\""));
/// ```
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    definitions: String,
    head: String,
    tail: String,
}

impl PromptBuilder {
    /// Renders the numbered tag definitions once.
    pub fn new(tags: &[FlatTag<'_>]) -> Self {
        let definitions = render_definitions(tags);
        let (head, tail) = PROMPT_TEMPLATE
            .split_once("{comment}")
            .unwrap_or((PROMPT_TEMPLATE, ""));

        Self {
            head: head.replace("{definitions}", &definitions),
            tail: tail.to_string(),
            definitions,
        }
    }

    /// Returns the full prompt for one comment.
    ///
    /// The comment is embedded verbatim between double quotes.
    pub fn build(&self, comment: &str) -> String {
        format!("{}{comment}{}", self.head, self.tail)
    }

    /// Returns the rendered tag definitions block.
    pub fn definitions(&self) -> &str {
        &self.definitions
    }
}

/// Builds the classification prompt for `comment` against `tags`.
///
/// Deterministic: the same inputs always produce the same string. Callers
/// are expected to skip blank comments rather than prompt for them.
pub fn build_prompt(comment: &str, tags: &[FlatTag<'_>]) -> String {
    PromptBuilder::new(tags).build(comment)
}

fn render_definitions(tags: &[FlatTag<'_>]) -> String {
    let mut blocks = Vec::with_capacity(tags.len());

    for (index, tag) in tags.iter().enumerate() {
        let mut block = format!("{}. \"{}\"", index + 1, tag.name());

        if let Some((_, parents)) = tag.path().split_last()
            && !parents.is_empty()
        {
            let _ = write!(block, "\n   Category: {}", parents.join(" > "));
        }

        let description = tag.description().trim();
        let description = if description.is_empty() {
            NO_DESCRIPTION
        } else {
            description
        };
        let _ = write!(block, "\n   Description: {description}");

        let examples: Vec<String> = tag
            .examples()
            .iter()
            .map(|example| example.trim())
            .filter(|example| !example.is_empty())
            .map(|example| format!("\"{example}\""))
            .collect();
        if !examples.is_empty() {
            let _ = write!(block, "\n   Examples: {}", examples.join(", "));
        }

        blocks.push(block);
    }

    blocks.join("\n\n")
}
