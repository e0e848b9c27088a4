//! Configuration errors shared by the provider adapter and the engine.

use thiserror::Error;

/// A run cannot start because its inputs are incomplete or inconsistent.
///
/// Surfaced to the caller immediately; never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Unknown provider: {0} (expected one of: google, openai, openrouter)")]
    UnknownProvider(String),

    #[error("API key is required")]
    MissingApiKey,

    #[error("Model is required")]
    MissingModel,

    #[error("A classifier client is required")]
    MissingClient,

    #[error("Target column is required")]
    MissingTargetColumn,

    #[error("Column \"{0}\" not found in dataset")]
    ColumnNotFound(String),

    #[error("At least one tag is required")]
    NoTags,

    #[error("Tag name \"{0}\" is used more than once (names are compared case-insensitively)")]
    DuplicateTagName(String),

    #[error("Tag name \"{0}\" contains a comma; replies are comma-separated, so it could never match")]
    TagNameContainsComma(String),

    #[error("Tag name \"{0}\" collides with an existing column (AI_Tags, AI_Error or an input column)")]
    TagNameCollidesWithColumn(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}
