//! Tag definitions: normalization, cleaning, flattening and import.
//!
//! Tag editing happens outside the core and partial input is expected
//! mid-edit, so nothing here fails on malformed tag data. Normalization and
//! cleaning always return best-effort results; only CSV import reports errors,
//! because it reads an external file.
//!
//! # Examples
//!
//! ```
//! use dtag::taxonomy::{flatten, TagNormalizer};
//!
//! let raw = serde_json::json!([
//!     {"name": " Shipping ", "children": [{"name": "Late delivery"}]},
//!     {"name": "   "},
//! ]);
//!
//! let tags = TagNormalizer::clean(&TagNormalizer::normalize(&raw));
//! let names: Vec<_> = flatten(&tags).iter().map(|t| t.path_label()).collect();
//!
//! assert_eq!(names, vec!["Shipping", "Shipping > Late delivery"]);
//! ```

mod import;
mod normalizer;
mod tree;

pub use import::{ImportError, import_csv, import_csv_path};
pub use normalizer::TagNormalizer;
pub use tree::{
    TagIssue, column_collisions, duplicate_names, find_by_id_path, flatten, names_with_commas,
    validate,
};

/// Maximum nesting depth of a tag tree; the root level is 1.
pub const MAX_TAG_LEVEL: usize = 3;

/// Longest accepted tag name, in characters.
pub const MAX_NAME_CHARS: usize = 100;

/// Longest accepted tag description, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 500;
