use std::io::Read;
use std::path::Path;

use indexmap::IndexMap;
use thiserror::Error;

use crate::models::Tag;

const REQUIRED_HEADERS: [&str; 3] = ["tag", "description", "example"];

/// Errors that can occur when importing tag definitions from CSV.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The file could not be read or is not valid CSV
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// One or more of the `Tag`, `Description`, `Example` columns is absent
    #[error("CSV must include columns named Tag, Description, and Example (missing: {})", .0.join(", "))]
    MissingHeaders(Vec<String>),

    /// No row carried a tag name
    #[error("no valid tags were found; each row needs a Tag value")]
    NoTags,
}

/// Imports tag definitions from a three-column CSV.
///
/// The `Tag`, `Description` and `Example` headers are matched
/// case-insensitively. Rows sharing a tag name are grouped into one tag, in
/// first-seen order: the first non-empty description wins and every
/// non-empty example is appended. Rows without a name are skipped.
///
/// # Examples
///
/// ```
/// use dtag::taxonomy::import_csv;
///
/// let csv = "Tag,Description,Example\n\
///            Positive,Praise,Love it\n\
///            Positive,,Works great\n\
///            Feature Request,Asks for something new,Add dark mode\n";
/// let tags = import_csv(csv.as_bytes()).unwrap();
///
/// assert_eq!(tags.len(), 2);
/// assert_eq!(tags[0].examples(), &["Love it", "Works great"]);
/// ```
pub fn import_csv<R: Read>(reader: R) -> Result<Vec<Tag>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let position = |wanted: &str| {
        headers
            .iter()
            .position(|header| header.trim().eq_ignore_ascii_case(wanted))
    };

    let missing: Vec<String> = REQUIRED_HEADERS
        .iter()
        .filter(|header| position(header).is_none())
        .map(|header| header.to_string())
        .collect();
    let (Some(tag_col), Some(desc_col), Some(example_col)) =
        (position("tag"), position("description"), position("example"))
    else {
        return Err(ImportError::MissingHeaders(missing));
    };

    let mut grouped: IndexMap<String, (String, Vec<String>)> = IndexMap::new();
    for record in csv_reader.records() {
        let record = record?;
        let field = |index: usize| record.get(index).unwrap_or_default().trim();

        let name = field(tag_col);
        if name.is_empty() {
            continue;
        }

        let (description, examples) = grouped.entry(name.to_string()).or_default();
        let row_description = field(desc_col);
        if description.is_empty() && !row_description.is_empty() {
            *description = row_description.to_string();
        }
        let example = field(example_col);
        if !example.is_empty() {
            examples.push(example.to_string());
        }
    }

    if grouped.is_empty() {
        return Err(ImportError::NoTags);
    }

    Ok(grouped
        .into_iter()
        .map(|(name, (description, examples))| {
            Tag::new(name)
                .with_description(description)
                .with_examples(examples)
        })
        .collect())
}

/// Imports tag definitions from a CSV file on disk.
///
/// # Errors
///
/// Returns [`ImportError::Csv`] when the file cannot be opened, plus every
/// error [`import_csv`] can return.
pub fn import_csv_path(path: &Path) -> Result<Vec<Tag>, ImportError> {
    let file = std::fs::File::open(path).map_err(csv::Error::from)?;
    import_csv(file)
}
