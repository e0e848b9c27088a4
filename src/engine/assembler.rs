use crate::models::Row;

/// Column holding the matched tag names, joined with `", "`.
pub const AI_TAGS_COLUMN: &str = "AI_Tags";

/// Column holding a row's error message; present only on failed rows.
pub const AI_ERROR_COLUMN: &str = "AI_Error";

/// Error text given to every row left unprocessed by a quota failure.
pub const QUOTA_STOP_MESSAGE: &str = "Processing stopped due to API quota/rate limit";

/// Builds an output row from an input row and its classification.
///
/// The original columns come first, unchanged, followed by `AI_Tags`, one
/// `"1"`/`"0"` column per entry in `tag_columns`, and `AI_Error` when
/// `error` is set. A tag column is `"1"` only if its name is in `matched`.
///
/// # Examples
///
/// ```
/// use dtag::Row;
/// use dtag::engine::assemble_row;
///
/// let row: Row = [("id", "1"), ("comment", "Great service!")].into_iter().collect();
/// let columns = vec!["Positive".to_string(), "Negative".to_string()];
/// let out = assemble_row(&row, &["Positive".to_string()], &columns, None);
///
/// assert_eq!(out.get("AI_Tags"), Some("Positive"));
/// assert_eq!(out.get("Positive"), Some("1"));
/// assert_eq!(out.get("Negative"), Some("0"));
/// assert!(!out.contains("AI_Error"));
/// ```
pub fn assemble_row(
    original: &Row,
    matched: &[String],
    tag_columns: &[String],
    error: Option<&str>,
) -> Row {
    let mut row = original.clone();
    row.insert(AI_TAGS_COLUMN, matched.join(", "));

    for column in tag_columns {
        let flag = if matched.contains(column) { "1" } else { "0" };
        row.insert(column.as_str(), flag);
    }

    if let Some(error) = error {
        row.insert(AI_ERROR_COLUMN, error);
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<String> {
        vec!["Positive".to_string(), "Negative".to_string()]
    }

    fn input() -> Row {
        [("id", "3"), ("comment", "Terrible, slow.")]
            .into_iter()
            .collect()
    }

    #[test]
    fn original_columns_come_first() {
        let out = assemble_row(&input(), &["Negative".to_string()], &columns(), None);

        assert_eq!(
            out.columns().collect::<Vec<_>>(),
            vec!["id", "comment", "AI_Tags", "Positive", "Negative"]
        );
        assert_eq!(out.get("comment"), Some("Terrible, slow."));
    }

    #[test]
    fn multiple_matches_are_comma_joined() {
        let matched = vec!["Positive".to_string(), "Negative".to_string()];
        let out = assemble_row(&input(), &matched, &columns(), None);

        assert_eq!(out.get("AI_Tags"), Some("Positive, Negative"));
        assert_eq!(out.get("Positive"), Some("1"));
        assert_eq!(out.get("Negative"), Some("1"));
    }

    #[test]
    fn nested_matches_appear_in_ai_tags_without_a_column() {
        let matched = vec!["Late delivery".to_string()];
        let out = assemble_row(&input(), &matched, &columns(), None);

        assert_eq!(out.get("AI_Tags"), Some("Late delivery"));
        assert!(!out.contains("Late delivery"));
        assert_eq!(out.get("Positive"), Some("0"));
    }

    #[test]
    fn error_rows_have_zero_columns_and_message() {
        let out = assemble_row(&input(), &[], &columns(), Some("Network error"));

        assert_eq!(out.get("AI_Tags"), Some(""));
        assert_eq!(out.get("Positive"), Some("0"));
        assert_eq!(out.get("Negative"), Some("0"));
        assert_eq!(out.get("AI_Error"), Some("Network error"));
        assert_eq!(out.columns().last(), Some("AI_Error"));
    }
}
