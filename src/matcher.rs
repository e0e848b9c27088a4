//! Maps raw model replies onto the known tag set.
//!
//! Model output is untrusted text. Matching never fails; unknown segments are
//! dropped and reported at `info` level.

use tracing::info;

const QUOTE_CHARS: [char; 2] = ['"', '\''];

/// Extracts the known tag names mentioned in a comma-separated reply.
///
/// # Matching rules
///
/// - Splits on commas and trims each segment
/// - Strips one wrapping quote character from either end
/// - Drops empty segments and the literal `none` (any casing)
/// - Matches the rest case-insensitively against `known_tags`
/// - Returns the canonical stored spelling, each name once, in the order
///   the reply first mentions it
///
/// # Examples
///
/// ```
/// use dtag::matcher::match_tags;
///
/// let known = ["Positive", "Shipping", "Negative"];
/// assert_eq!(match_tags("Positive, none, Shipping", &known), vec!["Positive", "Shipping"]);
/// assert_eq!(match_tags("\"positive\"", &known), vec!["Positive"]);
/// assert!(match_tags("None", &known).is_empty());
/// ```
pub fn match_tags<S: AsRef<str>>(raw_text: &str, known_tags: &[S]) -> Vec<String> {
    let mut matched: Vec<String> = Vec::new();
    let mut unmatched: Vec<&str> = Vec::new();

    for segment in raw_text.split(',').map(clean_segment) {
        if segment.is_empty() || segment.eq_ignore_ascii_case("none") {
            continue;
        }

        let canonical = known_tags
            .iter()
            .map(|known| known.as_ref())
            .find(|known| known.to_lowercase() == segment.to_lowercase());

        match canonical {
            Some(name) => {
                if !matched.iter().any(|existing| existing == name) {
                    matched.push(name.to_string());
                }
            }
            None => unmatched.push(segment),
        }
    }

    if !unmatched.is_empty() {
        info!(?unmatched, "model returned tags that are not in the tag list");
    }

    matched
}

fn clean_segment(segment: &str) -> &str {
    let trimmed = segment.trim();
    let trimmed = trimmed.strip_prefix(QUOTE_CHARS).unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix(QUOTE_CHARS).unwrap_or(trimmed);
    trimmed.trim()
}
