//! URL keys for result deduplication.
//!
//! Two results point at the same page when their URLs agree after the
//! query string and fragment are dropped and the text is case-folded.

use url::Url;

/// Dedup key for `raw`.
///
/// Parseable URLs go through [`Url`] so equivalent spellings (default
/// ports, host case, a bare host with or without its root slash) collapse
/// before case-folding. Anything else is cut at the first `?` or `#` and
/// lowercased.
///
/// # Examples
///
/// ```
/// use switchyard_router::ranking::url_normalize::dedup_key;
///
/// let a = dedup_key("https://Example.COM/Path?utm_source=x#top");
/// let b = dedup_key("https://example.com/path");
/// assert_eq!(a, b);
/// ```
pub fn dedup_key(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.as_str().to_lowercase()
        }
        Err(_) => {
            let end = trimmed.find(['?', '#']).unwrap_or(trimmed.len());
            trimmed[..end].to_lowercase()
        }
    }
}
