//! Turn Drive share links into bare file or folder IDs.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{BookshellError, Result};

/// Share-link shapes, each capturing the ID in group 1.
static LINK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // drive.google.com/drive/folders/<ID>, optionally under /u/<n>/
        r"^https?://drive\.google\.com/drive/(?:u/\d+/)?folders/([a-zA-Z0-9_-]+)",
        // drive.google.com/file/d/<ID>/view
        r"^https?://drive\.google\.com/file/d/([a-zA-Z0-9_-]+)",
        // drive.google.com/open?id=<ID> and drive.google.com/uc?id=<ID>&export=download
        r"^https?://drive\.google\.com/(?:open|uc)\?(?:[^#]*&)?id=([a-zA-Z0-9_-]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid Drive link regex"))
    .collect()
});

/// Bare IDs use the URL-safe base64 alphabet.
static ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("Invalid ID regex"));

/// The Drive ID behind a share link, or the input itself when it already is
/// a bare ID.
///
/// ```
/// use bookshell::url_parser::extract_id;
///
/// assert_eq!(
///     extract_id("https://drive.google.com/open?id=1DuneEpub").unwrap(),
///     "1DuneEpub"
/// );
/// assert_eq!(extract_id(" 1DuneEpub ").unwrap(), "1DuneEpub");
/// assert!(extract_id("not an id!").is_err());
/// ```
pub fn extract_id(url_or_id: &str) -> Result<String> {
    let trimmed = url_or_id.trim();

    if let Some(id) = LINK_PATTERNS
        .iter()
        .find_map(|re| re.captures(trimmed).and_then(|c| c.get(1)))
    {
        return Ok(id.as_str().to_string());
    }

    if ID_REGEX.is_match(trimmed) {
        return Ok(trimmed.to_string());
    }

    Err(BookshellError::InvalidUrlOrId(url_or_id.to_string()))
}

/// True when the input is a Drive link rather than a bare ID or a title.
pub fn is_drive_link(input: &str) -> bool {
    let trimmed = input.trim();
    LINK_PATTERNS.iter().any(|re| re.is_match(trimmed))
}
