//! Catalog entries for books found on the drive.

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::RemoteBook;

/// Content formats the reader knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    Text,
    Markdown,
    Epub,
    Pdf,
    Unknown,
}

impl BookFormat {
    /// Detect the format from the Drive MIME type, falling back to the
    /// file extension.
    pub fn detect(name: &str, mime_type: Option<&str>) -> Self {
        let by_mime = match mime_type {
            Some("application/epub+zip") => Some(BookFormat::Epub),
            Some("application/pdf") => Some(BookFormat::Pdf),
            Some("text/markdown") | Some("text/x-markdown") => Some(BookFormat::Markdown),
            Some("text/plain") => Some(BookFormat::Text),
            _ => None,
        };
        by_mime
            .or_else(|| Self::from_extension(name))
            .unwrap_or(BookFormat::Unknown)
    }

    fn from_extension(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "text" => Some(BookFormat::Text),
            "md" | "markdown" => Some(BookFormat::Markdown),
            "epub" => Some(BookFormat::Epub),
            "pdf" => Some(BookFormat::Pdf),
            _ => None,
        }
    }
}

impl fmt::Display for BookFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BookFormat::Text => "text",
            BookFormat::Markdown => "markdown",
            BookFormat::Epub => "epub",
            BookFormat::Pdf => "pdf",
            BookFormat::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Status tags as they appear in Drive descriptions, with trailing blanks.
static STATUS_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[(?:reading|finished)\]\s*").expect("Invalid status tag regex"));

/// Reading status shown in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    New,
    Reading,
    Finished,
}

impl BookStatus {
    /// Read a `[reading]` / `[finished]` tag from a Drive file description.
    pub fn from_description(description: &str) -> Option<Self> {
        let lower = description.to_ascii_lowercase();
        if lower.contains("[finished]") {
            Some(BookStatus::Finished)
        } else if lower.contains("[reading]") {
            Some(BookStatus::Reading)
        } else {
            None
        }
    }
}

/// `description` with its status tag replaced by the one for `status`.
/// Other text is kept; `New` only strips the tag.
pub fn description_with_status(description: Option<&str>, status: BookStatus) -> String {
    let rest = STATUS_TAG.replace_all(description.unwrap_or(""), "");
    let rest = rest.trim();
    let tag = match status {
        BookStatus::New => return rest.to_string(),
        BookStatus::Reading => "[reading]",
        BookStatus::Finished => "[finished]",
    };
    if rest.is_empty() {
        tag.to_string()
    } else {
        format!("{} {}", tag, rest)
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BookStatus::New => "new",
            BookStatus::Reading => "reading",
            BookStatus::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// One remote file plus the reading metadata kept for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Drive file ID.
    pub id: String,
    pub title: String,
    /// File name on the drive.
    pub file_name: String,
    pub format: BookFormat,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    /// Byte offset into the decoded text.
    #[serde(default)]
    pub position: usize,
    /// Decoded text length, known once the book has been opened.
    #[serde(default)]
    pub length: Option<usize>,
    #[serde(default)]
    pub drive_status: Option<BookStatus>,
    /// Drive description the status tag was read from.
    #[serde(default)]
    pub description: Option<String>,
}

impl Book {
    pub fn from_remote(remote: &RemoteBook) -> Self {
        let file = &remote.file;
        let format = BookFormat::detect(&file.name, file.mime_type.as_deref());
        Self {
            id: file.id.clone(),
            title: title_from_file_name(&file.name),
            file_name: file.name.clone(),
            format,
            category: remote.category.clone(),
            size: file.size,
            position: 0,
            length: None,
            drive_status: file
                .description
                .as_deref()
                .and_then(BookStatus::from_description),
            description: file.description.clone(),
        }
    }

    pub fn has_progress(&self) -> bool {
        self.position > 0 || self.length.is_some()
    }

    /// The status to write back to Drive, when local progress has moved
    /// past what the description says.
    pub fn status_to_publish(&self) -> Option<BookStatus> {
        match self.status() {
            BookStatus::New => None,
            status if self.drive_status == Some(status) => None,
            status => Some(status),
        }
    }

    /// Local progress wins over the Drive description tag.
    pub fn status(&self) -> BookStatus {
        match self.length {
            Some(len) if len > 0 && self.position >= len => BookStatus::Finished,
            _ if self.position > 0 => BookStatus::Reading,
            _ => self.drive_status.unwrap_or(BookStatus::New),
        }
    }

    /// Whole-number percentage read, when the length is known.
    pub fn percent(&self) -> Option<u8> {
        match self.length {
            Some(0) => Some(100),
            Some(len) => Some((self.position.min(len) * 100 / len) as u8),
            None => None,
        }
    }

    /// "42%" when the length is known, otherwise the status.
    pub fn progress_label(&self) -> String {
        match (self.status(), self.percent()) {
            (BookStatus::Reading, Some(p)) => format!("{}%", p),
            (status, _) => status.to_string(),
        }
    }
}

/// Strip a recognised book extension from a file name.
pub fn title_from_file_name(name: &str) -> String {
    let path = Path::new(name);
    match (BookFormat::from_extension(name), path.file_stem()) {
        (Some(_), Some(stem)) => stem.to_string_lossy().into_owned(),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RemoteFile;

    fn remote(name: &str, mime: Option<&str>, description: Option<&str>) -> RemoteBook {
        RemoteBook {
            file: RemoteFile {
                id: "f1".to_string(),
                name: name.to_string(),
                mime_type: mime.map(str::to_string),
                size: Some(10),
                description: description.map(str::to_string),
                parents: vec![],
            },
            category: Some("SciFi".to_string()),
        }
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(BookFormat::detect("a.epub", None), BookFormat::Epub);
        assert_eq!(BookFormat::detect("a.PDF", None), BookFormat::Pdf);
        assert_eq!(BookFormat::detect("notes", Some("text/plain")), BookFormat::Text);
        assert_eq!(BookFormat::detect("readme.md", Some("application/octet-stream")), BookFormat::Markdown);
        assert_eq!(BookFormat::detect("Dune", None), BookFormat::Unknown);
    }

    #[test]
    fn test_title_from_file_name() {
        assert_eq!(title_from_file_name("Dune.epub"), "Dune");
        assert_eq!(title_from_file_name("Dune"), "Dune");
        assert_eq!(title_from_file_name("v1.2 notes.txt"), "v1.2 notes");
        assert_eq!(title_from_file_name("archive.tar.gz"), "archive.tar.gz");
    }

    #[test]
    fn test_from_remote() {
        let book = Book::from_remote(&remote("Dune.epub", Some("application/epub+zip"), Some("[Reading] chapter 3")));
        assert_eq!(book.id, "f1");
        assert_eq!(book.title, "Dune");
        assert_eq!(book.format, BookFormat::Epub);
        assert_eq!(book.category.as_deref(), Some("SciFi"));
        assert_eq!(book.drive_status, Some(BookStatus::Reading));
        assert_eq!(book.status(), BookStatus::Reading);
    }

    #[test]
    fn test_status_prefers_local_progress() {
        let mut book = Book::from_remote(&remote("Dune.txt", None, Some("[finished]")));
        assert_eq!(book.status(), BookStatus::Finished);

        book.position = 50;
        book.length = Some(200);
        assert_eq!(book.status(), BookStatus::Reading);
        assert_eq!(book.percent(), Some(25));
        assert_eq!(book.progress_label(), "25%");

        book.position = 200;
        assert_eq!(book.status(), BookStatus::Finished);
        assert_eq!(book.progress_label(), "finished");
    }

    #[test]
    fn test_description_with_status() {
        assert_eq!(description_with_status(None, BookStatus::Reading), "[reading]");
        assert_eq!(
            description_with_status(Some("[Reading] gift from Ana"), BookStatus::Finished),
            "[finished] gift from Ana"
        );
        assert_eq!(
            description_with_status(Some("gift from Ana [finished]"), BookStatus::New),
            "gift from Ana"
        );
    }

    #[test]
    fn test_status_to_publish() {
        let mut book = Book::from_remote(&remote("Dune.txt", None, Some("[reading]")));
        assert_eq!(book.status_to_publish(), None);

        book.position = 10;
        book.length = Some(200);
        assert_eq!(book.status_to_publish(), None);

        book.position = 200;
        assert_eq!(book.status_to_publish(), Some(BookStatus::Finished));

        // Rewinding to the start never clears the tag on Drive.
        book.position = 0;
        book.length = None;
        book.drive_status = None;
        assert_eq!(book.status_to_publish(), None);
    }

    #[test]
    fn test_new_book_without_tag() {
        let book = Book::from_remote(&remote("Dune.txt", None, None));
        assert_eq!(book.status(), BookStatus::New);
        assert_eq!(book.percent(), None);
        assert_eq!(book.progress_label(), "new");
    }
}
