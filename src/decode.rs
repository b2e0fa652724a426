//! Turn downloaded book bytes into plain text.

use std::borrow::Cow;
use std::io::Cursor;

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use epub::doc::EpubDoc;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, warn};

use crate::book::BookFormat;
use crate::error::{BookshellError, Result};

/// Elements that start a new line of output when flattened.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "aside", "nav", "h1", "h2", "h3",
    "h4", "h5", "h6", "li", "ul", "ol", "dl", "dt", "dd", "blockquote", "pre", "table", "tr",
    "figure", "figcaption", "hr",
];

/// Decode `bytes` according to `format`.
pub fn decode(format: BookFormat, bytes: &[u8]) -> Result<String> {
    if bytes.is_empty() {
        return Ok(String::new());
    }

    let text = match format {
        BookFormat::Text | BookFormat::Markdown => decode_text(bytes),
        BookFormat::Epub => decode_epub(bytes)?,
        BookFormat::Pdf => decode_pdf(bytes)?,
        BookFormat::Unknown => decode_unknown(bytes)?,
    };

    Ok(normalize(&text))
}

/// BOM first, then strict UTF-8, then Windows-1252 as a last resort.
fn decode_text(bytes: &[u8]) -> String {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return text.into_owned();
    }

    if let Some(text) = UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
        return text.into_owned();
    }

    warn!("text is not valid UTF-8, decoding as Windows-1252");
    let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
    text.into_owned()
}

fn decode_unknown(bytes: &[u8]) -> Result<String> {
    if bytes.contains(&0) {
        return Err(BookshellError::FormatError(
            "unrecognised binary content".to_string(),
        ));
    }
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| BookshellError::FormatError("unrecognised format and not UTF-8 text".to_string()))
}

fn decode_epub(bytes: &[u8]) -> Result<String> {
    let mut doc = EpubDoc::from_reader(Cursor::new(bytes.to_vec()))
        .map_err(|e| BookshellError::FormatError(format!("EPUB: {}", e)))?;

    let mut chapters = Vec::new();
    for i in 0..doc.get_num_chapters() {
        if !doc.set_current_chapter(i) {
            continue;
        }
        match doc.get_current_str() {
            Some((html, _mime)) => {
                let text = html_to_text(&html);
                if !text.trim().is_empty() {
                    chapters.push(text);
                }
            }
            None => debug!(chapter = i, "skipping unreadable EPUB chapter"),
        }
    }

    Ok(chapters.join("\n\n"))
}

fn decode_pdf(bytes: &[u8]) -> Result<String> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| BookshellError::FormatError(format!("PDF: {}", e)))?;

    if text.trim().is_empty() {
        return Err(BookshellError::FormatError(
            "PDF has no extractable text (scanned images?)".to_string(),
        ));
    }
    Ok(text)
}

/// Flatten an XHTML chapter into lines of text.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").expect("Invalid body selector");

    let mut out = String::new();
    match document.select(&body_selector).next() {
        Some(body) => flatten(body, &mut out),
        None => flatten(document.root_element(), &mut out),
    }
    out
}

fn flatten(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => push_inline(out, text),
            Node::Element(el) => {
                let name = el.name();
                if matches!(name, "script" | "style" | "head") {
                    continue;
                }
                if name == "br" {
                    out.push('\n');
                    continue;
                }

                let is_block = BLOCK_TAGS.contains(&name);
                if is_block {
                    break_line(out);
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    if name == "pre" {
                        out.push_str(&child_el.text().collect::<String>());
                    } else {
                        flatten(child_el, out);
                    }
                }
                if is_block {
                    break_line(out);
                }
            }
            _ => {}
        }
    }
}

/// Append inline text with HTML whitespace collapsing.
fn push_inline(out: &mut String, text: &str) {
    let at_line_start = out.is_empty() || out.ends_with('\n');
    let mut pending_space = text.starts_with(char::is_whitespace) && !at_line_start;

    for word in text.split_whitespace() {
        if pending_space && !out.ends_with(' ') {
            out.push(' ');
        }
        out.push_str(word);
        pending_space = true;
    }

    if text.ends_with(char::is_whitespace) && !out.is_empty() && !out.ends_with(['\n', ' ']) {
        out.push(' ');
    }
}

fn break_line(out: &mut String) {
    while out.ends_with(' ') {
        out.pop();
    }
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Columns between tab stops.
const TAB_WIDTH: usize = 4;

fn expand_tabs(line: &str) -> Cow<'_, str> {
    if !line.contains('\t') {
        return Cow::Borrowed(line);
    }
    let mut out = String::with_capacity(line.len() + TAB_WIDTH);
    let mut column = 0;
    for c in line.chars() {
        if c == '\t' {
            let pad = TAB_WIDTH - column % TAB_WIDTH;
            out.extend(std::iter::repeat(' ').take(pad));
            column += pad;
        } else {
            out.push(c);
            column += 1;
        }
    }
    Cow::Owned(out)
}

/// LF line endings, tabs expanded, no trailing spaces, at most one blank
/// line in a row, no trailing blank lines.
pub fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(unified.len());
    let mut blank_run = 0;
    for line in unified.split('\n') {
        let line = expand_tabs(line);
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 || out.is_empty() {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }

    out.truncate(out.trim_end().len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_with_bom() {
        let bytes = b"\xEF\xBB\xBFCall me Ishmael.";
        assert_eq!(decode(BookFormat::Text, bytes).unwrap(), "Call me Ishmael.");
    }

    #[test]
    fn test_windows_1252_fallback() {
        let bytes = b"caf\xe9";
        assert_eq!(decode(BookFormat::Text, bytes).unwrap(), "café");
    }

    #[test]
    fn test_empty_content_is_empty_text() {
        assert_eq!(decode(BookFormat::Epub, b"").unwrap(), "");
        assert_eq!(decode(BookFormat::Pdf, b"").unwrap(), "");
    }

    #[test]
    fn test_unknown_format() {
        assert_eq!(decode(BookFormat::Unknown, b"plain words").unwrap(), "plain words");
        assert!(matches!(
            decode(BookFormat::Unknown, b"\x00\x01\x02"),
            Err(BookshellError::FormatError(_))
        ));
        assert!(matches!(
            decode(BookFormat::Unknown, b"\xff\xfe\xfd"),
            Err(BookshellError::FormatError(_))
        ));
    }

    #[test]
    fn test_corrupt_epub_and_pdf() {
        assert!(matches!(
            decode(BookFormat::Epub, b"definitely not a zip"),
            Err(BookshellError::FormatError(_))
        ));
        assert!(matches!(
            decode(BookFormat::Pdf, b"definitely not a pdf"),
            Err(BookshellError::FormatError(_))
        ));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("a  \r\nb\r\n\r\n\r\n\r\nc\n\n"), "a\nb\n\nc");
        assert_eq!(normalize("\n\nstart"), "start");
        assert_eq!(normalize("   \n  "), "");
        assert_eq!(normalize("a\tb\n\tindented\t"), "a   b\n    indented");
    }

    #[test]
    fn test_html_to_text() {
        let html = r#"<html><head><title>Ch 1</title><style>p{}</style></head>
            <body>
              <h1>Chapter  One</h1>
              <p>It was a <em>bright</em>
                 cold day.</p>
              <p>Line one<br/>Line two</p>
            </body></html>"#;
        let text = normalize(&html_to_text(html));
        assert_eq!(text, "Chapter One\nIt was a bright cold day.\nLine one\nLine two");
    }
}
