//! Reading sessions: decoded text laid out into terminal pages.
//!
//! A [`ReadingSession`] owns the decoded text of one book and a cursor into
//! it. Positions are byte offsets into the text and always sit on a
//! character boundary within `0..=len`. A position equal to the length means
//! the book has been read to the end.

use std::fmt;
use std::ops::Range;

use tracing::{debug, info};
use unicode_width::UnicodeWidthChar;

use crate::book::Book;
use crate::client::DriveClient;
use crate::decode::decode;
use crate::error::Result;

/// Width and height, in characters, of one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    pub width: usize,
    pub height: usize,
}

impl PageLayout {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }
}

impl Default for PageLayout {
    fn default() -> Self {
        Self::new(80, 24)
    }
}

/// One page of wrapped text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<'a> {
    /// Zero-based page index.
    pub number: usize,
    pub total: usize,
    /// Byte offset of the first character on the page.
    pub start: usize,
    /// Byte offset where the next page starts, or the text length.
    pub end: usize,
    pub lines: Vec<&'a str>,
}

impl Page<'_> {
    pub fn is_last(&self) -> bool {
        self.number + 1 == self.total
    }
}

impl fmt::Display for Page<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines.join("\n"))
    }
}

/// Greedy word wrap to `width` terminal columns. Each row is a byte range
/// into `text`; rows of blank lines are empty ranges at the line start.
fn wrap(text: &str, width: usize) -> Vec<Range<usize>> {
    let mut rows = Vec::new();
    if text.is_empty() {
        return rows;
    }

    let mut line_start = 0;
    for line in text.split('\n') {
        wrap_line(line, line_start, width, &mut rows);
        line_start += line.len() + 1;
    }
    rows
}

fn wrap_line(line: &str, offset: usize, width: usize, rows: &mut Vec<Range<usize>>) {
    if line.is_empty() {
        rows.push(offset..offset);
        return;
    }

    let chars: Vec<(usize, char)> = line.char_indices().collect();
    let mut row_start = 0;

    while row_start < chars.len() {
        // Skip the spaces a previous break left at the start of a row.
        while row_start < chars.len() && row_start > 0 && chars[row_start].1 == ' ' {
            row_start += 1;
        }
        if row_start >= chars.len() {
            break;
        }

        // First character that no longer fits. A row always takes at least
        // one character, even one wider than the page.
        let mut columns = 0;
        let mut limit = row_start;
        while limit < chars.len() {
            let w = chars[limit].1.width().unwrap_or(0);
            if columns + w > width && limit > row_start {
                break;
            }
            columns += w;
            limit += 1;
        }

        if limit >= chars.len() {
            rows.push(offset + chars[row_start].0..offset + line.len());
            break;
        }

        // Break at the last space that fits, or hard-split a long word.
        let break_at = (row_start + 1..=limit)
            .rev()
            .find(|&i| chars[i].1 == ' ')
            .unwrap_or(limit);

        let end_byte = chars[break_at].0;
        let row_text = &line[chars[row_start].0..end_byte];
        let trimmed_end = chars[row_start].0 + row_text.trim_end().len();
        rows.push(offset + chars[row_start].0..offset + trimmed_end);
        row_start = break_at;
    }
}

/// An open book: decoded text, its layout, and the reading position.
pub struct ReadingSession {
    book_id: String,
    title: String,
    text: String,
    layout: PageLayout,
    rows: Vec<Range<usize>>,
    position: usize,
}

impl ReadingSession {
    /// Start a session over already-decoded text at position 0.
    pub fn new(book_id: &str, title: &str, text: String, layout: PageLayout) -> Self {
        let rows = wrap(&text, layout.width);
        Self {
            book_id: book_id.to_string(),
            title: title.to_string(),
            text,
            layout,
            rows,
            position: 0,
        }
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Decoded content length in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn layout(&self) -> PageLayout {
        self.layout
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.text.len()
    }

    pub fn page_count(&self) -> usize {
        self.rows.len().div_ceil(self.layout.height)
    }

    /// Percentage of the text before the current position.
    pub fn percent(&self) -> u8 {
        if self.text.is_empty() {
            return 100;
        }
        (self.position * 100 / self.text.len()) as u8
    }

    /// Move to `position`, clamped to the content length and moved back to
    /// a character boundary. Returns the position actually used.
    pub fn seek(&mut self, position: usize) -> usize {
        let mut position = position.min(self.text.len());
        while !self.text.is_char_boundary(position) {
            position -= 1;
        }
        self.position = position;
        position
    }

    /// Re-wrap for a new terminal size. The position is kept.
    pub fn relayout(&mut self, layout: PageLayout) {
        if layout != self.layout {
            self.layout = layout;
            self.rows = wrap(&self.text, layout.width);
        }
    }

    /// Index of the page holding `position`, `None` past the end.
    fn page_index_at(&self, position: usize) -> Option<usize> {
        if position >= self.text.len() || self.rows.is_empty() {
            return None;
        }
        let row = self
            .rows
            .partition_point(|r| r.start <= position)
            .saturating_sub(1);
        Some(row / self.layout.height)
    }

    /// Page by zero-based index.
    pub fn page(&self, number: usize) -> Option<Page<'_>> {
        let height = self.layout.height;
        let first = number.checked_mul(height)?;
        if first >= self.rows.len() {
            return None;
        }
        let last = (first + height).min(self.rows.len());

        let end = self
            .rows
            .get(last)
            .map(|r| r.start)
            .unwrap_or(self.text.len());

        Some(Page {
            number,
            total: self.page_count(),
            start: self.rows[first].start,
            end,
            lines: self.rows[first..last]
                .iter()
                .map(|r| &self.text[r.clone()])
                .collect(),
        })
    }

    /// The page holding the current position.
    pub fn current_page(&self) -> Option<Page<'_>> {
        self.page_index_at(self.position).and_then(|n| self.page(n))
    }

    /// Return the page at the current position and advance past it.
    /// `None` once the end has been reached.
    pub fn render(&mut self) -> Option<Page<'_>> {
        let number = self.page_index_at(self.position)?;
        let end = self.page(number)?.end;
        self.position = end;
        self.page(number)
    }

    /// Lazy iterator over every page from the first.
    pub fn pages(&self) -> Pages<'_> {
        Pages {
            session: self,
            next: 0,
        }
    }

    /// Lazy iterator starting at the page holding `position`.
    pub fn pages_from(&self, position: usize) -> Pages<'_> {
        Pages {
            session: self,
            next: self.page_index_at(position).unwrap_or(usize::MAX),
        }
    }

    /// End the session, handing back the position to persist.
    pub fn close(self) -> usize {
        debug!(book = %self.book_id, position = self.position, "closing reading session");
        self.position
    }
}

/// Pages of a session, produced on demand.
pub struct Pages<'a> {
    session: &'a ReadingSession,
    next: usize,
}

impl<'a> Iterator for Pages<'a> {
    type Item = Page<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let page = self.session.page(self.next)?;
        self.next += 1;
        Some(page)
    }
}

/// Opens books from the drive into reading sessions.
pub struct Reader<'a> {
    client: &'a DriveClient,
    layout: PageLayout,
}

impl<'a> Reader<'a> {
    pub fn new(client: &'a DriveClient, layout: PageLayout) -> Self {
        Self { client, layout }
    }

    /// Fetch, decode and lay out `book`, resuming at its stored position.
    pub async fn open(&self, book: &Book) -> Result<ReadingSession> {
        let bytes = self.client.fetch_content(&book.id).await?;
        let text = decode(book.format, &bytes)?;
        info!(book = %book.id, format = %book.format, chars = text.len(), "opened book");

        let mut session = ReadingSession::new(&book.id, &book.title, text, self.layout);
        session.seek(book.position);
        Ok(session)
    }
}
