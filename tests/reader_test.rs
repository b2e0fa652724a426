//! Reading sessions opened from mocked Drive content.

mod common;

use bookshell::{Book, BookFormat, BookshellError, PageLayout, Reader, ReadingSession};
use common::{client, mock_content, mock_token};
use mockito::Server;

fn book(id: &str, format: BookFormat, position: usize) -> Book {
    Book {
        id: id.to_string(),
        title: "Test Book".to_string(),
        file_name: "test".to_string(),
        format,
        category: None,
        size: None,
        position,
        length: None,
        drive_status: None,
        description: None,
    }
}

fn numbered_lines(n: usize) -> String {
    (1..=n)
        .map(|i| format!("line {}", i))
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn test_zero_length_book_has_no_pages() {
    let mut server = Server::new_async().await;
    mock_token(&mut server).await;
    mock_content(&mut server, "empty", b"").await;

    let client = client(&server);
    let reader = Reader::new(&client, PageLayout::new(40, 10));
    let mut session = reader
        .open(&book("empty", BookFormat::Text, 0))
        .await
        .unwrap();

    assert!(session.is_empty());
    assert_eq!(session.pages().count(), 0);
    assert!(session.render().is_none());
    assert_eq!(session.close(), 0);
}

#[tokio::test]
async fn test_open_resumes_and_clamps_stored_position() {
    let mut server = Server::new_async().await;
    mock_token(&mut server).await;
    let text = numbered_lines(20);
    mock_content(&mut server, "f1", text.as_bytes()).await;

    let client = client(&server);
    let reader = Reader::new(&client, PageLayout::new(40, 5));

    let session = reader.open(&book("f1", BookFormat::Text, 30)).await.unwrap();
    assert_eq!(session.position(), 30);

    let session = reader
        .open(&book("f1", BookFormat::Text, 1_000_000))
        .await
        .unwrap();
    assert_eq!(session.position(), text.len());
    assert!(session.is_finished());
}

#[tokio::test]
async fn test_corrupt_epub_is_format_error() {
    let mut server = Server::new_async().await;
    mock_token(&mut server).await;
    mock_content(&mut server, "bad", b"PK\x03\x04 not really a zip").await;

    let client = client(&server);
    let reader = Reader::new(&client, PageLayout::default());
    let result = reader.open(&book("bad", BookFormat::Epub, 0)).await;
    assert!(matches!(result, Err(BookshellError::FormatError(_))));
}

#[tokio::test]
async fn test_missing_book_is_not_found() {
    let mut server = Server::new_async().await;
    mock_token(&mut server).await;
    server
        .mock("GET", "/files/gone")
        .match_query(mockito::Matcher::Any)
        .with_status(404)
        .create_async()
        .await;

    let client = client(&server);
    let reader = Reader::new(&client, PageLayout::default());
    let err = reader
        .open(&book("gone", BookFormat::Text, 0))
        .await
        .err()
        .unwrap();
    assert!(err.is_not_found());
}

#[test]
fn test_render_walks_every_page_once() {
    let text = numbered_lines(12);
    let mut session = ReadingSession::new("b", "B", text.clone(), PageLayout::new(20, 5));

    let mut seen = Vec::new();
    while let Some(page) = session.render() {
        seen.push(page.lines.iter().map(|l| l.to_string()).collect::<Vec<_>>());
    }

    assert_eq!(seen.len(), 3);
    assert_eq!(seen.concat().join("\n"), text);
    assert!(session.is_finished());
    assert_eq!(session.close(), text.len());
}

#[test]
fn test_render_from_middle_of_page() {
    let text = numbered_lines(10);
    let mut session = ReadingSession::new("b", "B", text, PageLayout::new(20, 5));

    // Somewhere inside "line 3": still the first page.
    session.seek(15);
    let first = session.render().unwrap();
    assert_eq!(first.number, 0);
    let end = first.end;
    assert_eq!(session.position(), end);
    assert_eq!(session.render().unwrap().number, 1);
    assert!(session.render().is_none());
}

#[test]
fn test_pages_are_restartable() {
    let session = ReadingSession::new("b", "B", numbered_lines(9), PageLayout::new(20, 4));

    let first: Vec<String> = session.pages().map(|p| p.to_string()).collect();
    let second: Vec<String> = session.pages().map(|p| p.to_string()).collect();
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);

    let tail: Vec<usize> = session.pages_from(first[0].len() + 1).map(|p| p.number).collect();
    assert_eq!(tail, vec![1, 2]);
    assert_eq!(session.pages_from(usize::MAX).count(), 0);
}

#[test]
fn test_seek_beyond_end_clamps() {
    let mut session = ReadingSession::new("b", "B", "short text".to_string(), PageLayout::default());
    assert_eq!(session.seek(500), 10);
    assert_eq!(session.position(), 10);
    assert!(session.render().is_none());

    let mut empty = ReadingSession::new("e", "E", String::new(), PageLayout::default());
    assert_eq!(empty.seek(7), 0);
}

#[test]
fn test_relayout_keeps_position() {
    let text = "word ".repeat(200);
    let mut session = ReadingSession::new("b", "B", text.trim_end().to_string(), PageLayout::new(80, 10));
    session.seek(400);
    let before = session.position();

    session.relayout(PageLayout::new(30, 6));
    assert_eq!(session.position(), before);
    let page = session.current_page().unwrap();
    assert!(page.start <= before && before < page.end);
    assert!(page.lines.iter().all(|l| l.chars().count() <= 30));
}
