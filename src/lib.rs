//! bookshell - browse and read the books kept in a Google Drive folder.
//!
//! This library provides:
//! - A Drive client that lists the library folder (one level of category
//!   subfolders) and fetches book content
//! - A library catalog cached on disk, carrying each book's reading position
//! - A reader that decodes text, Markdown, EPUB and PDF books and lays them
//!   out into terminal pages
//!
//! # Example
//!
//! ```no_run
//! use bookshell::{Authenticator, DriveClient, Library, PageLayout, Reader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let auth = Authenticator::from_file("token.json")?;
//!     let client = DriveClient::new(auth);
//!
//!     let mut library = Library::open("library.json")?;
//!     library.refresh(&client, "root-folder-id").await?;
//!
//!     let book = library.resolve("Dune")?.clone();
//!     let mut session = Reader::new(&client, PageLayout::default()).open(&book).await?;
//!     if let Some(page) = session.render() {
//!         println!("{}", page);
//!     }
//!     let length = session.len();
//!     library.update_position(&book.id, session.close(), Some(length))?;
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod book;
pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod library;
pub mod models;
pub mod pager;
pub mod reader;
pub mod url_parser;

// Re-exports for convenience
pub use auth::Authenticator;
pub use book::{Book, BookFormat, BookStatus};
pub use client::{DriveClient, Session, UploadOutcome};
pub use config::Config;
pub use error::{BookshellError, Result};
pub use library::{Library, LibraryIndex, RefreshSummary};
pub use models::{RemoteBook, RemoteFile};
pub use reader::{Page, PageLayout, Reader, ReadingSession};
pub use url_parser::extract_id;
