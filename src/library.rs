//! The book catalog and its on-disk cache.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::book::{Book, BookStatus};
use crate::client::DriveClient;
use crate::error::{BookshellError, Result};
use crate::models::RemoteBook;
use crate::url_parser::{extract_id, is_drive_link};

/// Cache layout version written by this build.
const CACHE_VERSION: u32 = 1;

/// Books keyed by Drive file ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryIndex {
    pub version: u32,
    /// Folder the index was last built from.
    #[serde(default)]
    pub root_folder_id: Option<String>,
    #[serde(default)]
    pub books: BTreeMap<String, Book>,
    /// Books with reading progress that dropped out when another folder was
    /// listed. Restored if they show up again.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub shelved: BTreeMap<String, Book>,
}

impl LibraryIndex {
    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Book> {
        self.books.get(id)
    }
}

/// Counts reported after a refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub added: usize,
    pub removed: usize,
    pub total: usize,
}

/// The catalog for one CLI invocation, backed by a JSON cache file.
pub struct Library {
    cache_path: PathBuf,
    index: LibraryIndex,
}

impl Library {
    /// Load the cache at `cache_path`. A missing file gives an empty library.
    pub fn open<P: AsRef<Path>>(cache_path: P) -> Result<Self> {
        let cache_path = cache_path.as_ref().to_path_buf();
        let index = match fs::read_to_string(&cache_path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| BookshellError::CacheError {
                path: cache_path.display().to_string(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %cache_path.display(), "no library cache yet");
                LibraryIndex {
                    version: CACHE_VERSION,
                    ..Default::default()
                }
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self { cache_path, index })
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn index(&self) -> &LibraryIndex {
        &self.index
    }

    /// Rebuild the index from the drive and persist it.
    pub async fn refresh(&mut self, client: &DriveClient, folder_id: &str) -> Result<RefreshSummary> {
        let remote = client.list_books(folder_id).await?;
        let summary = self.apply_listing(folder_id, remote);
        self.save()?;
        info!(
            added = summary.added,
            removed = summary.removed,
            total = summary.total,
            "library refreshed"
        );
        Ok(summary)
    }

    /// Replace the index with a fresh listing, keeping reading progress for
    /// books that are still present. Listing a different folder shelves
    /// the progress of the books it drops instead of discarding it.
    pub fn apply_listing(&mut self, folder_id: &str, remote: Vec<RemoteBook>) -> RefreshSummary {
        let folder_changed = self
            .index
            .root_folder_id
            .as_deref()
            .is_some_and(|previous| previous != folder_id);
        let mut previous = std::mem::take(&mut self.index.books);
        let mut shelved = std::mem::take(&mut self.index.shelved);
        let mut books = BTreeMap::new();
        let mut added = 0;

        for entry in remote.iter().filter(|r| !r.file.is_google_native()) {
            let mut book = Book::from_remote(entry);
            let listed_before = previous.remove(&book.id);
            if listed_before.is_none() {
                added += 1;
            }
            let shelved_copy = shelved.remove(&book.id);
            if let Some(old) = listed_before.or(shelved_copy) {
                book.position = old.position;
                book.length = old.length;
            }
            books.insert(book.id.clone(), book);
        }

        let removed = previous.len();
        if folder_changed {
            debug!(from = ?self.index.root_folder_id, to = folder_id, "library folder changed");
            shelved.extend(previous.into_iter().filter(|(_, book)| book.has_progress()));
        }

        self.index.books = books;
        self.index.shelved = shelved;
        self.index.root_folder_id = Some(folder_id.to_string());
        self.index.version = CACHE_VERSION;

        RefreshSummary {
            added,
            removed,
            total: self.index.books.len(),
        }
    }

    pub fn find(&self, id: &str) -> Result<&Book> {
        self.index
            .get(id)
            .ok_or_else(|| BookshellError::NotFound(format!("no book with ID {}", id)))
    }

    /// Look a book up by ID, Drive link, or exact (case-insensitive) title.
    pub fn resolve(&self, query: &str) -> Result<&Book> {
        let query = query.trim();
        if is_drive_link(query) {
            return self.find(&extract_id(query)?);
        }
        if let Some(book) = self.index.get(query) {
            return Ok(book);
        }

        let wanted = query.to_lowercase();
        let matches: Vec<&Book> = self
            .index
            .books
            .values()
            .filter(|b| b.title.to_lowercase() == wanted || b.file_name.to_lowercase() == wanted)
            .collect();

        match matches.as_slice() {
            [book] => Ok(*book),
            [] => Err(BookshellError::NotFound(format!("no book matching '{}'", query))),
            _ => Err(BookshellError::Ambiguous {
                query: query.to_string(),
                count: matches.len(),
            }),
        }
    }

    /// Record a reading position and persist the cache. The position is
    /// clamped to the content length when one is known.
    pub fn update_position(&mut self, id: &str, position: usize, length: Option<usize>) -> Result<()> {
        let book = self
            .index
            .books
            .get_mut(id)
            .ok_or_else(|| BookshellError::NotFound(format!("no book with ID {}", id)))?;

        if length.is_some() {
            book.length = length;
        }
        book.position = match book.length {
            Some(len) => position.min(len),
            None => position,
        };
        debug!(id, position = book.position, "updated reading position");

        self.save()
    }

    /// Store the description Drive now holds for `id`, re-reading its tag.
    pub fn record_description(&mut self, id: &str, description: Option<String>) -> Result<()> {
        let book = self
            .index
            .books
            .get_mut(id)
            .ok_or_else(|| BookshellError::NotFound(format!("no book with ID {}", id)))?;
        book.drive_status = description.as_deref().and_then(BookStatus::from_description);
        book.description = description;
        self.save()
    }

    /// All books ordered by title.
    pub fn books(&self) -> Vec<&Book> {
        let mut books: Vec<&Book> = self.index.books.values().collect();
        books.sort_by(|a, b| {
            a.title
                .to_lowercase()
                .cmp(&b.title.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        books
    }

    /// Category names with their book counts; uncategorised books are not
    /// counted.
    pub fn categories(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for category in self.index.books.values().filter_map(|b| b.category.as_ref()) {
            *counts.entry(category.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Write the cache through a temporary sibling file.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.cache_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(&self.index)?;
        let tmp_path = self.cache_path.with_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &self.cache_path)?;
        debug!(path = %self.cache_path.display(), books = self.index.len(), "saved library cache");
        Ok(())
    }
}
