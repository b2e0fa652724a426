//! bookshell CLI - browse and read books stored in Google Drive.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use glob::glob;
use tracing_subscriber::EnvFilter;

use bookshell::models::format_size;
use bookshell::{
    extract_id, pager, Authenticator, Book, Config, DriveClient, Library, PageLayout, Reader,
    ReadingSession, UploadOutcome,
};

/// Browse and read the books in your Google Drive library folder.
#[derive(Parser)]
#[command(name = "bookshell")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the config file.
    #[arg(long, env = "BOOKSHELL_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Service account or authorized-user JSON credentials file.
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS", global = true)]
    credentials: Option<PathBuf>,

    /// Library folder URL or ID (overrides the configured folder).
    #[arg(long, env = "BOOKSHELL_FOLDER", global = true)]
    folder: Option<String>,

    /// More log output (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Link a Drive account and pick (or create) the library folder.
    Setup {
        /// Name of the library folder to find or create.
        #[arg(long)]
        name: Option<String>,
    },

    /// List the books in the library.
    List {
        /// Use the cached index instead of asking Drive.
        #[arg(long)]
        offline: bool,

        /// Only show books in this category.
        #[arg(long, short = 'c')]
        category: Option<String>,
    },

    /// Refresh the cached index from Drive.
    Sync,

    /// Read a book in the terminal.
    Read {
        /// Book ID, Drive link, or title.
        book: String,

        /// Print pages to stdout instead of opening the pager.
        #[arg(long)]
        print: bool,

        /// With --print, stop after this many pages.
        #[arg(long, requires = "print")]
        pages: Option<usize>,

        /// Start from the beginning instead of the saved position.
        #[arg(long)]
        restart: bool,
    },

    /// Show details for one book.
    Info {
        /// Book ID, Drive link, or title.
        book: String,
    },

    /// List categories (subfolders of the library folder).
    Categories {
        /// Use the cached index instead of asking Drive.
        #[arg(long)]
        offline: bool,
    },

    /// Upload local books to the library folder.
    Push {
        /// File patterns to upload (supports glob patterns like *.epub, {a,b}.pdf).
        #[arg(required = true)]
        patterns: Vec<String>,

        /// Category subfolder to upload into (created if missing).
        #[arg(long, short = 'c')]
        category: Option<String>,
    },

    /// Move a book into a category (or back to the library root).
    Move {
        /// Book ID, Drive link, or title.
        book: String,

        /// Target category subfolder (created if missing). Omit for the root.
        #[arg(long, short = 'c')]
        category: Option<String>,
    },

    /// Download a book to the local library directory.
    Pull {
        /// Book ID, Drive link, or title.
        book: String,

        /// Local directory (defaults to the configured download dir).
        #[arg(long, short = 't')]
        to: Option<PathBuf>,
    },
}

/// Config merged with command-line overrides.
struct Settings {
    config: Config,
    config_path: PathBuf,
}

impl Settings {
    fn load(cli: &Cli) -> Result<Self> {
        let config_path = match &cli.config {
            Some(path) => path.clone(),
            None => Config::default_path()?,
        };
        let mut config = Config::load(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?;

        if let Some(credentials) = &cli.credentials {
            config.credentials = Some(credentials.clone());
        }
        if let Some(folder) = &cli.folder {
            let folder_id = extract_id(folder)
                .with_context(|| format!("Invalid folder URL or ID: {}", folder))?;
            config.root_folder_id = Some(folder_id);
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    fn client(&self) -> Result<DriveClient> {
        let path = self.config.credentials()?;
        let auth = Authenticator::from_file(path)
            .with_context(|| format!("Failed to load credentials from {:?}", path))?;
        Ok(DriveClient::new(auth))
    }

    fn library(&self) -> Result<Library> {
        let cache_path = self.config.cache_path()?;
        Library::open(&cache_path)
            .with_context(|| format!("Failed to open library cache {:?}", cache_path))
    }

    fn folder_id(&self) -> Result<&str> {
        Ok(self.config.root_folder_id()?)
    }

    /// Configured page size, filling in from the terminal when interactive.
    fn layout(&self, interactive: bool) -> PageLayout {
        let base = if interactive {
            pager::terminal_layout()
        } else {
            PageLayout::default()
        };
        PageLayout::new(
            self.config.page_width.unwrap_or(base.width),
            self.config.page_height.unwrap_or(base.height),
        )
    }
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "warn,bookshell=info",
        _ => "warn,bookshell=debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings::load(&cli)?;

    match cli.command {
        Commands::Setup { name } => setup(settings, name).await?,

        Commands::List { offline, category } => {
            let mut library = settings.library()?;
            if !offline {
                let client = settings.client()?;
                library
                    .refresh(&client, settings.folder_id()?)
                    .await
                    .context("Failed to list the library folder")?;
            }
            print_books(&library, category.as_deref());
        }

        Commands::Sync => {
            let client = settings.client()?;
            let mut library = settings.library()?;
            let summary = library
                .refresh(&client, settings.folder_id()?)
                .await
                .context("Failed to list the library folder")?;
            println!(
                "{} book(s) in library ({} new, {} removed).",
                summary.total, summary.added, summary.removed
            );
        }

        Commands::Read {
            book,
            print,
            pages,
            restart,
        } => {
            let client = settings.client()?;
            let mut library = settings.library()?;
            let book = resolve_book(&mut library, &client, &settings, &book).await?;

            let interactive = !print && std::io::stdout().is_terminal();
            let reader = Reader::new(&client, settings.layout(interactive));
            let mut session = reader
                .open(&book)
                .await
                .with_context(|| format!("Failed to open {}", book.title))?;

            if restart || (session.is_finished() && !session.is_empty()) {
                session.seek(0);
            }

            if interactive {
                pager::run(&mut session).context("Terminal error")?;
            } else {
                print_pages(&mut session, pages);
            }

            let length = session.len();
            let position = session.close();
            library
                .update_position(&book.id, position, Some(length))
                .context("Failed to save reading position")?;

            publish_status(&mut library, &client, &book.id).await?;

            if interactive {
                let saved = library.find(&book.id)?;
                println!("{}: {}", saved.title, saved.progress_label());
            }
        }

        Commands::Info { book } => {
            let client = settings.client()?;
            let mut library = settings.library()?;
            let book = resolve_book(&mut library, &client, &settings, &book).await?;
            print_info(&book);
        }

        Commands::Categories { offline } => {
            let mut library = settings.library()?;
            if !offline {
                let client = settings.client()?;
                library
                    .refresh(&client, settings.folder_id()?)
                    .await
                    .context("Failed to list the library folder")?;
            }
            let categories = library.categories();
            if categories.is_empty() {
                println!("No categories.");
            }
            for (name, count) in categories {
                println!("{:<30} {}", name, count);
            }
        }

        Commands::Push { patterns, category } => {
            push(&settings, &patterns, category.as_deref()).await?;
        }

        Commands::Move { book, category } => {
            let client = settings.client()?;
            let mut library = settings.library()?;
            let book = resolve_book(&mut library, &client, &settings, &book).await?;
            let root_id = settings.folder_id()?;

            let target_id = match category.as_deref() {
                Some(name) => {
                    client
                        .get_or_create_folder(name, Some(root_id))
                        .await
                        .with_context(|| format!("Failed to find or create category {}", name))?
                        .id
                }
                None => root_id.to_string(),
            };
            client
                .move_book(&book.id, &target_id)
                .await
                .with_context(|| format!("Failed to move {}", book.title))?;
            library
                .refresh(&client, root_id)
                .await
                .context("Failed to refresh the library after moving")?;
            println!(
                "Moved {} to {}",
                book.title,
                category.as_deref().unwrap_or("the library root")
            );
        }

        Commands::Pull { book, to } => {
            let client = settings.client()?;
            let mut library = settings.library()?;
            let book = resolve_book(&mut library, &client, &settings, &book).await?;

            let dir = match to {
                Some(dir) => dir,
                None => settings.config.download_dir()?,
            }
            .join(book.category.as_deref().unwrap_or("General"));
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {:?}", dir))?;

            let destination = dir.join(&book.file_name);
            print!("Downloading {}... ", book.title);
            let written = client
                .download_file(&book.id, &destination)
                .await
                .with_context(|| format!("Failed to download {}", book.id))?;
            println!("OK ({})", format_size(written));
            println!("Saved to: {:?}", destination);
        }
    }

    Ok(())
}

async fn setup(mut settings: Settings, name: Option<String>) -> Result<()> {
    let credentials = settings.config.credentials()?.to_path_buf();
    let client = settings.client()?;

    let session = client
        .authenticate()
        .await
        .context("Could not sign in to Google Drive")?;
    println!("Signed in as {}", session.account());

    let folder = match settings.config.root_folder_id.clone() {
        Some(id) => client
            .get_file(&id)
            .await
            .with_context(|| format!("Library folder {} is not accessible", id))?,
        None => {
            let name = name.unwrap_or_else(|| settings.config.root_folder_name.clone());
            client
                .get_or_create_folder(&name, None)
                .await
                .with_context(|| format!("Failed to find or create folder {}", name))?
        }
    };
    println!("Library folder: {} ({})", folder.name, folder.id);

    settings.config.credentials = Some(std::fs::canonicalize(&credentials).unwrap_or(credentials));
    settings.config.root_folder_id = Some(folder.id);
    settings.config.root_folder_name = folder.name;
    settings
        .config
        .save(&settings.config_path)
        .with_context(|| format!("Failed to write config {:?}", settings.config_path))?;
    println!("Saved configuration to {:?}", settings.config_path);

    let mut library = settings.library()?;
    let summary = library.refresh(&client, settings.folder_id()?).await?;
    println!("{} book(s) found.", summary.total);
    Ok(())
}

/// Find a book in the cache, refreshing from Drive once if it is missing.
async fn resolve_book(
    library: &mut Library,
    client: &DriveClient,
    settings: &Settings,
    query: &str,
) -> Result<Book> {
    match library.resolve(query) {
        Ok(book) => return Ok(book.clone()),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e.into()),
    }

    library
        .refresh(client, settings.folder_id()?)
        .await
        .context("Failed to list the library folder")?;
    Ok(library.resolve(query)?.clone())
}

/// Write the book's new reading status to its Drive description. A failure
/// only warns; the local position is already saved.
async fn publish_status(library: &mut Library, client: &DriveClient, id: &str) -> Result<()> {
    let book = library.find(id)?;
    let Some(status) = book.status_to_publish() else {
        return Ok(());
    };

    let published = client.set_status(id, book.description.as_deref(), status).await;
    match published {
        Ok(file) => library
            .record_description(id, file.description)
            .context("Failed to save the library cache")?,
        Err(e) => eprintln!("Warning: could not mark the book as {} on Drive: {}", status, e),
    }
    Ok(())
}

fn print_pages(session: &mut ReadingSession, limit: Option<usize>) {
    let mut printed = 0;
    while limit.map_or(true, |n| printed < n) {
        let Some(page) = session.render() else {
            break;
        };
        if printed > 0 {
            println!();
        }
        println!("{}", page);
        printed += 1;
    }
}

fn print_books(library: &Library, category: Option<&str>) {
    let books: Vec<&Book> = library
        .books()
        .into_iter()
        .filter(|b| in_category(b, category))
        .collect();

    if books.is_empty() {
        println!("No books found.");
        return;
    }

    println!(
        "{:<34} {:<40} {:<8} {:<16} {}",
        "ID", "TITLE", "FORMAT", "CATEGORY", "PROGRESS"
    );
    println!("{}", "-".repeat(110));
    for book in books {
        println!(
            "{:<34} {:<40} {:<8} {:<16} {}",
            book.id,
            truncate(&book.title, 40),
            book.format.to_string(),
            truncate(book.category.as_deref().unwrap_or("-"), 16),
            book.progress_label()
        );
    }
}

fn in_category(book: &Book, category: Option<&str>) -> bool {
    match category {
        Some(wanted) => book
            .category
            .as_deref()
            .is_some_and(|c| c.to_lowercase() == wanted.to_lowercase()),
        None => true,
    }
}

fn print_info(book: &Book) {
    println!("Title:    {}", book.title);
    println!("File:     {}", book.file_name);
    println!("ID:       {}", book.id);
    println!("Format:   {}", book.format);
    println!("Category: {}", book.category.as_deref().unwrap_or("-"));
    println!(
        "Size:     {}",
        book.size.map(format_size).unwrap_or_else(|| "-".to_string())
    );
    println!("Status:   {}", book.status());
    if let Some(percent) = book.percent() {
        println!("Progress: {}%", percent);
    }
}

/// Shorten `s` to at most `max` characters, marking the cut with '…'.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

async fn push(settings: &Settings, patterns: &[String], category: Option<&str>) -> Result<()> {
    let files_to_upload = expand_patterns(patterns)?;
    if files_to_upload.is_empty() {
        anyhow::bail!("No files to upload");
    }

    let client = settings.client()?;
    let root_id = settings.folder_id()?;
    let target_id = match category {
        Some(name) => {
            client
                .get_or_create_folder(name, Some(root_id))
                .await
                .with_context(|| format!("Failed to find or create category {}", name))?
                .id
        }
        None => root_id.to_string(),
    };

    println!("Uploading {} book(s)...", files_to_upload.len());
    let mut failures = 0;

    for (idx, file_path) in files_to_upload.iter().enumerate() {
        let filename = file_path.file_name().unwrap_or_default().to_string_lossy();
        print!("[{}/{}] {}... ", idx + 1, files_to_upload.len(), filename);

        match client.upload_book(file_path, &target_id).await {
            Ok(UploadOutcome::Uploaded(file)) => println!("OK: {}", file),
            Ok(UploadOutcome::AlreadyPresent(file)) => println!("already in library: {}", file),
            Err(e) => {
                failures += 1;
                println!("FAILED");
                eprintln!("  Error: {}", e);
            }
        }
    }

    let mut library = settings.library()?;
    library
        .refresh(&client, root_id)
        .await
        .context("Failed to refresh the library after upload")?;

    if failures > 0 {
        anyhow::bail!("{} upload(s) failed", failures);
    }
    println!("Done.");
    Ok(())
}

/// Expand glob and brace patterns into a sorted, de-duplicated file list.
fn expand_patterns(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        for expanded_pattern in expand_braces(pattern) {
            let matches: Vec<PathBuf> = glob(&expanded_pattern)
                .with_context(|| format!("Invalid glob pattern: {}", expanded_pattern))?
                .filter_map(|r| r.ok())
                .filter(|p| p.is_file())
                .collect();

            if matches.is_empty() {
                let path = Path::new(&expanded_pattern);
                if path.is_file() {
                    files.push(path.to_path_buf());
                } else {
                    eprintln!("Warning: No files matched pattern: {}", expanded_pattern);
                }
            } else {
                files.extend(matches);
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Expand brace patterns like book_{1,2,3}.epub into multiple patterns.
fn expand_braces(pattern: &str) -> Vec<String> {
    if let Some(start) = pattern.find('{') {
        if let Some(end) = pattern[start..].find('}') {
            let end = start + end;
            let prefix = &pattern[..start];
            let suffix = &pattern[end + 1..];
            let alternatives = &pattern[start + 1..end];

            return alternatives
                .split(',')
                .flat_map(|alt| {
                    let expanded = format!("{}{}{}", prefix, alt.trim(), suffix);
                    expand_braces(&expanded)
                })
                .collect();
        }
    }

    vec![pattern.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_braces() {
        assert_eq!(
            expand_braces("{dune,emma}_{1,2}.epub"),
            vec!["dune_1.epub", "dune_2.epub", "emma_1.epub", "emma_2.epub"]
        );
        assert_eq!(expand_braces("*.pdf"), vec!["*.pdf"]);
    }

    #[test]
    fn test_expand_patterns_dedups() {
        let dir = tempfile::TempDir::new().unwrap();
        let a = dir.path().join("a.epub");
        let b = dir.path().join("b.pdf");
        std::fs::write(&a, b"x").unwrap();
        std::fs::write(&b, b"y").unwrap();

        let patterns = vec![
            format!("{}/*.epub", dir.path().display()),
            a.display().to_string(),
            format!("{}/{{a.epub,b.pdf}}", dir.path().display()),
        ];
        let files = expand_patterns(&patterns).unwrap();
        assert_eq!(files, vec![a, b]);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Dune", 10), "Dune");
        assert_eq!(truncate("The Left Hand of Darkness", 10), "The Left …");
    }

    #[test]
    fn test_cli_parses_read() {
        let cli = Cli::try_parse_from(["bookshell", "read", "Dune", "--print", "--pages", "2"]).unwrap();
        match cli.command {
            Commands::Read { book, print, pages, restart } => {
                assert_eq!(book, "Dune");
                assert!(print);
                assert_eq!(pages, Some(2));
                assert!(!restart);
            }
            _ => panic!("expected read"),
        }
    }

    #[test]
    fn test_category_filter_folds_case() {
        let book = Book {
            id: "f1".to_string(),
            title: "Os Lusíadas".to_string(),
            file_name: "Os Lusíadas.epub".to_string(),
            format: bookshell::BookFormat::Epub,
            category: Some("Poesia Épica".to_string()),
            size: None,
            position: 0,
            length: None,
            drive_status: None,
            description: None,
        };
        assert!(in_category(&book, Some("poesia épica")));
        assert!(in_category(&book, Some("POESIA ÉPICA")));
        assert!(in_category(&book, None));
        assert!(!in_category(&book, Some("Romance")));
    }

    #[test]
    fn test_cli_parses_move() {
        let cli = Cli::try_parse_from(["bookshell", "move", "Dune", "-c", "SciFi"]).unwrap();
        match cli.command {
            Commands::Move { book, category } => {
                assert_eq!(book, "Dune");
                assert_eq!(category.as_deref(), Some("SciFi"));
            }
            _ => panic!("expected move"),
        }
    }

    #[test]
    fn test_pages_requires_print() {
        assert!(Cli::try_parse_from(["bookshell", "read", "Dune", "--pages", "2"]).is_err());
    }
}
