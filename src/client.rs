//! Google Drive API client for the book library.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::auth::Authenticator;
use crate::book::{description_with_status, BookStatus};
use crate::error::{BookshellError, Result};
use crate::models::{
    About, ApiErrorResponse, FileListResponse, RemoteBook, RemoteFile, User, FOLDER_MIME_TYPE,
};

/// Base URL for Google Drive API v3.
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Upload URL for Google Drive API.
const UPLOAD_API_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Fields requested for every file listing.
const FILE_FIELDS: &str = "id, name, size, mimeType, description, parents";

/// An authenticated Drive account.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
}

impl Session {
    /// Best human-readable name for the account.
    pub fn account(&self) -> &str {
        self.user
            .email_address
            .as_deref()
            .or(self.user.display_name.as_deref())
            .unwrap_or("unknown account")
    }
}

/// Outcome of [`DriveClient::upload_book`].
#[derive(Debug, Clone)]
pub enum UploadOutcome {
    Uploaded(RemoteFile),
    /// A file with the same name was already in the target folder.
    AlreadyPresent(RemoteFile),
}

/// Escape a value for use inside a single-quoted Drive query string.
pub fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Query for the folders directly under `parent_id`.
pub fn subfolders_query(parent_id: &str) -> String {
    format!(
        "'{}' in parents and mimeType = '{}' and trashed = false",
        escape_query(parent_id),
        FOLDER_MIME_TYPE
    )
}

/// Query for the non-folder files directly under `parent_id`.
pub fn files_query(parent_id: &str) -> String {
    format!(
        "'{}' in parents and mimeType != '{}' and trashed = false",
        escape_query(parent_id),
        FOLDER_MIME_TYPE
    )
}

/// Query for a folder called `name`, under `parent_id` when given.
pub fn folder_by_name_query(name: &str, parent_id: Option<&str>) -> String {
    let mut query = format!(
        "name = '{}' and mimeType = '{}' and trashed = false",
        escape_query(name),
        FOLDER_MIME_TYPE
    );
    if let Some(parent) = parent_id {
        query.push_str(&format!(" and '{}' in parents", escape_query(parent)));
    }
    query
}

/// Turn a non-success response into the matching error.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorResponse>(&error_body)
        .map(|e| e.error.message)
        .unwrap_or(error_body);

    Err(match status {
        StatusCode::UNAUTHORIZED => BookshellError::AuthenticationError(message),
        StatusCode::NOT_FOUND => BookshellError::NotFound(message),
        _ => BookshellError::ApiError {
            status: status.as_u16(),
            message,
        },
    })
}

/// Client for the Drive folder holding the user's books.
pub struct DriveClient {
    auth: Authenticator,
    http: Client,
    api_base: String,
    upload_base: String,
}

impl DriveClient {
    pub fn new(auth: Authenticator) -> Self {
        Self::with_base_urls(auth, DRIVE_API_BASE, UPLOAD_API_BASE)
    }

    /// Point the client at other endpoints (a mock server in tests).
    pub fn with_base_urls(auth: Authenticator, api_base: &str, upload_base: &str) -> Self {
        Self {
            auth,
            http: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            upload_base: upload_base.trim_end_matches('/').to_string(),
        }
    }

    async fn get(&self, path: &str) -> Result<RequestBuilder> {
        let token = self.auth.get_access_token().await?;
        Ok(self
            .http
            .get(format!("{}{}", self.api_base, path))
            .bearer_auth(token)
            .query(&[("supportsAllDrives", "true")]))
    }

    /// Obtain a token and confirm it against the `about` endpoint.
    pub async fn authenticate(&self) -> Result<Session> {
        let response = self
            .get("/about")
            .await?
            .query(&[("fields", "user(displayName, emailAddress)")])
            .send()
            .await?;
        let about: About = check_status(response).await?.json().await?;
        let session = Session { user: about.user };
        info!(account = session.account(), "authenticated with Google Drive");
        Ok(session)
    }

    /// Query files using Google Drive query syntax, following pagination.
    pub async fn query_files(&self, query: &str) -> Result<Vec<RemoteFile>> {
        let fields = format!("nextPageToken, files({})", FILE_FIELDS);
        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.get("/files").await?.query(&[
                ("q", query),
                ("includeItemsFromAllDrives", "true"),
                ("spaces", "drive"),
                ("fields", fields.as_str()),
            ]);

            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = check_status(request.send().await?).await?;
            let list_response: FileListResponse = response.json().await?;
            debug!(query, count = list_response.files.len(), "listed a page of files");
            all_files.extend(list_response.files);

            match list_response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(all_files)
    }

    /// List every file under the library root, one level of category
    /// subfolders deep.
    pub async fn list_books(&self, folder_id: &str) -> Result<Vec<RemoteBook>> {
        let folders = self.query_files(&subfolders_query(folder_id)).await?;

        let mut books: Vec<RemoteBook> = self
            .query_files(&files_query(folder_id))
            .await?
            .into_iter()
            .map(|file| RemoteBook {
                file,
                category: None,
            })
            .collect();

        for folder in folders {
            let files = self.query_files(&files_query(&folder.id)).await?;
            books.extend(files.into_iter().map(|file| RemoteBook {
                file,
                category: Some(folder.name.clone()),
            }));
        }

        Ok(books)
    }

    /// Get file metadata by ID.
    pub async fn get_file(&self, file_id: &str) -> Result<RemoteFile> {
        let response = self
            .get(&format!("/files/{}", file_id))
            .await?
            .query(&[("fields", FILE_FIELDS)])
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn media_response(&self, file_id: &str) -> Result<Response> {
        let response = self
            .get(&format!("/files/{}", file_id))
            .await?
            .query(&[("alt", "media")])
            .send()
            .await?;
        check_status(response).await
    }

    /// Fetch a file's content into memory.
    pub async fn fetch_content(&self, file_id: &str) -> Result<Vec<u8>> {
        let response = self.media_response(file_id).await?;
        let mut content = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            content.extend_from_slice(&chunk?);
        }

        debug!(file_id, bytes = content.len(), "fetched file content");
        Ok(content)
    }

    /// Stream a file to `destination`, returning the number of bytes written.
    ///
    /// The content lands in `<destination>.part` first and replaces
    /// `destination` only once the whole body has arrived.
    pub async fn download_file<P: AsRef<Path>>(&self, file_id: &str, destination: P) -> Result<u64> {
        let destination = destination.as_ref();
        let response = self.media_response(file_id).await?;
        let part_path = partial_path(destination);

        match write_body(response, &part_path).await {
            Ok(written) => {
                tokio::fs::rename(&part_path, destination).await?;
                Ok(written)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&part_path).await {
                    warn!(path = %part_path.display(), error = %cleanup, "could not remove partial download");
                }
                Err(e)
            }
        }
    }

    /// Find a folder by name, under `parent_id` when given.
    pub async fn find_folder(&self, name: &str, parent_id: Option<&str>) -> Result<Option<RemoteFile>> {
        let folders = self
            .query_files(&folder_by_name_query(name, parent_id))
            .await?;
        Ok(folders.into_iter().next())
    }

    /// Find a folder by name or create it.
    pub async fn get_or_create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<RemoteFile> {
        if let Some(folder) = self.find_folder(name, parent_id).await? {
            return Ok(folder);
        }

        let mut metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
        });
        if let Some(parent) = parent_id {
            metadata["parents"] = serde_json::json!([parent]);
        }

        let token = self.auth.get_access_token().await?;
        let response = self
            .http
            .post(format!("{}/files", self.api_base))
            .bearer_auth(&token)
            .query(&[("supportsAllDrives", "true"), ("fields", FILE_FIELDS)])
            .json(&metadata)
            .send()
            .await?;

        let folder: RemoteFile = check_status(response).await?.json().await?;
        info!(name, id = %folder.id, "created folder");
        Ok(folder)
    }

    async fn patch_file(&self, file_id: &str, extra_query: &[(&str, &str)], body: serde_json::Value) -> Result<RemoteFile> {
        let token = self.auth.get_access_token().await?;
        let response = self
            .http
            .patch(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(&token)
            .query(&[("supportsAllDrives", "true"), ("fields", FILE_FIELDS)])
            .query(extra_query)
            .json(&body)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    /// Write `status` into the file's description tag, keeping the rest of
    /// the description.
    pub async fn set_status(&self, file_id: &str, description: Option<&str>, status: BookStatus) -> Result<RemoteFile> {
        let description = description_with_status(description, status);
        let updated = self
            .patch_file(file_id, &[], serde_json::json!({ "description": description }))
            .await?;
        info!(file_id, %status, "updated status on Drive");
        Ok(updated)
    }

    /// Re-file a book under `folder_id`, detaching it from its other parents.
    pub async fn move_book(&self, file_id: &str, folder_id: &str) -> Result<RemoteFile> {
        let file = self.get_file(file_id).await?;
        if file.parents.len() == 1 && file.parents[0] == folder_id {
            return Ok(file);
        }

        let previous = file
            .parents
            .iter()
            .filter(|p| p.as_str() != folder_id)
            .cloned()
            .collect::<Vec<_>>()
            .join(",");
        let mut query = vec![("addParents", folder_id)];
        if !previous.is_empty() {
            query.push(("removeParents", previous.as_str()));
        }
        let moved = self.patch_file(file_id, &query, serde_json::json!({})).await?;
        info!(file_id, folder_id, "moved book");
        Ok(moved)
    }

    /// Find a file by name directly under a folder.
    pub async fn find_file(&self, name: &str, parent_id: &str) -> Result<Option<RemoteFile>> {
        let query = format!(
            "name = '{}' and '{}' in parents and trashed = false",
            escape_query(name),
            escape_query(parent_id)
        );
        let files = self.query_files(&query).await?;
        Ok(files.into_iter().next())
    }

    /// Upload a local book into `parent_id` with a multipart request.
    pub async fn upload_book<P: AsRef<Path>>(&self, local_path: P, parent_id: &str) -> Result<UploadOutcome> {
        let local_path = local_path.as_ref();
        let filename = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| BookshellError::NotFound(local_path.display().to_string()))?;

        if let Some(existing) = self.find_file(filename, parent_id).await? {
            return Ok(UploadOutcome::AlreadyPresent(existing));
        }

        let file_content = tokio::fs::read(local_path).await?;
        let mime_type = mime_guess::from_path(local_path)
            .first_or_octet_stream()
            .to_string();

        let metadata = serde_json::json!({
            "name": filename,
            "parents": [parent_id]
        });

        let metadata_part = Part::text(metadata.to_string()).mime_str("application/json")?;
        let file_part = Part::bytes(file_content)
            .file_name(filename.to_string())
            .mime_str(&mime_type)?;

        let form = Form::new()
            .part("metadata", metadata_part)
            .part("file", file_part);

        let token = self.auth.get_access_token().await?;
        let response = self
            .http
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(&token)
            .query(&[
                ("uploadType", "multipart"),
                ("supportsAllDrives", "true"),
                ("fields", FILE_FIELDS),
            ])
            .multipart(form)
            .send()
            .await?;

        let uploaded: RemoteFile = check_status(response).await?.json().await?;
        info!(name = filename, id = %uploaded.id, "uploaded book");
        Ok(UploadOutcome::Uploaded(uploaded))
    }
}

/// `<path>.part`, next to the final file.
fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn write_body(response: Response, path: &Path) -> Result<u64> {
    let mut file = File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}
