//! Shared fixtures: a mock Drive API and token endpoint.

#![allow(dead_code)]

use bookshell::models::{AuthorizedUserCredentials, Credentials};
use bookshell::{Authenticator, DriveClient};
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::{json, Value};

pub const ACCESS_TOKEN: &str = "test-access-token";

/// Mock the refresh-token grant. Expects exactly one call by default, since
/// tokens are cached for their lifetime.
pub async fn mock_token(server: &mut ServerGuard) -> Mock {
    server
        .mock("POST", "/token")
        .match_body(Matcher::UrlEncoded(
            "grant_type".into(),
            "refresh_token".into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "access_token": ACCESS_TOKEN,
                "expires_in": 3600,
                "token_type": "Bearer"
            })
            .to_string(),
        )
        .create_async()
        .await
}

pub fn authenticator(server: &ServerGuard) -> Authenticator {
    Authenticator::new(Credentials::AuthorizedUser(AuthorizedUserCredentials {
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        refresh_token: "refresh-token".to_string(),
        token_uri: Some(format!("{}/token", server.url())),
    }))
}

pub fn client(server: &ServerGuard) -> DriveClient {
    DriveClient::with_base_urls(
        authenticator(server),
        &server.url(),
        &format!("{}/upload", server.url()),
    )
}

/// Mock one single-page `files.list` answer for query `q`.
pub async fn mock_list(server: &mut ServerGuard, q: &str, files: Value) -> Mock {
    server
        .mock("GET", "/files")
        .match_query(Matcher::UrlEncoded("q".into(), q.into()))
        .match_header("authorization", format!("Bearer {}", ACCESS_TOKEN).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "files": files }).to_string())
        .create_async()
        .await
}

pub async fn mock_content(server: &mut ServerGuard, file_id: &str, body: &[u8]) -> Mock {
    server
        .mock("GET", format!("/files/{}", file_id).as_str())
        .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
        .with_status(200)
        .with_header("content-type", "application/octet-stream")
        .with_body(body)
        .create_async()
        .await
}
