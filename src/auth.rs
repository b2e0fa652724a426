//! OAuth2 access tokens for the Drive API.
//!
//! Two credential shapes are accepted: a service account key (exchanged via a
//! signed JWT assertion) and an authorized-user file carrying a refresh token.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{BookshellError, Result};
use crate::models::{
    ApiErrorResponse, AuthorizedUserCredentials, Credentials, ServiceAccountCredentials,
    TokenResponse,
};

/// Used when the credentials file names no `token_uri`.
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Full Drive access; `push` creates folders and files.
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Tokens this close to expiry are refreshed early.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Assertion sent in the service-account JWT grant. `iss` is the account
/// email and `aud` the token endpoint.
#[derive(Debug, Serialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    exp: u64,
    iat: u64,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: SystemTime,
}

/// Hands out access tokens, refreshing them when they are about to expire.
#[derive(Clone)]
pub struct Authenticator {
    credentials: Arc<Credentials>,
    client: Client,
    cached_token: Arc<RwLock<Option<CachedToken>>>,
}

impl Authenticator {
    /// Load credentials from a service account or authorized-user JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let credentials: Credentials = serde_json::from_str(&content).map_err(|e| {
            BookshellError::AuthenticationError(format!(
                "{} is neither a service account key nor an authorized user file: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self::new(credentials))
    }

    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Arc::new(credentials),
            client: Client::new(),
            cached_token: Arc::new(RwLock::new(None)),
        }
    }

    fn token_uri(&self) -> &str {
        self.credentials.token_uri().unwrap_or(TOKEN_URI)
    }

    /// A bearer token valid for at least another minute.
    pub async fn get_access_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > SystemTime::now() + EXPIRY_MARGIN {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let new_token = self.refresh_token().await?;

        {
            let mut cached = self.cached_token.write().await;
            *cached = Some(new_token.clone());
        }

        Ok(new_token.access_token)
    }

    async fn refresh_token(&self) -> Result<CachedToken> {
        let response = match self.credentials.as_ref() {
            Credentials::ServiceAccount(sa) => self.request_jwt_grant(sa).await?,
            Credentials::AuthorizedUser(user) => self.request_refresh_grant(user).await?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // 400 invalid_grant and 401 invalid_client both mean the stored
            // credentials are no longer usable.
            if status.is_client_error() {
                return Err(BookshellError::AuthenticationError(format!(
                    "token endpoint returned {}: {}",
                    status, body
                )));
            }
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(BookshellError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let token_response: TokenResponse = response.json().await?;
        debug!(expires_in = token_response.expires_in, "obtained access token");

        Ok(CachedToken {
            access_token: token_response.access_token,
            expires_at: SystemTime::now() + Duration::from_secs(token_response.expires_in),
        })
    }

    async fn request_jwt_grant(&self, sa: &ServiceAccountCredentials) -> Result<reqwest::Response> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| BookshellError::AuthenticationError(format!("system clock: {}", e)))?
            .as_secs();

        let claims = Claims {
            iss: sa.client_email.clone(),
            scope: DRIVE_SCOPE.to_string(),
            aud: self.token_uri().to_string(),
            iat: now,
            exp: now + 3600,
        };

        let header = Header::new(Algorithm::RS256);
        let key = EncodingKey::from_rsa_pem(sa.private_key.as_bytes())?;
        let jwt = encode(&header, &claims, &key)?;

        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", &jwt),
        ];

        Ok(self
            .client
            .post(self.token_uri())
            .form(&params)
            .send()
            .await?)
    }

    async fn request_refresh_grant(
        &self,
        user: &AuthorizedUserCredentials,
    ) -> Result<reqwest::Response> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", user.client_id.as_str()),
            ("client_secret", user.client_secret.as_str()),
            ("refresh_token", user.refresh_token.as_str()),
        ];

        Ok(self
            .client
            .post(self.token_uri())
            .form(&params)
            .send()
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_serialization() {
        let claims = Claims {
            iss: "reader@books.iam.gserviceaccount.com".to_string(),
            scope: DRIVE_SCOPE.to_string(),
            aud: TOKEN_URI.to_string(),
            iat: 1_700_000_000,
            exp: 1_700_003_600,
        };

        let value = serde_json::to_value(&claims).unwrap();
        assert_eq!(value["iss"], "reader@books.iam.gserviceaccount.com");
        assert_eq!(value["scope"], DRIVE_SCOPE);
        assert_eq!(value["exp"], 1_700_003_600u64);
    }

    #[test]
    fn test_token_uri_defaults_to_google() {
        let auth = Authenticator::new(Credentials::ServiceAccount(ServiceAccountCredentials {
            client_email: "a@b".to_string(),
            private_key: "k".to_string(),
            token_uri: None,
        }));
        assert_eq!(auth.token_uri(), TOKEN_URI);
    }

    #[tokio::test]
    async fn test_malformed_private_key_is_jwt_error() {
        let auth = Authenticator::new(Credentials::ServiceAccount(ServiceAccountCredentials {
            client_email: "a@b".to_string(),
            private_key: "not a pem".to_string(),
            token_uri: Some("http://127.0.0.1:9/token".to_string()),
        }));
        let err = auth.get_access_token().await.unwrap_err();
        assert!(matches!(err, BookshellError::JwtError(_)));
    }
}
