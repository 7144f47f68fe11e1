//! Bearer credentials for the Sheets API.

use crate::store::StoreError;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use google_cloud_auth::credentials::service_account::{AccessSpecifier, Builder};
use google_cloud_auth::credentials::{CacheableResource, Credentials};
use http::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

#[derive(thiserror::Error, Debug)]
pub enum CredentialsError {
    #[error("could not read service account file: {0}")]
    Io(#[from] std::io::Error),
    #[error("service account key is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("service account key is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("could not build credentials: {0}")]
    Build(String),
    #[error("access token is not a valid header value")]
    InvalidToken,
}

/// Where the service gets its credentials from.
#[derive(Clone, Debug, PartialEq)]
pub enum CredentialsSource {
    ServiceAccountPath(PathBuf),
    ServiceAccountBase64(String),
    /// A pre-minted OAuth access token, used as-is.
    AccessToken(String),
}

/// Supplies the headers that authenticate one API request.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn headers(&self) -> Result<HeaderMap, StoreError>;
}

pub fn token_provider(source: &CredentialsSource) -> Result<Arc<dyn TokenProvider>, CredentialsError> {
    match source {
        CredentialsSource::ServiceAccountPath(path) => {
            let reader = BufReader::new(File::open(path)?);
            let key: serde_json::Value = serde_json::from_reader(reader)?;
            Ok(Arc::new(ServiceAccount::new(key)?))
        }
        CredentialsSource::ServiceAccountBase64(encoded) => {
            let raw = STANDARD.decode(encoded.trim())?;
            let key: serde_json::Value = serde_json::from_slice(&raw)?;
            Ok(Arc::new(ServiceAccount::new(key)?))
        }
        CredentialsSource::AccessToken(token) => Ok(Arc::new(StaticToken::new(token)?)),
    }
}

/// Service account credentials scoped to spreadsheets. Tokens are minted and
/// refreshed by `google-cloud-auth`.
pub struct ServiceAccount {
    credentials: Credentials,
}

impl ServiceAccount {
    pub fn new(key: serde_json::Value) -> Result<Self, CredentialsError> {
        let credentials = Builder::new(key)
            .with_access_specifier(AccessSpecifier::from_scopes([SHEETS_SCOPE]))
            .build()
            .map_err(|e| CredentialsError::Build(e.to_string()))?;

        Ok(ServiceAccount { credentials })
    }
}

#[async_trait]
impl TokenProvider for ServiceAccount {
    async fn headers(&self) -> Result<HeaderMap, StoreError> {
        let headers = self
            .credentials
            .headers(http::Extensions::new())
            .await
            .map_err(|e| StoreError::Auth(e.to_string()))?;

        match headers {
            CacheableResource::New { data, .. } => Ok(data),
            CacheableResource::NotModified => {
                Err(StoreError::Auth("credentials returned no headers".into()))
            }
        }
    }
}

pub struct StaticToken {
    value: HeaderValue,
}

impl StaticToken {
    pub fn new(token: &str) -> Result<Self, CredentialsError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|_| CredentialsError::InvalidToken)?;
        value.set_sensitive(true);
        Ok(StaticToken { value })
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn headers(&self) -> Result<HeaderMap, StoreError> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, self.value.clone());
        Ok(headers)
    }
}
