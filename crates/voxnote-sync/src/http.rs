//! HTTP client for the remote CRUD surface served by `voxnote-api`.
//!
//! Every request carries the user id in the `X-User-Id` header. Error
//! responses have the shape `{"error": "<message>"}` and are mapped back
//! onto [`Error`] so the sync engine can tell duplicates and missing
//! records apart from transport failures.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use voxnote_core::defaults;
use voxnote_core::{
    Category, CreateCategoryRequest, Entry, Error, IngestRequest, RemoteApi, Result,
    UpdateCategoryRequest, UpdateEntryRequest,
};

/// Header carrying the acting user.
pub const USER_HEADER: &str = "X-User-Id";

/// Environment variable for the remote API base URL.
pub const ENV_REMOTE_URL: &str = "VOXNOTE_REMOTE_URL";

/// Environment variable for the acting user id.
pub const ENV_USER_ID: &str = "VOXNOTE_USER_ID";

/// Connection settings for [`HttpRemoteApi`].
#[derive(Debug, Clone)]
pub struct HttpRemoteConfig {
    pub base_url: String,
    /// Default user for the client, if one is configured.
    pub user_id: Option<Uuid>,
    pub timeout: Duration,
}

impl HttpRemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user_id: None,
            timeout: Duration::from_secs(defaults::REMOTE_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Create config from environment variables.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `VOXNOTE_REMOTE_URL` | required | Base URL of the voxnote API |
    /// | `VOXNOTE_USER_ID` | unset | Acting user (UUID) |
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var(ENV_REMOTE_URL)
            .map_err(|_| Error::Config(format!("{} is not set", ENV_REMOTE_URL)))?;
        let user_id = match std::env::var(ENV_USER_ID) {
            Ok(raw) => Some(
                Uuid::parse_str(raw.trim())
                    .map_err(|e| Error::Config(format!("{} is not a UUID: {}", ENV_USER_ID, e)))?,
            ),
            Err(_) => None,
        };
        Ok(Self {
            user_id,
            ..Self::new(base_url)
        })
    }

    pub fn with_user_id(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The configured user, for opening the local mirror.
    pub fn require_user_id(&self) -> Result<Uuid> {
        self.user_id
            .ok_or_else(|| Error::Config(format!("{} is not set", ENV_USER_ID)))
    }
}

/// Error body returned by the API.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// [`RemoteApi`] over HTTP.
#[derive(Clone)]
pub struct HttpRemoteApi {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpRemoteApi {
    pub fn new(config: HttpRemoteConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            timeout: config.timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    async fn send<B, T>(&self, method: Method, path: &str, user_id: Uuid, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self.dispatch(method, path, user_id, body).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| Error::Serialization(format!("Invalid response from {}: {}", path, e)))
    }

    async fn dispatch<B>(
        &self,
        method: Method,
        path: &str,
        user_id: Uuid,
        body: Option<&B>,
    ) -> Result<reqwest::Response>
    where
        B: Serialize + ?Sized + Sync,
    {
        let mut request = self
            .client
            .request(method.clone(), self.url(path))
            .header(USER_HEADER, user_id.to_string())
            .timeout(self.timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(format!("{} {} after {}s", method, path, self.timeout.as_secs()))
            } else {
                Error::Request(format!("{} {} failed: {}", method, path, e))
            }
        })?;

        let status = response.status();
        debug!(
            subsystem = "sync",
            component = "http",
            method = %method,
            path,
            status = status.as_u16(),
            "Remote call"
        );
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.error)
            .unwrap_or(text);
        let error = error_from_status(status, &message);
        if !error.is_not_found() && !error.is_duplicate() {
            warn!(
                subsystem = "sync",
                component = "http",
                method = %method,
                path,
                status = status.as_u16(),
                error = %message,
                "Remote call failed"
            );
        }
        Err(error)
    }
}

/// Rebuild a typed error from an API error response.
pub fn error_from_status(status: StatusCode, message: &str) -> Error {
    let strip = |prefix: &str| {
        message
            .strip_prefix(prefix)
            .unwrap_or(message)
            .trim()
            .to_string()
    };
    match status {
        StatusCode::NOT_FOUND => {
            if let Some(id) = parse_id(message, "Category not found:") {
                Error::CategoryNotFound(id)
            } else if let Some(id) = parse_id(message, "Entry not found:") {
                Error::EntryNotFound(id)
            } else {
                Error::NotFound(strip("Not found:"))
            }
        }
        StatusCode::CONFLICT => Error::Conflict(strip("Conflict:")),
        StatusCode::BAD_REQUEST => Error::InvalidInput(strip("Invalid input:")),
        StatusCode::UNPROCESSABLE_ENTITY => Error::NoSpeech,
        StatusCode::GATEWAY_TIMEOUT => Error::Timeout(strip("Timed out:")),
        _ => Error::Request(format!("HTTP {}: {}", status.as_u16(), message)),
    }
}

fn parse_id(message: &str, prefix: &str) -> Option<Uuid> {
    message
        .strip_prefix(prefix)
        .and_then(|rest| Uuid::parse_str(rest.trim()).ok())
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn create_category(&self, req: CreateCategoryRequest) -> Result<Category> {
        self.send(Method::POST, "categories", req.user_id, Some(&req))
            .await
    }

    async fn update_category(
        &self,
        user_id: Uuid,
        id: Uuid,
        req: UpdateCategoryRequest,
    ) -> Result<Category> {
        self.send(Method::PATCH, &format!("categories/{}", id), user_id, Some(&req))
            .await
    }

    async fn delete_category(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        self.dispatch::<()>(Method::DELETE, &format!("categories/{}", id), user_id, None)
            .await?;
        Ok(())
    }

    async fn list_categories(&self, user_id: Uuid) -> Result<Vec<Category>> {
        self.send::<(), _>(Method::GET, "categories", user_id, None)
            .await
    }

    async fn ingest_entry(&self, req: IngestRequest) -> Result<Entry> {
        self.send(Method::POST, "entries", req.user_id, Some(&req))
            .await
    }

    async fn update_entry(
        &self,
        user_id: Uuid,
        id: Uuid,
        req: UpdateEntryRequest,
    ) -> Result<Entry> {
        self.send(Method::PATCH, &format!("entries/{}", id), user_id, Some(&req))
            .await
    }

    async fn delete_entry(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        self.dispatch::<()>(Method::DELETE, &format!("entries/{}", id), user_id, None)
            .await?;
        Ok(())
    }

    async fn list_entries(&self, user_id: Uuid) -> Result<Vec<Entry>> {
        self.send::<(), _>(Method::GET, "entries", user_id, None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_typed_ids() {
        let id = Uuid::new_v4();
        let err = error_from_status(StatusCode::NOT_FOUND, &format!("Category not found: {}", id));
        assert!(matches!(err, Error::CategoryNotFound(x) if x == id));

        let err = error_from_status(StatusCode::NOT_FOUND, &format!("Entry not found: {}", id));
        assert!(matches!(err, Error::EntryNotFound(x) if x == id));

        let err = error_from_status(StatusCode::NOT_FOUND, "Not found: audio");
        assert!(matches!(err, Error::NotFound(ref m) if m == "audio"));
    }

    #[test]
    fn test_status_mapping() {
        assert!(error_from_status(StatusCode::CONFLICT, "Conflict: dup").is_duplicate());
        assert!(matches!(
            error_from_status(StatusCode::BAD_REQUEST, "Invalid input: empty"),
            Error::InvalidInput(ref m) if m == "empty"
        ));
        assert!(matches!(
            error_from_status(StatusCode::UNPROCESSABLE_ENTITY, "No speech detected"),
            Error::NoSpeech
        ));
        assert!(matches!(
            error_from_status(StatusCode::GATEWAY_TIMEOUT, "Timed out: classify"),
            Error::Timeout(_)
        ));
        assert!(matches!(
            error_from_status(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            Error::Request(ref m) if m == "HTTP 500: boom"
        ));
    }

    #[test]
    fn test_require_user_id() {
        let config = HttpRemoteConfig::new("http://localhost:3000");
        assert!(matches!(config.require_user_id(), Err(Error::Config(_))));
        let user = Uuid::new_v4();
        assert_eq!(config.with_user_id(user).require_user_id().unwrap(), user);
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let api = HttpRemoteApi::new(HttpRemoteConfig::new("http://localhost:3000/"));
        assert_eq!(api.url("entries"), "http://localhost:3000/api/v1/entries");
    }
}
