//! reqwest-backed client for the Tally backend.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use session::AuthSessionStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

/// The one capability the permission subsystem needs from the HTTP layer.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// GETs `path` (relative to the API base URL) and decodes the JSON body.
    async fn get_json(&self, path: &str) -> Result<Value>;
}

/// Tally backend client.
///
/// Attaches the session's bearer token to every request. A 401 response ends
/// the session, which in turn invalidates everything cached for the user.
pub struct ApiClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    session: Arc<AuthSessionStore>,
}

impl ApiClient {
    /// Create a new client.
    pub fn new(base_url: &str, timeout: Duration, session: Arc<AuthSessionStore>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Map a non-success HTTP status to a ClientError.
    fn status_to_error(status: StatusCode, body: String) -> ClientError {
        match status.as_u16() {
            401 => ClientError::Unauthorized,
            403 => ClientError::Forbidden,
            404 => ClientError::NotFound(body),
            code => ClientError::Status {
                status: code,
                message: body,
            },
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout(self.timeout)
        } else if err.is_connect() {
            ClientError::Connection(err.to_string())
        } else {
            ClientError::Http(err)
        }
    }
}

#[async_trait]
impl HttpClient for ApiClient {
    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = self.url(path);
        debug!("GET {}", url);

        let mut request = self.client.get(&url).header(ACCEPT, "application/json");
        if let Some(token) = self.session.access_token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            let err = self.transport_error(e);
            warn!(transient = err.is_transient(), "GET {} failed: {}", url, err);
            err
        })?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = Self::status_to_error(status, body);
            if err.is_unauthorized() {
                warn!("GET {} returned 401; ending session", url);
                self.session.expire();
            } else {
                warn!(transient = err.is_transient(), "GET {} failed: {}", url, err);
            }
            return Err(err);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}
