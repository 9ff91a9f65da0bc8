//! # Authenticated Gateway
//!
//! Builds and executes JSON-over-HTTPS requests against the Hearth service.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  build URL + query ──► attach bearer (omit silently if absent)          │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  execute (30s timeout) ──► transport failure → ApiError::Transport      │
//! │        │                                                                │
//! │        ├── 204 → unit                                                   │
//! │        ├── 401, auth required, first attempt:                           │
//! │        │     POST /auth/refresh with the stored refresh token           │
//! │        │       200 → persist new pair, retry ONCE (non-retriable)       │
//! │        │       else → clear tokens, fire session-expired, Unauthorized  │
//! │        ├── >= 400 → parse {"error":{code,message,...}} and map by       │
//! │        │            status (401/403/404/422/429/5xx/other)              │
//! │        └── 2xx → decode body to T (failure → Decoding)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Wire format: snake_case JSON; RFC3339 dates with fractional seconds,
//! decoded with or without them (chrono's serde handles both).

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::credentials::TokenStore;
use crate::error::{ApiError, SyncError, SyncResult};

/// HTTP request timeout. Slow enough for a delta batch on a bad connection,
/// fast enough to fail before the user gives up.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Longest error body echoed back into an error message.
const MAX_ERROR_BODY_LEN: usize = 500;

// =============================================================================
// Endpoint
// =============================================================================

/// A description of one API call: path, method, query, body, auth.
#[derive(Debug, Clone)]
pub struct Endpoint {
    path: String,
    method: Method,
    query: Vec<(String, String)>,
    body: Option<Value>,
    requires_auth: bool,
}

impl Endpoint {
    fn new(method: Method, path: &str) -> Self {
        Endpoint {
            path: path.trim_start_matches('/').to_string(),
            method,
            query: Vec::new(),
            body: None,
            requires_auth: true,
        }
    }

    /// A GET endpoint. Authenticated unless [`Endpoint::public`] is called.
    pub fn get(path: &str) -> Self {
        Endpoint::new(Method::GET, path)
    }

    /// A POST endpoint.
    pub fn post(path: &str) -> Self {
        Endpoint::new(Method::POST, path)
    }

    /// A DELETE endpoint.
    pub fn delete(path: &str) -> Self {
        Endpoint::new(Method::DELETE, path)
    }

    /// Appends one query parameter.
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Appends a query parameter only when the value is present.
    pub fn query_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    /// Sets the JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Marks the endpoint as unauthenticated (login, signup, refresh).
    pub fn public(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    #[cfg(test)]
    pub(crate) fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }
}

// =============================================================================
// Wire Shapes
// =============================================================================

/// The service's structured error envelope.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[allow(dead_code)]
    code: Option<String>,
    message: Option<String>,
    #[allow(dead_code)]
    request_id: Option<String>,
    #[allow(dead_code)]
    details: Option<Value>,
}

/// Token pair returned by login, signup, and refresh.
#[derive(Debug, Deserialize)]
struct TokenPair {
    access_token: String,
    refresh_token: String,
}

// =============================================================================
// Gateway
// =============================================================================

/// Callback invoked when the session cannot be recovered by a refresh.
pub type SessionExpiredHandler = Arc<dyn Fn() + Send + Sync>;

/// Authenticated JSON gateway. Clone is cheap; the HTTP client pools
/// connections internally.
#[derive(Clone)]
pub struct ApiGateway {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
    on_session_expired: Arc<RwLock<Option<SessionExpiredHandler>>>,
}

impl ApiGateway {
    /// Creates a gateway against a base URL like `https://api.hearth.app/v1`.
    pub fn new(base_url: &str, tokens: Arc<dyn TokenStore>) -> SyncResult<Self> {
        // Validate early so a bad config fails at startup, not first request.
        Url::parse(base_url)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| SyncError::Api(ApiError::Transport(e.to_string())))?;

        Ok(ApiGateway {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
            on_session_expired: Arc::new(RwLock::new(None)),
        })
    }

    /// The configured base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Registers the zero-argument callback fired when a refresh fails and
    /// the user must authenticate again.
    pub fn on_session_expired(&self, handler: impl Fn() + Send + Sync + 'static) {
        *self
            .on_session_expired
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::new(handler));
    }

    /// Executes an endpoint and decodes the response body.
    pub async fn request<T: DeserializeOwned>(&self, endpoint: Endpoint) -> SyncResult<T> {
        let response = self.send_with_refresh(&endpoint).await?;
        let response = Self::check_status(response).await?;

        response
            .json::<T>()
            .await
            .map_err(|e| SyncError::Api(ApiError::Decoding(e.to_string())))
    }

    /// Executes an endpoint and discards the response body (2xx/204).
    pub async fn request_unit(&self, endpoint: Endpoint) -> SyncResult<()> {
        let response = self.send_with_refresh(&endpoint).await?;
        Self::check_status(response).await?;
        Ok(())
    }

    // ---- auth operations ----------------------------------------------------

    /// Logs in and stores the returned token pair.
    pub async fn login(&self, email: &str, password: &str) -> SyncResult<()> {
        let pair: TokenPair = self
            .request(
                Endpoint::post("auth/login")
                    .with_body(serde_json::json!({ "email": email, "password": password }))
                    .public(),
            )
            .await?;
        self.tokens.save(&pair.access_token, &pair.refresh_token).await?;
        info!("Logged in");
        Ok(())
    }

    /// Creates an account and stores the returned token pair.
    pub async fn signup(&self, email: &str, password: &str, display_name: &str) -> SyncResult<()> {
        let pair: TokenPair = self
            .request(
                Endpoint::post("auth/signup")
                    .with_body(serde_json::json!({
                        "email": email,
                        "password": password,
                        "display_name": display_name,
                    }))
                    .public(),
            )
            .await?;
        self.tokens.save(&pair.access_token, &pair.refresh_token).await?;
        info!("Signed up");
        Ok(())
    }

    /// Tells the service goodbye (best-effort) and clears stored tokens.
    pub async fn logout(&self) -> SyncResult<()> {
        if let Err(e) = self.request_unit(Endpoint::post("auth/logout")).await {
            warn!(error = %e, "Server-side logout failed; clearing local tokens anyway");
        }
        self.tokens.clear().await
    }

    // ---- internals ----------------------------------------------------------

    /// Sends the request; on a first 401 for an authenticated endpoint,
    /// refreshes once and retries once. The retried request is final.
    async fn send_with_refresh(&self, endpoint: &Endpoint) -> SyncResult<reqwest::Response> {
        let response = self.send_once(endpoint).await?;

        if response.status() != StatusCode::UNAUTHORIZED || !endpoint.requires_auth {
            return Ok(response);
        }

        debug!(path = %endpoint.path, "Got 401, attempting one-shot token refresh");
        if self.refresh_tokens().await {
            // Non-retriable by construction: a second 401 falls through to
            // the status mapping below.
            self.send_once(endpoint).await
        } else {
            self.fire_session_expired();
            Err(SyncError::Api(ApiError::Unauthorized))
        }
    }

    async fn send_once(&self, endpoint: &Endpoint) -> SyncResult<reqwest::Response> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, endpoint.path))?;
        for (key, value) in &endpoint.query {
            url.query_pairs_mut().append_pair(key, value);
        }

        let mut request = self.client.request(endpoint.method.clone(), url);

        if endpoint.requires_auth {
            // Missing token: omit the header silently and let the server
            // answer 401.
            if let Some(token) = self.tokens.access_token().await {
                request = request.bearer_auth(token);
            }
        }

        if let Some(body) = &endpoint.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Api(ApiError::Transport(e.to_string())))?;

        debug!(
            path = %endpoint.path,
            status = %response.status(),
            "Gateway response"
        );
        Ok(response)
    }

    /// One-shot refresh sub-protocol. Returns true when a new pair was
    /// stored; on any other outcome the stored tokens are cleared.
    async fn refresh_tokens(&self) -> bool {
        let Some(refresh_token) = self.tokens.refresh_token().await else {
            let _ = self.tokens.clear().await;
            return false;
        };

        let url = format!("{}/auth/refresh", self.base_url);
        let outcome = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await;

        match outcome {
            Ok(response) if response.status() == StatusCode::OK => {
                match response.json::<TokenPair>().await {
                    Ok(pair) => {
                        if let Err(e) = self.tokens.save(&pair.access_token, &pair.refresh_token).await
                        {
                            warn!(error = %e, "Failed to persist refreshed tokens");
                            let _ = self.tokens.clear().await;
                            return false;
                        }
                        info!("Token pair refreshed");
                        true
                    }
                    Err(e) => {
                        warn!(error = %e, "Refresh response did not decode");
                        let _ = self.tokens.clear().await;
                        false
                    }
                }
            }
            Ok(response) => {
                warn!(status = %response.status(), "Token refresh rejected");
                let _ = self.tokens.clear().await;
                false
            }
            Err(e) => {
                warn!(error = %e, "Token refresh request failed");
                let _ = self.tokens.clear().await;
                false
            }
        }
    }

    fn fire_session_expired(&self) {
        let handler = self
            .on_session_expired
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(handler) = handler {
            handler();
        }
    }

    /// Maps non-2xx statuses to the error taxonomy; passes 2xx through.
    async fn check_status(response: reqwest::Response) -> SyncResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(SyncError::Api(Self::map_error(status, &body)))
    }

    fn map_error(status: StatusCode, body: &str) -> ApiError {
        let message = serde_json::from_str::<ErrorEnvelope>(body)
            .ok()
            .and_then(|envelope| envelope.error.message)
            .unwrap_or_else(|| truncate(body, MAX_ERROR_BODY_LEN));

        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden,
            404 => ApiError::NotFound,
            422 => ApiError::Validation(message),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::Server(message),
            other => ApiError::Unknown {
                status: other,
                message,
            },
        }
    }
}

fn truncate(body: &str, max: usize) -> String {
    if body.len() <= max {
        body.to_string()
    } else {
        let cut: String = body.chars().take(max).collect();
        format!("{cut}... (truncated, {} total bytes)", body.len())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
