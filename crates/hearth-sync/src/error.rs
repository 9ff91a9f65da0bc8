//! # Sync Error Types
//!
//! Two layers of errors:
//!
//! - [`ApiError`] is the gateway taxonomy. It maps one-to-one onto HTTP
//!   outcomes and is what callers of request endpoints match on.
//! - [`SyncError`] covers everything the sync layer can fail with: gateway
//!   errors, cache errors, stream connection problems, configuration.
//!
//! Propagation rules: the gateway retries a 401 once (silently) before
//! surfacing `Unauthorized`; the periodic sync loop swallows and logs; the
//! router's local path swallows and falls back to remote; the stream client
//! never surfaces connection errors to subscribers at all.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// Gateway Taxonomy
// =============================================================================

/// Typed outcome of a gateway request.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced an HTTP response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// 401 after the one-shot refresh, or refresh itself failed.
    #[error("Unauthorized - session has expired")]
    Unauthorized,

    /// 403: authenticated but not allowed.
    #[error("Forbidden")]
    Forbidden,

    /// 404: no such resource.
    #[error("Not found")]
    NotFound,

    /// 422: the server rejected the request body.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// 429: slow down.
    #[error("Rate limited - retry later")]
    RateLimited,

    /// 5xx: the service is having a bad day.
    #[error("Server error: {0}")]
    Server(String),

    /// The body of a 2xx response did not decode to the expected shape.
    #[error("Decoding failed: {0}")]
    Decoding(String),

    /// Any other status.
    #[error("Unexpected status {status}: {message}")]
    Unknown { status: u16, message: String },
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decoding(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

// =============================================================================
// Sync Error
// =============================================================================

/// Sync-layer error type covering gateway, cache, stream, and config failures.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Gateway request failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Cache operation failed.
    #[error("Cache error: {0}")]
    Cache(#[from] hearth_db::DbError),

    /// No access token is stored; the operation needs one.
    #[error("No stored credentials")]
    MissingCredentials,

    /// Credential store (keychain) failure.
    #[error("Credential store error: {0}")]
    Credentials(String),

    /// A URL could not be parsed or derived.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Stream connection failed or dropped.
    #[error("Stream connection error: {0}")]
    Connection(String),

    /// An internal channel closed unexpectedly.
    #[error("Channel error: {0}")]
    Channel(String),

    /// JSON (de)serialization failed outside the gateway.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// Invalid configuration value.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Api(ApiError::from(err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                SyncError::Connection("connection closed".to_string())
            }
            other => SyncError::Connection(other.to_string()),
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if the failed operation is worth retrying later.
    ///
    /// Transient network trouble retries; auth, validation, and config
    /// problems do not fix themselves.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Api(api) => matches!(
                api,
                ApiError::Transport(_) | ApiError::RateLimited | ApiError::Server(_)
            ),
            SyncError::Connection(_) => true,
            _ => false,
        }
    }
}
