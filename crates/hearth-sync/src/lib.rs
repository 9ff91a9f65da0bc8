//! # hearth-sync: Network Layer
//!
//! Keeps the local cache synchronized with the Hearth service, delivers
//! real-time change notifications, and answers insight queries from local
//! data or the service depending on freshness.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Hearth Sync Layer                                │
//! │                                                                         │
//! │  ┌─────────────┐      ┌──────────────┐      ┌────────────────────────┐ │
//! │  │ TokenStore  │◄─────│  ApiGateway  │◄─────│  SyncEngine            │ │
//! │  │ (keychain)  │      │  (HTTPS)     │      │  periodic + one-shot   │ │
//! │  │             │      │              │      │  delta pulls           │ │
//! │  │ access +    │      │ bearer auth, │      └───────────┬────────────┘ │
//! │  │ refresh     │      │ 401 refresh, │                  │ writes       │
//! │  │ tokens      │      │ error taxonomy                  ▼              │
//! │  └─────────────┘      └──────┬───────┘      ┌────────────────────────┐ │
//! │         ▲                    │              │  hearth-db cache       │ │
//! │         │                    │ fallback     └───────────┬────────────┘ │
//! │  ┌──────┴───────┐            ▼                          │ reads        │
//! │  │ StreamClient │      ┌──────────────┐                 ▼              │
//! │  │ (WebSocket)  │      │InsightRouter │      ┌────────────────────────┐ │
//! │  │              │      │ (adaptive or │◄─────│  hearth-core insights  │ │
//! │  │ typed events,│      │  remote-only)│      │  (pure heuristics)     │ │
//! │  │ auto-reconnect      └──────────────┘      └────────────────────────┘ │
//! │  └──────────────┘                                                       │
//! │                                                                         │
//! │  CONSUMERS: the presentation layer reads the cache, subscribes to the   │
//! │  event stream to trigger refreshes, and asks the router questions; the  │
//! │  session layer drives login/refresh/logout and clear_cache().           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`credentials`] - serialized secure token storage
//! - [`gateway`] - authenticated JSON gateway with one-shot 401 refresh
//! - [`engine`] - cancellable periodic delta sync
//! - [`stream`] - real-time event stream with exponential-backoff reconnect
//! - [`router`] - adaptive local/remote insight queries
//! - [`config`] - TOML + env configuration
//! - [`error`] - the error taxonomy
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hearth_db::{Database, DbConfig};
//! use hearth_sync::{
//!     ApiGateway, KeyringTokenStore, StreamClient, SyncConfig, SyncEngine, build_router,
//! };
//!
//! let config = SyncConfig::load_or_default(None);
//! let tokens = Arc::new(KeyringTokenStore::new());
//! let gateway = Arc::new(ApiGateway::new(&config.api.base_url, tokens.clone())?);
//! let db = Database::open(DbConfig::at_default_path()?).await?;
//!
//! let engine = SyncEngine::new(gateway.clone(), db.clone());
//! engine.start_periodic_sync("fam-1").await;
//!
//! let router = build_router(config.router.mode, gateway.clone(), db.clone());
//! let answer = router.predict_completion("rem-42").await?;
//!
//! let mut events = StreamClient::new(&config.api.base_url, tokens).connect("fam-1").await?;
//! while let Some(event) = events.next().await {
//!     // trigger a sync / refresh the UI
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod router;
pub mod stream;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::SyncConfig;
pub use credentials::{KeyringTokenStore, MemoryTokenStore, StoredTokens, TokenStore};
pub use engine::{SyncEngine, DEFAULT_SYNC_INTERVAL};
pub use error::{ApiError, SyncError, SyncResult};
pub use gateway::{ApiGateway, Endpoint};
pub use router::{build_router, AdaptiveRouter, InsightRouter, RemoteRouter, RouterMode};
pub use stream::{EventStream, StreamClient, StreamState};
