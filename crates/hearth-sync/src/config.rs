//! # Sync Configuration
//!
//! Configuration for the sync layer.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     HEARTH_API_URL=https://staging.hearth.app/v1                        │
//! │     HEARTH_ROUTER_MODE=always_remote                                    │
//! │     HEARTH_SYNC_INTERVAL_SECS=60                                        │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/hearth/sync.toml (Linux)                                 │
//! │     ~/Library/Application Support/app.hearth.hearth/sync.toml (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     production API URL, 300s interval, prefer_heuristic                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [client]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Kitchen iPad"
//!
//! [api]
//! base_url = "https://api.hearth.app/v1"
//!
//! [cache]
//! sync_interval_secs = 300
//!
//! [router]
//! mode = "prefer_heuristic"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::router::RouterMode;

/// Production API base URL.
const DEFAULT_API_URL: &str = "https://api.hearth.app/v1";

/// Default periodic sync interval, in seconds.
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;

// =============================================================================
// Sections
// =============================================================================

/// This device's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Stable client id, generated on first run.
    pub id: String,

    /// Optional human-readable device name.
    #[serde(default)]
    pub name: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        ClientSettings {
            id: Uuid::new_v4().to_string(),
            name: None,
        }
    }
}

/// Gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// REST base URL; the stream URL is derived from it.
    pub base_url: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: DEFAULT_API_URL.to_string(),
        }
    }
}

/// Cache and sync-engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Database file location; `None` means the platform default path.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Periodic sync interval, in seconds.
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
}

fn default_sync_interval() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            database_path: None,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
        }
    }
}

/// Router settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterSettings {
    /// Which router implementation to build.
    #[serde(default)]
    pub mode: RouterMode,
}

// =============================================================================
// Config
// =============================================================================

/// Full sync-layer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub client: ClientSettings,

    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub router: RouterSettings,
}

impl SyncConfig {
    /// Platform default config file path.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("app", "hearth", "hearth")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    /// Loads the config, falling back to defaults when the file is missing.
    ///
    /// A fresh default config (with its generated client id) is written back
    /// so the id stays stable across runs. Environment overrides apply last.
    pub fn load_or_default(path: Option<PathBuf>) -> Self {
        let path = path.or_else(Self::default_path);

        let mut config = match &path {
            Some(path) if path.exists() => match Self::load(path) {
                Ok(config) => config,
                Err(e) => {
                    warn!(error = %e, "Config file unreadable; using defaults");
                    SyncConfig::default()
                }
            },
            _ => {
                let config = SyncConfig::default();
                if let Some(path) = &path {
                    if let Err(e) = config.save(path) {
                        debug!(error = %e, "Could not persist default config");
                    } else {
                        info!(path = %path.display(), "Wrote default config");
                    }
                }
                config
            }
        };

        config.apply_env_overrides();
        config
    }

    /// Loads the config from an explicit path.
    pub fn load(path: &PathBuf) -> SyncResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Saves the config, creating parent directories as needed.
    pub fn save(&self, path: &PathBuf) -> SyncResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }
        let raw = toml::to_string_pretty(self)?;
        std::fs::write(path, raw).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))
    }

    /// Applies `HEARTH_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("HEARTH_API_URL") {
            self.api.base_url = url;
        }
        if let Ok(mode) = std::env::var("HEARTH_ROUTER_MODE") {
            match mode.parse() {
                Ok(mode) => self.router.mode = mode,
                Err(e) => warn!(error = %e, "Ignoring HEARTH_ROUTER_MODE"),
            }
        }
        if let Ok(secs) = std::env::var("HEARTH_SYNC_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(secs) => self.cache.sync_interval_secs = secs,
                Err(_) => warn!(value = %secs, "Ignoring HEARTH_SYNC_INTERVAL_SECS"),
            }
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        url::Url::parse(&self.api.base_url)
            .map_err(|e| SyncError::InvalidConfig(format!("api.base_url: {e}")))?;

        if self.cache.sync_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "cache.sync_interval_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// The periodic sync interval as a `Duration`.
    pub fn sync_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache.sync_interval_secs)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
