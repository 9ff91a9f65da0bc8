//! # Database Pool Management
//!
//! Connection pool creation and configuration for the SQLite cache.
//!
//! ## WAL Mode
//! SQLite WAL (Write-Ahead Logging) mode is enabled for:
//! - Better concurrent read performance
//! - Readers don't block the writer, the writer doesn't block readers
//! - Better crash recovery
//!
//! ## Single Writer
//! The pool serves reads concurrently; every mutation goes through
//! [`CacheWriter`](crate::repository::writer::CacheWriter), which serializes
//! on one `tokio::sync::Mutex` lane and wraps each operation in a
//! transaction. Readers therefore observe either the pre-batch or the fully
//! committed post-batch state, never a mixture.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::cursor::CursorRepository;
use crate::repository::events::EventLogRepository;
use crate::repository::preferences::PreferenceRepository;
use crate::repository::reminders::ReminderRepository;
use crate::repository::writer::CacheWriter;

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/hearth.db").max_connections(5);
/// let db = Database::open(config).await?;
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5 (plenty for a single-device client)
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    pub min_connections: u32,

    /// Connection acquire timeout.
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    pub idle_timeout: Duration,

    /// Whether to run migrations on open.
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new configuration for a database at the given path.
    ///
    /// The file and its parent directories are created on open if missing.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    /// Creates a configuration pointing at the platform default location,
    /// e.g. `~/.local/share/hearth/hearth.db` on Linux.
    pub fn at_default_path() -> DbResult<Self> {
        let dirs = directories::ProjectDirs::from("app", "hearth", "hearth").ok_or_else(|| {
            DbError::ConnectionFailed("No usable home directory for the cache".to_string())
        })?;
        Ok(DbConfig::new(dirs.data_dir().join("hearth.db")))
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets whether to run migrations on open.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1, // In-memory requires a single connection
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_path == PathBuf::from(":memory:")
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main cache handle providing the repository read surface and the writer.
///
/// Cloning is cheap: the pool and the writer lane are shared.
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool (concurrent reads).
    pool: SqlitePool,

    /// The single writer lane all mutations serialize on.
    write_lane: Arc<Mutex<()>>,
}

impl Database {
    /// Opens (or creates) the cache database and brings the schema current.
    ///
    /// 1. Creates the parent directory if it doesn't exist
    /// 2. Configures SQLite: WAL mode, NORMAL synchronous, foreign keys on
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    ///
    /// Any failure here is unrecoverable for the client: surface it to the
    /// application shell.
    pub async fn open(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Opening cache database"
        );

        if !config.is_in_memory() {
            if let Some(parent) = config.database_path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
            }
        }

        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            // WAL mode: readers don't block the writer and vice versa
            .journal_mode(SqliteJournalMode::Wal)
            // NORMAL synchronous: safe from corruption, may lose the last
            // transaction on power failure
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Cache pool created"
        );

        let db = Database {
            pool,
            write_lane: Arc::new(Mutex::new(())),
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Applies all pending migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Returns a reference to the connection pool.
    ///
    /// For advanced read queries not covered by the repositories. Never use
    /// this to mutate; all writes go through [`Database::writer`].
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the reminder repository (reads).
    pub fn reminders(&self) -> ReminderRepository {
        ReminderRepository::new(self.pool.clone())
    }

    /// Returns the event-log repository (reads).
    pub fn events(&self) -> EventLogRepository {
        EventLogRepository::new(self.pool.clone())
    }

    /// Returns the preference repository (reads).
    pub fn preferences(&self) -> PreferenceRepository {
        PreferenceRepository::new(self.pool.clone())
    }

    /// Returns the sync-cursor repository (reads).
    pub fn cursors(&self) -> CursorRepository {
        CursorRepository::new(self.pool.clone())
    }

    /// Returns the serialized, transactional writer handle.
    pub fn writer(&self) -> CacheWriter {
        CacheWriter::new(self.pool.clone(), self.write_lane.clone())
    }

    /// Closes the connection pool. All handles fail afterwards.
    pub async fn close(&self) {
        info!("Closing cache pool");
        self.pool.close().await;
    }

    /// Checks if the database can execute queries.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
