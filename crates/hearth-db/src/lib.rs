//! # hearth-db: Durable Local Cache
//!
//! Schema-migrated SQLite store holding denormalized reminder snapshots,
//! event logs, preference snapshots, and the sync cursor.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Hearth Data Flow                                 │
//! │                                                                         │
//! │  hearth-sync (engine)          presentation / router                    │
//! │       │ writes                      │ reads                             │
//! │       ▼                             ▼                                   │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     hearth-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │ (reads only)  │    │  (embedded)  │   │   │
//! │  │   │               │    │               │    │              │   │   │
//! │  │   │ SqlitePool +  │◄───│ reminders,    │    │ 001_initial  │   │   │
//! │  │   │ writer lane   │    │ events, prefs │    │ 002_indexes  │   │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘   │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────────────────────────────────────────────────┐ │   │
//! │  │   │  CacheWriter: sync batches, pruning, clear — serialized, │ │   │
//! │  │   │  transactional; readers see pre- or post-batch, never a  │ │   │
//! │  │   │  mixture                                                 │ │   │
//! │  │   └──────────────────────────────────────────────────────────┘ │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failed open or migration is the one unrecoverable condition in the
//! client: without a working cache nothing else can run, so [`DbError`] from
//! [`Database::open`] must reach the application shell.

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::cursor::CursorRepository;
pub use repository::events::EventLogRepository;
pub use repository::preferences::PreferenceRepository;
pub use repository::reminders::{ModeStats, ReminderRepository};
pub use repository::writer::CacheWriter;
