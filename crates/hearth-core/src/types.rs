//! # Domain Types
//!
//! Cached entity types shared by the cache, the sync engine, and the router.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Cached Entities                                 │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │    Reminder     │   │  ReminderEvent  │   │  GamificationEvent  │   │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────────  │   │
//! │  │  id             │   │  id             │   │  id                 │   │
//! │  │  family_id      │   │  reminder_id    │   │  user_id            │   │
//! │  │  recipient_id   │   │  recipient_id   │   │  streak_delta       │   │
//! │  │  due_at, status │   │  kind, at       │   │  kind, at           │   │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────────┐   ┌────────────────┐   │
//! │  │ MediationEvent  │   │  PreferenceSnapshot  │   │   SyncCursor   │   │
//! │  │  ─────────────  │   │  ──────────────────  │   │  ────────────  │   │
//! │  │  reminder_id    │   │  user_id (PK)        │   │  domain (PK)   │   │
//! │  │  actor_id       │   │  payload (blob)      │   │  last_sync_at  │   │
//! │  │  kind, at       │   │  replaced wholesale  │   │  non-decreasing│   │
//! │  └─────────────────┘   └──────────────────────┘   └────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All entities use server-assigned string ids as primary keys; upsert is
//! last-write-wins by id. Free-form payloads are carried as already-serialized
//! JSON strings so this layer need not know every payload shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// The single sync domain used by the cursor table.
pub const SYNC_DOMAIN_ALL: &str = "all";

// =============================================================================
// Reminder
// =============================================================================

/// Lifecycle status of a reminder.
///
/// Anything other than `Open` counts as closed for retention purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
pub enum ReminderStatus {
    Open,
    Completed,
    Missed,
    Cancelled,
}

impl ReminderStatus {
    /// Returns true if the reminder is still actionable.
    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(self, ReminderStatus::Open)
    }
}

impl std::fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReminderStatus::Open => write!(f, "open"),
            ReminderStatus::Completed => write!(f, "completed"),
            ReminderStatus::Missed => write!(f, "missed"),
            ReminderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A denormalized reminder snapshot as cached locally.
///
/// The server owns the business rules; the client only ever receives
/// already-computed reminders through delta sync and upserts them by id.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Reminder {
    /// Server-assigned identifier.
    pub id: String,

    /// Family this reminder belongs to.
    pub family_id: String,

    /// User who created the reminder.
    pub creator_id: String,

    /// User the reminder is addressed to.
    pub recipient_id: String,

    /// When the reminder is due.
    #[ts(as = "String")]
    pub due_at: DateTime<Utc>,

    /// Category, e.g. "chores", "school", "health".
    pub category: String,

    /// How completion is established, e.g. "photo", "checkbox", "parent_confirm".
    pub completion_definition: String,

    /// Optional free-text description.
    pub description: Option<String>,

    /// Current lifecycle status.
    pub status: ReminderStatus,

    /// When the reminder was created (server clock).
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// When this snapshot was last written by a sync batch (server clock).
    #[ts(as = "String")]
    pub synced_at: DateTime<Utc>,
}

impl Reminder {
    /// Returns true if the reminder is past due at `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open() && self.due_at < now
    }
}

// =============================================================================
// Event Logs
// =============================================================================

/// A reminder lifecycle event (created, completed, missed, excuse_submitted, ...).
///
/// `kind` is an open string on the wire; the heuristics only ever look for
/// [`ReminderEvent::KIND_MISSED`].
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ReminderEvent {
    pub id: String,
    pub reminder_id: String,
    pub family_id: String,
    pub recipient_id: String,
    pub kind: String,
    /// Free-form payload, serialized JSON.
    pub payload: Option<String>,
    #[ts(as = "String")]
    pub at: DateTime<Utc>,
}

impl ReminderEvent {
    /// Event kind recorded when a reminder passes its due time uncompleted.
    pub const KIND_MISSED: &'static str = "missed";
}

/// A mediation event: a disagreement, excuse, or resolution between members.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct MediationEvent {
    pub id: String,
    pub reminder_id: String,
    pub family_id: String,
    pub actor_id: String,
    pub kind: String,
    /// Free-form payload, serialized JSON.
    pub payload: Option<String>,
    #[ts(as = "String")]
    pub at: DateTime<Utc>,
}

/// A gamification event with the server-computed streak change it caused.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct GamificationEvent {
    pub id: String,
    pub user_id: String,
    pub family_id: String,
    pub kind: String,
    /// Net streak change caused by this event (may be negative).
    pub streak_delta: i64,
    /// Free-form payload, serialized JSON.
    pub payload: Option<String>,
    #[ts(as = "String")]
    pub at: DateTime<Utc>,
}

// =============================================================================
// Preferences
// =============================================================================

/// Latest preferences blob for one user, replaced wholesale on each sync.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PreferenceSnapshot {
    pub user_id: String,
    /// Opaque preferences payload, serialized JSON.
    pub payload: String,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Sync Cursor
// =============================================================================

/// Per-domain watermark marking the last successfully applied sync.
///
/// Invariant: `last_sync_at` never decreases. The cursor only moves as the
/// final step of a fully committed sync batch, and only to the server-reported
/// time, so clock skew on the device cannot drift it.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SyncCursor {
    pub domain: String,
    #[ts(as = "String")]
    pub last_sync_at: DateTime<Utc>,
}

// =============================================================================
// Sync Batch
// =============================================================================

/// One incremental delta batch, ready to be applied atomically to the cache.
///
/// Wire payloads have already been flattened to strings by the time a batch is
/// built; the cache applies every collection and then advances the cursor to
/// `server_time` inside a single transaction.
#[derive(Debug, Clone)]
pub struct SyncBatch {
    pub reminders: Vec<Reminder>,
    pub reminder_events: Vec<ReminderEvent>,
    pub mediation_events: Vec<MediationEvent>,
    pub gamification_events: Vec<GamificationEvent>,
    pub preferences: Vec<PreferenceSnapshot>,
    pub server_time: DateTime<Utc>,
}

impl Default for SyncBatch {
    fn default() -> Self {
        SyncBatch {
            reminders: Vec::new(),
            reminder_events: Vec::new(),
            mediation_events: Vec::new(),
            gamification_events: Vec::new(),
            preferences: Vec::new(),
            server_time: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl SyncBatch {
    /// Total number of entities carried by this batch.
    pub fn len(&self) -> usize {
        self.reminders.len()
            + self.reminder_events.len()
            + self.mediation_events.len()
            + self.gamification_events.len()
            + self.preferences.len()
    }

    /// Returns true if the batch carries no entities at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
