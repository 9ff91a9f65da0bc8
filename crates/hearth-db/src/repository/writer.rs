//! # Cache Writer
//!
//! The single serialized mutation surface of the cache.
//!
//! ## The Writer Lane
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Single-Writer Discipline                            │
//! │                                                                         │
//! │  sync engine ──┐                                                        │
//! │  logout path ──┼──► tokio::sync::Mutex ──► BEGIN … COMMIT ──► SQLite    │
//! │  maintenance ──┘        (one lane)          (one transaction             │
//! │                                              per operation)              │
//! │                                                                         │
//! │  Readers keep hitting the pool concurrently (WAL). They see the cache   │
//! │  as it was before the transaction or after it, never in between, and    │
//! │  the cursor only moves after every row of the batch is durable.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cancellation safety: dropping a writer future at an await point drops the
//! open transaction, which rolls back. The cache is never left mid-write.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::DbResult;
use hearth_core::types::{
    GamificationEvent, MediationEvent, PreferenceSnapshot, Reminder, ReminderEvent, SyncBatch,
};

// =============================================================================
// Retention
// =============================================================================

/// Event rows older than this are pruned.
const EVENT_RETENTION_DAYS: i64 = 90;

/// Non-open reminders created more than this many days ago are pruned.
const CLOSED_REMINDER_RETENTION_DAYS: i64 = 30;

/// Every table the writer manages, in delete order for `clear_all`.
const MANAGED_TABLES: &[&str] = &[
    "reminder_events",
    "mediation_events",
    "gamification_events",
    "preference_snapshots",
    "reminders",
    "sync_cursors",
];

// =============================================================================
// Writer
// =============================================================================

/// Serialized, transactional writer handle for the cache.
#[derive(Debug, Clone)]
pub struct CacheWriter {
    pool: SqlitePool,
    lane: Arc<Mutex<()>>,
}

impl CacheWriter {
    /// Creates a writer sharing the database's pool and writer lane.
    pub(crate) fn new(pool: SqlitePool, lane: Arc<Mutex<()>>) -> Self {
        CacheWriter { pool, lane }
    }

    /// Applies one sync batch atomically and advances the cursor.
    ///
    /// Every entity of every collection is upserted (last write wins by id),
    /// preference snapshots are replaced wholesale, and only then does the
    /// cursor for [`hearth_core::types::SYNC_DOMAIN_ALL`] move to the
    /// server-reported time. Re-applying the same batch is a no-op in effect:
    /// upserts converge and the cursor never moves backwards.
    ///
    /// Returns the cursor value after the commit.
    pub async fn apply_sync_batch(&self, batch: &SyncBatch) -> DbResult<DateTime<Utc>> {
        let _guard = self.lane.lock().await;
        let mut tx = self.pool.begin().await?;

        for reminder in &batch.reminders {
            upsert_reminder(&mut tx, reminder).await?;
        }
        for event in &batch.reminder_events {
            upsert_reminder_event(&mut tx, event).await?;
        }
        for event in &batch.mediation_events {
            upsert_mediation_event(&mut tx, event).await?;
        }
        for event in &batch.gamification_events {
            upsert_gamification_event(&mut tx, event).await?;
        }
        for snapshot in &batch.preferences {
            replace_preferences(&mut tx, snapshot).await?;
        }

        let cursor = advance_cursor(&mut tx, hearth_core::types::SYNC_DOMAIN_ALL, batch.server_time)
            .await?;

        tx.commit().await?;

        info!(
            entities = batch.len(),
            cursor = %cursor,
            "Applied sync batch"
        );
        Ok(cursor)
    }

    /// Sets the cursor for a domain directly, keeping it non-decreasing.
    ///
    /// Exists for the session layer (seeding after a full resync) and for
    /// tests pinning freshness boundaries; delta sync always goes through
    /// [`CacheWriter::apply_sync_batch`].
    pub async fn set_cursor(&self, domain: &str, at: DateTime<Utc>) -> DbResult<DateTime<Utc>> {
        let _guard = self.lane.lock().await;
        let mut tx = self.pool.begin().await?;
        let cursor = advance_cursor(&mut tx, domain, at).await?;
        tx.commit().await?;
        Ok(cursor)
    }

    /// Prunes stale rows in one transaction, using the current time.
    ///
    /// Deletes event rows older than 90 days and non-open reminders created
    /// more than 30 days ago.
    pub async fn prune_stale_data(&self) -> DbResult<u64> {
        self.prune_stale_data_at(Utc::now()).await
    }

    /// Prunes stale rows relative to an explicit reference time.
    ///
    /// Rows exactly at the cutoff are retained; only strictly older rows go.
    /// Returns the number of deleted rows.
    pub async fn prune_stale_data_at(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let event_cutoff = now - Duration::days(EVENT_RETENTION_DAYS);
        let reminder_cutoff = now - Duration::days(CLOSED_REMINDER_RETENTION_DAYS);

        let _guard = self.lane.lock().await;
        let mut tx = self.pool.begin().await?;

        let mut deleted = 0u64;
        for table in ["reminder_events", "mediation_events", "gamification_events"] {
            let result = sqlx::query(&format!("DELETE FROM {table} WHERE at < ?1"))
                .bind(event_cutoff)
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected();
        }

        let result = sqlx::query(
            "DELETE FROM reminders WHERE status <> 'open' AND created_at < ?1",
        )
        .bind(reminder_cutoff)
        .execute(&mut *tx)
        .await?;
        deleted += result.rows_affected();

        tx.commit().await?;

        debug!(deleted, "Pruned stale cache rows");
        Ok(deleted)
    }

    /// Deletes all rows from all managed tables (used on logout).
    pub async fn clear_all(&self) -> DbResult<()> {
        let _guard = self.lane.lock().await;
        let mut tx = self.pool.begin().await?;

        for table in MANAGED_TABLES {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!("Cleared all cached data");
        Ok(())
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

async fn upsert_reminder(tx: &mut Transaction<'_, Sqlite>, r: &Reminder) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO reminders (
            id, family_id, creator_id, recipient_id, due_at, category,
            completion_definition, description, status, created_at, synced_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(id) DO UPDATE SET
            family_id = excluded.family_id,
            creator_id = excluded.creator_id,
            recipient_id = excluded.recipient_id,
            due_at = excluded.due_at,
            category = excluded.category,
            completion_definition = excluded.completion_definition,
            description = excluded.description,
            status = excluded.status,
            created_at = excluded.created_at,
            synced_at = excluded.synced_at
        "#,
    )
    .bind(&r.id)
    .bind(&r.family_id)
    .bind(&r.creator_id)
    .bind(&r.recipient_id)
    .bind(r.due_at)
    .bind(&r.category)
    .bind(&r.completion_definition)
    .bind(&r.description)
    .bind(r.status)
    .bind(r.created_at)
    .bind(r.synced_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn upsert_reminder_event(
    tx: &mut Transaction<'_, Sqlite>,
    e: &ReminderEvent,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO reminder_events (id, reminder_id, family_id, recipient_id, kind, payload, at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
            reminder_id = excluded.reminder_id,
            family_id = excluded.family_id,
            recipient_id = excluded.recipient_id,
            kind = excluded.kind,
            payload = excluded.payload,
            at = excluded.at
        "#,
    )
    .bind(&e.id)
    .bind(&e.reminder_id)
    .bind(&e.family_id)
    .bind(&e.recipient_id)
    .bind(&e.kind)
    .bind(&e.payload)
    .bind(e.at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn upsert_mediation_event(
    tx: &mut Transaction<'_, Sqlite>,
    e: &MediationEvent,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO mediation_events (id, reminder_id, family_id, actor_id, kind, payload, at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
            reminder_id = excluded.reminder_id,
            family_id = excluded.family_id,
            actor_id = excluded.actor_id,
            kind = excluded.kind,
            payload = excluded.payload,
            at = excluded.at
        "#,
    )
    .bind(&e.id)
    .bind(&e.reminder_id)
    .bind(&e.family_id)
    .bind(&e.actor_id)
    .bind(&e.kind)
    .bind(&e.payload)
    .bind(e.at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn upsert_gamification_event(
    tx: &mut Transaction<'_, Sqlite>,
    e: &GamificationEvent,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO gamification_events (id, user_id, family_id, kind, streak_delta, payload, at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
            user_id = excluded.user_id,
            family_id = excluded.family_id,
            kind = excluded.kind,
            streak_delta = excluded.streak_delta,
            payload = excluded.payload,
            at = excluded.at
        "#,
    )
    .bind(&e.id)
    .bind(&e.user_id)
    .bind(&e.family_id)
    .bind(&e.kind)
    .bind(e.streak_delta)
    .bind(&e.payload)
    .bind(e.at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn replace_preferences(
    tx: &mut Transaction<'_, Sqlite>,
    s: &PreferenceSnapshot,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO preference_snapshots (user_id, payload, updated_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(user_id) DO UPDATE SET
            payload = excluded.payload,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&s.user_id)
    .bind(&s.payload)
    .bind(s.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Moves the cursor to `max(existing, candidate)` inside the transaction.
async fn advance_cursor(
    tx: &mut Transaction<'_, Sqlite>,
    domain: &str,
    candidate: DateTime<Utc>,
) -> DbResult<DateTime<Utc>> {
    let existing: Option<(DateTime<Utc>,)> =
        sqlx::query_as("SELECT last_sync_at FROM sync_cursors WHERE domain = ?1")
            .bind(domain)
            .fetch_optional(&mut **tx)
            .await?;

    let next = match existing {
        Some((current,)) if current > candidate => current,
        _ => candidate,
    };

    sqlx::query(
        r#"
        INSERT INTO sync_cursors (domain, last_sync_at)
        VALUES (?1, ?2)
        ON CONFLICT(domain) DO UPDATE SET last_sync_at = excluded.last_sync_at
        "#,
    )
    .bind(domain)
    .bind(next)
    .execute(&mut **tx)
    .await?;

    Ok(next)
}
