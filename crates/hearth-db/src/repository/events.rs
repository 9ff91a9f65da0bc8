//! # Event Log Repository
//!
//! Read access to the three append-style event logs. The router heuristics
//! only need aggregates: miss counts, net streak deltas, and the timestamps
//! behind the weekday pattern report.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::DbResult;
use hearth_core::types::ReminderEvent;

/// Repository for event-log reads.
#[derive(Debug, Clone)]
pub struct EventLogRepository {
    pool: SqlitePool,
}

impl EventLogRepository {
    /// Creates a new EventLogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        EventLogRepository { pool }
    }

    /// Counts missed-reminder events for a recipient since `since`.
    pub async fn miss_count_since(
        &self,
        family_id: &str,
        recipient_id: &str,
        since: DateTime<Utc>,
    ) -> DbResult<u32> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM reminder_events
            WHERE family_id = ?1 AND recipient_id = ?2 AND kind = ?3 AND at >= ?4
            "#,
        )
        .bind(family_id)
        .bind(recipient_id)
        .bind(ReminderEvent::KIND_MISSED)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u32)
    }

    /// Sums the streak deltas for a user since `since`.
    pub async fn net_streak_delta_since(
        &self,
        family_id: &str,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> DbResult<i64> {
        let delta: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(streak_delta), 0) FROM gamification_events
            WHERE family_id = ?1 AND user_id = ?2 AND at >= ?3
            "#,
        )
        .bind(family_id)
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(delta)
    }

    /// Timestamps of missed-reminder events for a recipient since `since`,
    /// for the weekday pattern computation.
    pub async fn miss_times_since(
        &self,
        family_id: &str,
        recipient_id: &str,
        since: DateTime<Utc>,
    ) -> DbResult<Vec<DateTime<Utc>>> {
        let times: Vec<(DateTime<Utc>,)> = sqlx::query_as(
            r#"
            SELECT at FROM reminder_events
            WHERE family_id = ?1 AND recipient_id = ?2 AND kind = ?3 AND at >= ?4
            ORDER BY at ASC
            "#,
        )
        .bind(family_id)
        .bind(recipient_id)
        .bind(ReminderEvent::KIND_MISSED)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(times.into_iter().map(|(at,)| at).collect())
    }

    /// Lists the event log for one reminder, oldest first.
    pub async fn for_reminder(&self, reminder_id: &str) -> DbResult<Vec<ReminderEvent>> {
        let events = sqlx::query_as::<_, ReminderEvent>(
            r#"
            SELECT id, reminder_id, family_id, recipient_id, kind, payload, at
            FROM reminder_events
            WHERE reminder_id = ?1
            ORDER BY at ASC
            "#,
        )
        .bind(reminder_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }
}
