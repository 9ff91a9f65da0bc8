//! # Reminder Repository
//!
//! Read access to cached reminder snapshots, plus the aggregates the router
//! heuristics feed on: pair mode stats and completion counts.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use hearth_core::insights::CompletionHistory;
use hearth_core::types::Reminder;

/// Most frequent category and completion definition for a creator/recipient
/// pair. Ties resolve to the lexicographically smallest value so the answer
/// never depends on insertion or hash order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeStats {
    pub category: String,
    pub completion_definition: String,
}

/// Repository for reminder reads.
#[derive(Debug, Clone)]
pub struct ReminderRepository {
    pool: SqlitePool,
}

impl ReminderRepository {
    /// Creates a new ReminderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReminderRepository { pool }
    }

    /// Loads one reminder by id.
    pub async fn by_id(&self, id: &str) -> DbResult<Option<Reminder>> {
        let reminder = sqlx::query_as::<_, Reminder>(
            r#"
            SELECT id, family_id, creator_id, recipient_id, due_at, category,
                   completion_definition, description, status, created_at, synced_at
            FROM reminders
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reminder)
    }

    /// Lists all cached reminders for a family, soonest due first.
    pub async fn for_family(&self, family_id: &str) -> DbResult<Vec<Reminder>> {
        let reminders = sqlx::query_as::<_, Reminder>(
            r#"
            SELECT id, family_id, creator_id, recipient_id, due_at, category,
                   completion_definition, description, status, created_at, synced_at
            FROM reminders
            WHERE family_id = ?1
            ORDER BY due_at ASC
            "#,
        )
        .bind(family_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(reminders)
    }

    /// Returns the modal category and completion definition for the pair,
    /// or `None` when the pair has no cached reminders.
    pub async fn mode_stats_for(
        &self,
        creator_id: &str,
        recipient_id: &str,
    ) -> DbResult<Option<ModeStats>> {
        // Ties break on the value itself (ASC), never on row order.
        let category: Option<String> = sqlx::query_scalar(
            r#"
            SELECT category FROM reminders
            WHERE creator_id = ?1 AND recipient_id = ?2
            GROUP BY category
            ORDER BY COUNT(*) DESC, category ASC
            LIMIT 1
            "#,
        )
        .bind(creator_id)
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(category) = category else {
            return Ok(None);
        };

        let completion_definition: String = sqlx::query_scalar(
            r#"
            SELECT completion_definition FROM reminders
            WHERE creator_id = ?1 AND recipient_id = ?2
            GROUP BY completion_definition
            ORDER BY COUNT(*) DESC, completion_definition ASC
            LIMIT 1
            "#,
        )
        .bind(creator_id)
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await?;

        debug!(
            creator_id,
            recipient_id,
            category = %category,
            "Computed pair mode stats"
        );

        Ok(Some(ModeStats {
            category,
            completion_definition,
        }))
    }

    /// Completion counts for a recipient within a family, excluding the
    /// target reminder, split into the target's category and overall.
    pub async fn completion_counts(
        &self,
        family_id: &str,
        recipient_id: &str,
        category: &str,
        exclude_id: &str,
    ) -> DbResult<CompletionHistory> {
        let row: (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN category = ?3 AND status = 'completed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN category = ?3 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
                COUNT(*)
            FROM reminders
            WHERE family_id = ?1 AND recipient_id = ?2 AND id <> ?4
            "#,
        )
        .bind(family_id)
        .bind(recipient_id)
        .bind(category)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(CompletionHistory {
            category_completed: row.0 as u32,
            category_total: row.1 as u32,
            overall_completed: row.2 as u32,
            overall_total: row.3 as u32,
        })
    }
}
