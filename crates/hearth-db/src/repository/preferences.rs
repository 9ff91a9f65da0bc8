//! # Preference Repository
//!
//! Read access to the latest preferences blob per user. Snapshots are
//! replaced wholesale by each sync batch; there is no history.

use sqlx::SqlitePool;

use crate::error::DbResult;
use hearth_core::types::PreferenceSnapshot;

/// Repository for preference snapshot reads.
#[derive(Debug, Clone)]
pub struct PreferenceRepository {
    pool: SqlitePool,
}

impl PreferenceRepository {
    /// Creates a new PreferenceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PreferenceRepository { pool }
    }

    /// Returns the latest snapshot for a user, if one has synced.
    pub async fn latest(&self, user_id: &str) -> DbResult<Option<PreferenceSnapshot>> {
        let snapshot = sqlx::query_as::<_, PreferenceSnapshot>(
            "SELECT user_id, payload, updated_at FROM preference_snapshots WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(snapshot)
    }
}
