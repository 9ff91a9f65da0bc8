//! # Sync Cursor Repository
//!
//! Read access to the per-domain sync watermark. The cursor is only ever
//! written by [`CacheWriter`](crate::repository::writer::CacheWriter) as the
//! final step of a committed sync batch.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::DbResult;
use hearth_core::types::SyncCursor;

/// Repository for sync cursor reads.
#[derive(Debug, Clone)]
pub struct CursorRepository {
    pool: SqlitePool,
}

impl CursorRepository {
    /// Creates a new CursorRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CursorRepository { pool }
    }

    /// Returns the cursor for a domain, or `None` before the first sync.
    pub async fn get(&self, domain: &str) -> DbResult<Option<SyncCursor>> {
        let cursor = sqlx::query_as::<_, SyncCursor>(
            "SELECT domain, last_sync_at FROM sync_cursors WHERE domain = ?1",
        )
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;

        Ok(cursor)
    }

    /// Returns the last sync time for a domain, if any.
    pub async fn last_sync_at(&self, domain: &str) -> DbResult<Option<DateTime<Utc>>> {
        Ok(self.get(domain).await?.map(|c| c.last_sync_at))
    }
}
